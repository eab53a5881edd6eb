//! SoE (Servo drive profile over EtherCAT) requests.

use super::{RequestCore, RequestState};
use crate::Direction;
use std::sync::Arc;

/// An asynchronous IDN read or write against a servo drive.
pub struct SoeRequest {
    drive_no: u8,
    idn: u16,
    direction: Direction,
    data: spin::Mutex<Vec<u8>>,
    core: RequestCore,
}

impl SoeRequest {
    /// Read an IDN from the drive.
    pub fn read(drive_no: u8, idn: u16) -> Arc<Self> {
        Arc::new(Self {
            drive_no,
            idn,
            direction: Direction::Input,
            data: spin::Mutex::new(Vec::new()),
            core: RequestCore::new(),
        })
    }

    /// Write an IDN value to the drive.
    pub fn write(drive_no: u8, idn: u16, data: &[u8]) -> Arc<Self> {
        Arc::new(Self {
            drive_no,
            idn,
            direction: Direction::Output,
            data: spin::Mutex::new(data.to_vec()),
            core: RequestCore::new(),
        })
    }

    /// Drive number within the SubDevice.
    pub fn drive_no(&self) -> u8 {
        self.drive_no
    }

    /// Identification number of the parameter.
    pub fn idn(&self) -> u16 {
        self.idn
    }

    /// `Input` for a read, `Output` for a write.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// The parameter payload.
    pub fn data(&self) -> spin::MutexGuard<'_, Vec<u8>> {
        self.data.lock()
    }

    /// Current request state.
    pub fn state(&self) -> RequestState {
        self.core.state()
    }

    /// Block the calling thread until the request reaches a terminal state.
    pub fn wait(&self) -> RequestState {
        self.core.wait()
    }

    pub(crate) fn mark_busy(&self) {
        self.core.mark_busy();
    }

    pub(crate) fn complete(&self, success: bool) {
        self.core.finish(success);
    }
}

impl core::fmt::Debug for SoeRequest {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SoeRequest")
            .field("drive_no", &self.drive_no)
            .field("idn", &format_args!("{:#06x}", self.idn))
            .field("direction", &self.direction)
            .field("state", &self.state())
            .finish()
    }
}
