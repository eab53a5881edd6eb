//! FoE (File access over EtherCAT) requests.

use super::{RequestCore, RequestState};
use crate::Direction;
use std::sync::Arc;

/// An asynchronous file transfer against one SubDevice, typically used for
/// firmware updates in the `BOOT` state.
///
/// Payloads may span many kilobytes; the FoE transfer engine consumes the
/// shared datagram over as many cycles as it needs.
pub struct FoeRequest {
    file_name: String,
    password: u32,
    direction: Direction,
    data: spin::Mutex<Vec<u8>>,
    core: RequestCore,
}

impl FoeRequest {
    /// Read a file from the SubDevice.
    pub fn read(file_name: impl Into<String>, password: u32) -> Arc<Self> {
        Arc::new(Self {
            file_name: file_name.into(),
            password,
            direction: Direction::Input,
            data: spin::Mutex::new(Vec::new()),
            core: RequestCore::new(),
        })
    }

    /// Write a file to the SubDevice.
    pub fn write(file_name: impl Into<String>, password: u32, data: &[u8]) -> Arc<Self> {
        Arc::new(Self {
            file_name: file_name.into(),
            password,
            direction: Direction::Output,
            data: spin::Mutex::new(data.to_vec()),
            core: RequestCore::new(),
        })
    }

    /// File name sent in the FoE header.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// FoE password.
    pub fn password(&self) -> u32 {
        self.password
    }

    /// `Input` for a file read, `Output` for a file write.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// The file payload.
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

impl core::fmt::Debug for FoeRequest {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FoeRequest")
            .field("file_name", &self.file_name)
            .field("direction", &self.direction)
            .field("state", &self.state())
            .finish()
    }
}
