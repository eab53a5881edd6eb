//! Raw register requests.

use super::{RequestCore, RequestState};
use crate::{error::Error, Direction};
use std::sync::Arc;

/// A raw register read or write against one SubDevice.
///
/// Register requests come from two places: one-shot external requests pushed
/// onto a SubDevice's queue, and long-lived slots owned by a
/// [`SubDeviceConfig`](crate::SubDeviceConfig) which are re-armed with
/// [`rearm`](RegRequest::rearm) after every completion so the producer can
/// keep re-inspecting the same slot.
pub struct RegRequest {
    address: u16,
    direction: Direction,
    size: usize,
    data: spin::Mutex<Vec<u8>>,
    core: RequestCore,
}

impl RegRequest {
    /// Read `size` bytes starting at the given SubDevice-local address.
    pub fn read(address: u16, size: usize) -> Arc<Self> {
        Arc::new(Self {
            address,
            direction: Direction::Input,
            size,
            data: spin::Mutex::new(vec![0; size]),
            core: RequestCore::new(),
        })
    }

    /// Write the given bytes starting at the given SubDevice-local address.
    pub fn write(address: u16, data: &[u8]) -> Arc<Self> {
        Arc::new(Self {
            address,
            direction: Direction::Output,
            size: data.len(),
            data: spin::Mutex::new(data.to_vec()),
            core: RequestCore::new(),
        })
    }

    /// SubDevice-local register address.
    pub fn address(&self) -> u16 {
        self.address
    }

    /// `Input` for a read, `Output` for a write.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Transfer size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// The register payload: the bytes to write, or the bytes read back once
    /// the request succeeded.
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

    /// Re-queue a config-owned slot after a completed exchange.
    ///
    /// Fails with [`Error::RequestBusy`] while the slot is still in flight.
    pub fn rearm(&self) -> Result<(), Error> {
        self.core.rearm()
    }

    pub(crate) fn mark_busy(&self) {
        self.core.mark_busy();
    }

    pub(crate) fn complete(&self, success: bool) {
        self.core.finish(success);
    }
}

impl core::fmt::Debug for RegRequest {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RegRequest")
            .field("address", &format_args!("{:#06x}", self.address))
            .field("direction", &self.direction)
            .field("size", &self.size)
            .field("state", &self.state())
            .finish()
    }
}
