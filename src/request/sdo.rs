//! SDO (object dictionary) requests.

use super::{RequestCore, RequestState};
use crate::Direction;
use core::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// An asynchronous SDO upload or download against one SubDevice's object
/// dictionary.
///
/// The request itself is inert; it is driven by the SubDevice's request FSM
/// which hands it to the CoE transfer engine. The submitter keeps a clone of
/// the [`Arc`] and blocks on [`wait`](SdoRequest::wait).
pub struct SdoRequest {
    index: u16,
    subindex: u8,
    direction: Direction,
    data: spin::Mutex<Vec<u8>>,
    abort_code: AtomicU32,
    core: RequestCore,
}

impl SdoRequest {
    /// Read an object from the SubDevice (SDO upload).
    pub fn upload(index: u16, subindex: u8) -> Arc<Self> {
        Arc::new(Self {
            index,
            subindex,
            direction: Direction::Input,
            data: spin::Mutex::new(Vec::new()),
            abort_code: AtomicU32::new(0),
            core: RequestCore::new(),
        })
    }

    /// Write an object to the SubDevice (SDO download).
    pub fn download(index: u16, subindex: u8, data: &[u8]) -> Arc<Self> {
        Arc::new(Self {
            index,
            subindex,
            direction: Direction::Output,
            data: spin::Mutex::new(data.to_vec()),
            abort_code: AtomicU32::new(0),
            core: RequestCore::new(),
        })
    }

    /// Object index.
    pub fn index(&self) -> u16 {
        self.index
    }

    /// Object subindex.
    pub fn subindex(&self) -> u8 {
        self.subindex
    }

    /// `Input` for an upload, `Output` for a download.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// The request payload: the data to download, or the uploaded result once
    /// the request succeeded.
    ///
    /// Transfer engines fill this during an upload.
    pub fn data(&self) -> spin::MutexGuard<'_, Vec<u8>> {
        self.data.lock()
    }

    /// The CoE abort code if the SubDevice aborted the transfer, `None`
    /// otherwise.
    pub fn abort_code(&self) -> Option<u32> {
        match self.abort_code.load(Ordering::Acquire) {
            0 => None,
            code => Some(code),
        }
    }

    /// Transfer-engine side: record the abort code reported by the SubDevice.
    pub fn set_abort_code(&self, code: u32) {
        self.abort_code.store(code, Ordering::Release);
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

impl core::fmt::Debug for SdoRequest {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SdoRequest")
            .field("index", &format_args!("{:#06x}", self.index))
            .field("subindex", &self.subindex)
            .field("direction", &self.direction)
            .field("state", &self.state())
            .finish()
    }
}
