//! Typed carriers for the four classes of asynchronous SubDevice requests.
//!
//! Requests are created by producers (application threads, the config layer),
//! pushed onto per-SubDevice queues and driven to completion by the
//! SubDevice's request FSM. A producer blocks on
//! [`wait`](sdo::SdoRequest::wait) until the FSM moves the request to a
//! terminal state, which happens exactly once per armed request.

mod completion;
pub mod foe;
pub mod reg;
pub mod sdo;
pub mod soe;

use crate::error::Error;
use completion::Completion;

pub use foe::FoeRequest;
pub use reg::RegRequest;
pub use sdo::SdoRequest;
pub use soe::SoeRequest;

/// Request lifecycle state.
///
/// Transitions are monotone: `Queued → Busy → Success | Failure`. The
/// terminal transition wakes the submitting context.
#[atomic_enum::atomic_enum]
#[derive(PartialEq, Default)]
pub enum RequestState {
    /// Waiting on a per-SubDevice queue.
    #[default]
    Queued = 0,
    /// Picked up by the request FSM; a datagram exchange is in flight.
    Busy = 1,
    /// The request completed successfully.
    Success = 2,
    /// The request failed. See the request's own fields (e.g. an SDO abort
    /// code) and the log for the reason.
    Failure = 3,
}

impl RequestState {
    /// `true` for `Success` and `Failure`.
    pub fn is_terminal(self) -> bool {
        matches!(self, RequestState::Success | RequestState::Failure)
    }
}

/// State + completion plumbing shared by all four request classes.
pub(crate) struct RequestCore {
    state: AtomicRequestState,
    completion: Completion,
}

impl RequestCore {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicRequestState::new(RequestState::Queued),
            completion: Completion::new(),
        }
    }

    pub(crate) fn state(&self) -> RequestState {
        self.state.load(core::sync::atomic::Ordering::Acquire)
    }

    pub(crate) fn mark_busy(&self) {
        self.state
            .store(RequestState::Busy, core::sync::atomic::Ordering::Release);
    }

    /// Move to a terminal state and wake the submitter.
    pub(crate) fn finish(&self, success: bool) {
        let terminal = if success {
            RequestState::Success
        } else {
            RequestState::Failure
        };

        self.state
            .store(terminal, core::sync::atomic::Ordering::Release);
        self.completion.signal();
    }

    /// Block until the request reaches a terminal state.
    pub(crate) fn wait(&self) -> RequestState {
        self.completion.wait();

        self.state()
    }

    /// Re-queue a terminal (or never dispatched) request slot.
    pub(crate) fn rearm(&self) -> Result<(), Error> {
        if self.state() == RequestState::Busy {
            return Err(Error::RequestBusy);
        }

        self.completion.reset();
        self.state
            .store(RequestState::Queued, core::sync::atomic::Ordering::Release);

        Ok(())
    }
}
