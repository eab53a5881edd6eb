//! Submitter wake-up primitive.

use std::sync::{Condvar, Mutex, PoisonError};

/// A one-shot (re-armable) completion flag.
///
/// Maps the kernel waitqueue of the original design onto a condition variable
/// plus flag: the cyclic context signals, submitting contexts block.
pub(crate) struct Completion {
    done: Mutex<bool>,
    cond: Condvar,
}

impl Completion {
    pub(crate) fn new() -> Self {
        Self {
            done: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    pub(crate) fn signal(&self) {
        let mut done = self.done.lock().unwrap_or_else(PoisonError::into_inner);

        *done = true;

        self.cond.notify_all();
    }

    pub(crate) fn reset(&self) {
        let mut done = self.done.lock().unwrap_or_else(PoisonError::into_inner);

        *done = false;
    }

    pub(crate) fn wait(&self) {
        let mut done = self.done.lock().unwrap_or_else(PoisonError::into_inner);

        while !*done {
            done = self
                .cond
                .wait(done)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn wakes_a_blocked_thread() {
        let completion = Arc::new(Completion::new());

        let waiter = {
            let completion = completion.clone();

            std::thread::spawn(move || completion.wait())
        };

        completion.signal();

        waiter.join().expect("waiter thread");
    }

    #[test]
    fn wait_after_signal_does_not_block() {
        let completion = Completion::new();

        completion.signal();
        completion.wait();
    }
}
