//! Counting semaphore built on `parking_lot` primitives.
//!
//! The semaphore is the only blocking wait used by the dispatcher: the
//! consumer thread parks in [`Semaphore::wait`] between batches and
//! producers wake it with [`Semaphore::post`].

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// A counting wait/signal primitive.
#[derive(Debug, Default)]
pub struct Semaphore {
    count: Mutex<usize>,
    condvar: Condvar,
}

impl Semaphore {
    /// Create a semaphore holding `initial` permits.
    pub fn new(initial: usize) -> Self {
        Self {
            count: Mutex::new(initial),
            condvar: Condvar::new(),
        }
    }

    /// Release `n` permits.
    ///
    /// A single permit wakes one waiter; a batch wakes every waiter.
    pub fn post(&self, n: usize) {
        if n == 0 {
            return;
        }
        let mut count = self.count.lock();
        *count += n;
        if n == 1 {
            self.condvar.notify_one();
        } else {
            self.condvar.notify_all();
        }
    }

    /// Block until a permit is available, then take it.
    pub fn wait(&self) {
        let mut count = self.count.lock();
        while *count == 0 {
            self.condvar.wait(&mut count);
        }
        *count -= 1;
    }

    /// Block for at most `timeout` waiting for a permit.
    ///
    /// Returns `true` if a permit was taken.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut count = self.count.lock();
        if *count == 0 {
            let result = self.condvar.wait_while_for(&mut count, |c| *c == 0, timeout);
            if result.timed_out() && *count == 0 {
                return false;
            }
        }
        *count -= 1;
        true
    }

    /// Number of permits currently available.
    pub fn available(&self) -> usize {
        *self.count.lock()
    }
}
