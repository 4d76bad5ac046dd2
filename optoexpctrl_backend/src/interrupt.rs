//! Cooperative cancellation shared between an executor and its worker thread.
//!
//! One [`InterruptToken`] is created per run. The owner calls [`InterruptToken::request`]; the
//! worker polls [`InterruptToken::is_requested`] at loop boundaries and may use
//! [`InterruptToken::sleep`] for waits that should end early once a request arrives.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Clone, Default)]
pub struct InterruptToken {
    requested: Arc<Mutex<bool>>,
    condvar: Arc<Condvar>,
}

impl InterruptToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flags the run for interruption and wakes any interruptible sleep.
    pub fn request(&self) {
        let mut requested = self.requested.lock();
        *requested = true;
        self.condvar.notify_all();
    }

    pub fn is_requested(&self) -> bool {
        *self.requested.lock()
    }

    /// Sleeps for `duration`, returning early with `true` if an interrupt is (or gets) requested.
    ///
    /// A `duration` past the end of the clock sleeps until a request arrives.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now().checked_add(duration);
        let mut requested = self.requested.lock();
        while !*requested {
            match deadline {
                Some(deadline) => {
                    if self.condvar.wait_until(&mut requested, deadline).timed_out() {
                        break;
                    }
                }
                None => self.condvar.wait(&mut requested),
            }
        }
        *requested
    }
}
