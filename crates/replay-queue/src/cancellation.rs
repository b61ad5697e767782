use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

/// A thread-safe cancellation flag with a `Condvar` a blocked thread can
/// wait on. `ReplayQueueCoordinator` wakes waiters on both "new data
/// arrived" and "cancelled" so a reader blocked in `next_event` doesn't
/// need a polling loop.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self { inner: Arc::new((Mutex::new(false), Condvar::new())) }
    }

    pub fn cancel(&self) {
        let (lock, condvar) = &*self.inner;
        *lock.lock() = true;
        condvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.0.lock()
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
