//! Trailing-edge debouncer for user-driven lookups.
//!
//! Scheduling cancels any pending run, so only the last input inside the
//! window triggers work.  Dropping the debouncer aborts outstanding work;
//! nothing leaks across a view teardown.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinHandle;

pub struct Debouncer {
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Mutex::new(None),
        }
    }

    /// Schedule `work` to run after the debounce window, cancelling any
    /// previously scheduled run.  Must be called from within a tokio
    /// runtime.
    pub fn schedule<F>(&self, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let delay = self.delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            work.await;
        });

        let mut pending = self.lock_pending();
        if let Some(previous) = pending.replace(handle) {
            previous.abort();
        }
    }

    /// Cancel any pending run.
    pub fn cancel(&self) {
        if let Some(handle) = self.lock_pending().take() {
            handle.abort();
        }
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}
