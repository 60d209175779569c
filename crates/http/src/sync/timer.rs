use super::{AsyncMutex, SyncError};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::trace;

/// A deadline wait that can be called off.
///
/// The timer owns a mutex that starts locked. Waiting tries to take the lock with a
/// deadline; [`cancel`](AsyncTimer::cancel) releases it, so a waiter either sees the
/// release (cancelled) or the deadline (timed out). Dropping the timer cancels it.
#[derive(Debug)]
pub struct AsyncTimer {
    gate: Arc<AsyncMutex>,
}

impl AsyncTimer {
    pub fn new() -> Self {
        Self { gate: Arc::new(AsyncMutex::new(true)) }
    }

    /// Returns `true` if `duration` elapsed before the timer was cancelled.
    pub async fn wait_timeout(&self, duration: Duration) -> bool {
        !self.gate.lock_for(duration).await
    }

    /// Runs `callback` on a background task if and only if `duration` elapses first.
    pub fn wait_callback<F>(&self, duration: Duration, callback: F) -> JoinHandle<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let gate = Arc::clone(&self.gate);
        tokio::spawn(async move {
            if gate.lock_for(duration).await {
                trace!("timer cancelled before deadline");
            } else {
                callback();
            }
        })
    }

    pub fn cancel(&self) {
        // NotLocked means an earlier cancel already released the gate
        if let Err(SyncError::NotLocked) = self.gate.unlock() {
            trace!("timer already cancelled");
        }
    }
}

impl Default for AsyncTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AsyncTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
