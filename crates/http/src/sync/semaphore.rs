use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::{Instant, timeout, timeout_at};

/// A counting semaphore whose permits are taken and given back explicitly.
///
/// Unlike [`tokio::sync::Semaphore`] there is no permit guard: a successful acquire
/// decrements the count and only [`release`](AsyncSemaphore::release) increments it again.
#[derive(Debug)]
pub struct AsyncSemaphore {
    inner: Semaphore,
}

impl AsyncSemaphore {
    pub fn new(permits: usize) -> Self {
        Self { inner: Semaphore::new(permits) }
    }

    /// Takes a permit if one is available right now.
    pub fn try_acquire(&self) -> bool {
        match self.inner.try_acquire() {
            Ok(permit) => {
                permit.forget();
                true
            }
            Err(_) => false,
        }
    }

    /// Suspends until a permit is available.
    pub async fn acquire(&self) {
        // the inner semaphore is never closed, so acquire only fails if that changes
        if let Ok(permit) = self.inner.acquire().await {
            permit.forget();
        }
    }

    /// Returns `false` if no permit became available within `duration`.
    pub async fn acquire_for(&self, duration: Duration) -> bool {
        timeout(duration, self.acquire()).await.is_ok()
    }

    /// Returns `false` if no permit became available before `deadline`.
    pub async fn acquire_until(&self, deadline: Instant) -> bool {
        timeout_at(deadline, self.acquire()).await.is_ok()
    }

    pub fn release(&self) {
        self.inner.add_permits(1);
    }

    pub fn available(&self) -> usize {
        self.inner.available_permits()
    }
}
