use super::{AsyncSemaphore, SyncError};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::warn;

/// A binary lock built on [`AsyncSemaphore`].
///
/// The lock is not tied to a guard: any task may [`unlock`](AsyncMutex::unlock) it, which lets
/// one task hand the "locked" state over to another. Unlocking an unlocked mutex is an error.
#[derive(Debug)]
pub struct AsyncMutex {
    permits: AsyncSemaphore,
    // serializes unlock so the check and the release happen together
    unlock_guard: Mutex<()>,
}

impl AsyncMutex {
    pub fn new(locked: bool) -> Self {
        Self { permits: AsyncSemaphore::new(usize::from(!locked)), unlock_guard: Mutex::new(()) }
    }

    pub fn try_lock(&self) -> bool {
        self.permits.try_acquire()
    }

    pub async fn lock(&self) {
        self.permits.acquire().await;
    }

    /// Returns `false` if the lock could not be taken within `duration`.
    pub async fn lock_for(&self, duration: Duration) -> bool {
        self.permits.acquire_for(duration).await
    }

    /// Locks and returns a guard that unlocks on drop, or earlier through [`AsyncMutexGuard::unlock`].
    pub async fn lock_guard(&self) -> AsyncMutexGuard<'_> {
        self.lock().await;
        AsyncMutexGuard { mutex: Some(self) }
    }

    pub fn unlock(&self) -> Result<(), SyncError> {
        let _guard = self.unlock_guard.lock().unwrap_or_else(PoisonError::into_inner);
        if self.permits.available() > 0 {
            return Err(SyncError::NotLocked);
        }
        self.permits.release();
        Ok(())
    }

    pub fn is_locked(&self) -> bool {
        self.permits.available() == 0
    }
}

/// Holds an [`AsyncMutex`] locked until dropped.
#[derive(Debug)]
pub struct AsyncMutexGuard<'a> {
    mutex: Option<&'a AsyncMutex>,
}

impl AsyncMutexGuard<'_> {
    pub fn unlock(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(mutex) = self.mutex.take()
            && let Err(e) = mutex.unlock()
        {
            warn!(cause = %e, "mutex guard released an already unlocked mutex");
        }
    }
}

impl Drop for AsyncMutexGuard<'_> {
    fn drop(&mut self) {
        self.release();
    }
}
