//! Cooperative waiting and cancellation primitives.
//!
//! Every wait in this module parks the calling task on a tokio wakeup primitive,
//! so the types are safe to share between many tasks on one runtime:
//!
//! - [`AsyncSemaphore`]: counting semaphore with deadline-bounded acquire
//! - [`AsyncMutex`]: binary semaphore whose unlock is checked
//! - [`CancelToken`]: a deadline that can be forced to expire
//! - [`AsyncTimer`]: a cancellable deadline wait, optionally driving a callback

mod cancel;
mod mutex;
mod semaphore;
mod timer;

pub use cancel::CancelToken;
pub use mutex::AsyncMutex;
pub use mutex::AsyncMutexGuard;
pub use semaphore::AsyncSemaphore;
pub use timer::AsyncTimer;

use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncError {
    #[error("unlock called on a mutex that is not locked")]
    NotLocked,
}
