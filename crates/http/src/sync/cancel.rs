use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

// roughly 30 years, same horizon tokio uses for "never"
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// A deadline that reports itself cancelled once the clock passes it.
///
/// [`cancel`](CancelToken::cancel) pulls the deadline forward to "now". The deadline only ever
/// moves earlier, so a token that has reported cancelled keeps doing so.
#[derive(Debug)]
pub struct CancelToken {
    deadline: Mutex<Instant>,
}

impl CancelToken {
    pub fn new(after: Duration) -> Self {
        let now = Instant::now();
        let deadline = now.checked_add(after).unwrap_or_else(|| now + FAR_FUTURE);
        Self::until(deadline)
    }

    pub fn until(deadline: Instant) -> Self {
        Self { deadline: Mutex::new(deadline) }
    }

    pub fn cancel(&self) {
        let mut deadline = self.deadline.lock().unwrap_or_else(PoisonError::into_inner);
        *deadline = (*deadline).min(Instant::now());
    }

    pub fn is_cancel(&self) -> bool {
        Instant::now() >= self.deadline()
    }

    pub fn deadline(&self) -> Instant {
        *self.deadline.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Time left before expiry, zero once expired. Past the deadline, [`overdue`](Self::overdue)
    /// reports how late the token is, so the two together give the signed time to expiry.
    pub fn remaining(&self) -> Duration {
        self.deadline().saturating_duration_since(Instant::now())
    }

    /// Time elapsed since expiry, zero while still pending.
    pub fn overdue(&self) -> Duration {
        Instant::now().saturating_duration_since(self.deadline())
    }
}
