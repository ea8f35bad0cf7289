//! Fixed-window rate limiting over the ephemeral registry.
//!
//! The window is keyed by `(user_id, minute-of-hour)`; the counter and its
//! expiry are set in one atomic registry operation. Being a fixed window it
//! admits up to 2x the ceiling across a window boundary — a known
//! approximation, acceptable here.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Timelike, Utc};
use uuid::Uuid;

use super::error::AuthError;
use super::registry::TokenRegistry;

const WINDOW_EXPIRY: Duration = Duration::from_secs(59);

pub struct FixedWindowLimiter {
    registry: Arc<dyn TokenRegistry>,
    max_per_window: u32,
}

impl FixedWindowLimiter {
    #[must_use]
    pub fn new(registry: Arc<dyn TokenRegistry>, max_per_window: u32) -> Self {
        Self {
            registry,
            max_per_window,
        }
    }

    /// Count this call against the user's current minute window.
    ///
    /// # Errors
    /// Returns [`AuthError::RateLimitExceeded`] once the post-increment count
    /// passes the ceiling.
    pub async fn check(&self, user_id: Uuid) -> Result<(), AuthError> {
        self.check_window(user_id, Utc::now().minute()).await
    }

    async fn check_window(&self, user_id: Uuid, minute_of_hour: u32) -> Result<(), AuthError> {
        let key = format!("rate:{user_id}:{minute_of_hour}");
        let count = self.registry.increment(&key, WINDOW_EXPIRY).await?;
        if count > u64::from(self.max_per_window) {
            return Err(AuthError::RateLimitExceeded);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::registry::MemoryTokenRegistry;

    fn limiter(max: u32) -> FixedWindowLimiter {
        FixedWindowLimiter::new(Arc::new(MemoryTokenRegistry::new()), max)
    }

    #[tokio::test]
    async fn sixth_call_in_window_is_limited() {
        let limiter = limiter(5);
        let user_id = Uuid::new_v4();

        for _ in 0..5 {
            assert!(limiter.check_window(user_id, 7).await.is_ok());
        }

        let err = limiter.check_window(user_id, 7).await.unwrap_err();
        assert!(matches!(err, AuthError::RateLimitExceeded));
    }

    #[tokio::test]
    async fn next_window_starts_fresh() {
        let limiter = limiter(5);
        let user_id = Uuid::new_v4();

        for _ in 0..6 {
            let _ = limiter.check_window(user_id, 7).await;
        }

        assert!(limiter.check_window(user_id, 8).await.is_ok());
    }

    #[tokio::test]
    async fn windows_are_per_user() {
        let limiter = limiter(1);
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        assert!(limiter.check_window(first, 3).await.is_ok());
        assert!(limiter.check_window(first, 3).await.is_err());
        assert!(limiter.check_window(second, 3).await.is_ok());
    }
}
