//! Ephemeral key-value registry for live access tokens and rate-limit
//! counters.
//!
//! Presence of an access-token key means "not yet expired/revoked"; absence
//! is always treated as not activated (fail-closed). The trait is the seam
//! for an external key-value store; [`MemoryTokenRegistry`] keeps everything
//! in process with TTL-based expiry.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[async_trait]
pub trait TokenRegistry: Send + Sync {
    /// Mark `key` present for `ttl`.
    async fn put(&self, key: &str, ttl: Duration) -> Result<()>;

    /// Whether `key` is present and unexpired.
    async fn contains(&self, key: &str) -> Result<bool>;

    /// Drop `key` immediately (revocation), regardless of remaining TTL.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Atomically increment the counter at `key`, setting `ttl` only when the
    /// counter is newly created. Returns the post-increment count.
    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64>;
}

struct Entry {
    count: u64,
    expires_at: Instant,
}

impl Entry {
    fn live(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// In-process TTL map; a single lock makes increment-and-expire atomic.
#[derive(Default)]
pub struct MemoryTokenRegistry {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryTokenRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenRegistry for MemoryTokenRegistry {
    async fn put(&self, key: &str, ttl: Duration) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.retain(|_, entry| entry.live());
        entries.insert(
            key.to_string(),
            Entry {
                count: 0,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn contains(&self, key: &str) -> Result<bool> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.live() => Ok(true),
            Some(_) => {
                entries.remove(key);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.remove(key);
        Ok(())
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64> {
        let mut entries = self.entries.lock().await;
        match entries.get_mut(key) {
            Some(entry) if entry.live() => {
                entry.count += 1;
                Ok(entry.count)
            }
            _ => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        count: 1,
                        expires_at: Instant::now() + ttl,
                    },
                );
                Ok(1)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_contains_remove() {
        let registry = MemoryTokenRegistry::new();
        registry
            .put("token", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(registry.contains("token").await.unwrap());

        registry.remove("token").await.unwrap();
        assert!(!registry.contains("token").await.unwrap());
    }

    #[tokio::test]
    async fn absent_key_is_not_present() {
        let registry = MemoryTokenRegistry::new();
        assert!(!registry.contains("missing").await.unwrap());
    }

    #[tokio::test]
    async fn entries_expire() {
        let registry = MemoryTokenRegistry::new();
        registry
            .put("short", Duration::from_millis(10))
            .await
            .unwrap();
        assert!(registry.contains("short").await.unwrap());

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!registry.contains("short").await.unwrap());
    }

    #[tokio::test]
    async fn increment_counts_within_window() {
        let registry = MemoryTokenRegistry::new();
        for expected in 1..=5 {
            let count = registry
                .increment("window", Duration::from_secs(59))
                .await
                .unwrap();
            assert_eq!(count, expected);
        }
    }

    #[tokio::test]
    async fn increment_resets_after_expiry() {
        let registry = MemoryTokenRegistry::new();
        registry
            .increment("window", Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        let count = registry
            .increment("window", Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
