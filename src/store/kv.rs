//! Shared key-value store contract and the in-memory implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::store::{Clock, StoreError, SystemClock};

/// Key-value store shared by every instance in every region.
///
/// No locking is offered: concurrent writers to one key are last-write-wins.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError>;

    /// Store a value that disappears once `ttl` has elapsed.
    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError>;

    /// Returns true if a live entry was removed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// All live entries whose key starts with `prefix`.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>, StoreError>;
}

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

impl StoredValue {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |at| now <= at)
    }
}

/// In-process [`KvStore`] backed by a `DashMap`.
///
/// Cloning shares the underlying map, so one instance can stand in for the
/// cross-region store in tests and single-process deployments.
#[derive(Clone)]
pub struct MemoryKvStore {
    inner: Arc<DashMap<String, StoredValue>>,
    clock: Arc<dyn Clock>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            clock,
        }
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.inner.len();
        self.inner.retain(|_, v| v.is_live(now));
        before - self.inner.len()
    }

    /// Number of stored entries, expired ones included until purged.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn expiry(&self, ttl: Duration) -> DateTime<Utc> {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        self.clock
            .now()
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

impl Default for MemoryKvStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = self.clock.now();
        let found = self.inner.get(key).map(|r| r.value().clone());
        match found {
            Some(stored) if stored.is_live(now) => Ok(Some(stored.value)),
            Some(_) => {
                self.inner.remove_if(key, |_, v| !v.is_live(now));
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.inner.insert(
            key.to_string(),
            StoredValue {
                value,
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        let expires_at = Some(self.expiry(ttl));
        self.inner
            .insert(key.to_string(), StoredValue { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let now = self.clock.now();
        Ok(self
            .inner
            .remove(key)
            .map(|(_, v)| v.is_live(now))
            .unwrap_or(false))
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>, StoreError> {
        let now = self.clock.now();
        let mut entries: Vec<(String, String)> = self
            .inner
            .iter()
            .filter(|r| r.key().starts_with(prefix) && r.value().is_live(now))
            .map(|r| (r.key().clone(), r.value().value.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ManualClock;

    fn store_with_clock() -> (MemoryKvStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        (MemoryKvStore::with_clock(clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let (store, _) = store_with_clock();
        assert!(store.get("a").await.unwrap().is_none());

        store.set("a", "1".into()).await.unwrap();
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("1"));

        assert!(store.delete("a").await.unwrap());
        assert!(!store.delete("a").await.unwrap());
        assert!(store.get("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ttl_expiry_boundary() {
        let (store, clock) = store_with_clock();
        store
            .set_with_ttl("k", "v".into(), Duration::from_secs(30))
            .await
            .unwrap();

        assert!(store.get("k").await.unwrap().is_some());

        clock.advance(Duration::from_secs(30));
        assert!(store.get("k").await.unwrap().is_some(), "still live at exactly T");

        clock.advance(Duration::from_millis(1));
        assert!(store.get("k").await.unwrap().is_none());
        assert!(store.is_empty(), "expired entry removed on read");
    }

    #[tokio::test]
    async fn test_scan_prefix_skips_expired() {
        let (store, clock) = store_with_clock();
        store.set("health:eu:1", "a".into()).await.unwrap();
        store
            .set_with_ttl("health:eu:2", "b".into(), Duration::from_secs(5))
            .await
            .unwrap();
        store.set("health:us:1", "c".into()).await.unwrap();

        let hits = store.scan_prefix("health:eu:").await.unwrap();
        assert_eq!(hits.len(), 2);

        clock.advance(Duration::from_secs(6));
        let hits = store.scan_prefix("health:eu:").await.unwrap();
        assert_eq!(hits, vec![("health:eu:1".to_string(), "a".to_string())]);

        assert_eq!(store.purge_expired(), 1);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let store = MemoryKvStore::new();
        let other = store.clone();
        store.set("shared", "yes".into()).await.unwrap();
        assert_eq!(other.get("shared").await.unwrap().as_deref(), Some("yes"));
    }
}
