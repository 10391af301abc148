//! Two-tier read cache.
//!
//! # Responsibilities
//! - Serve reads from the local tier, then the global tier
//! - Promote global hits into the local tier
//! - Remove matching keys from both tiers on invalidation
//!
//! # Design Decisions
//! - Local tier is per-instance memory; global tier is the shared store under `cache:`
//! - Global entries carry their own expiry so a promoted local copy never
//!   outlives the global entry it came from
//! - A local copy never outlives the configured local TTL
//! - Store failures on read are misses; failures on invalidation propagate,
//!   because the caller must not report a write as successful over stale cache

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::pattern::KeyPattern;
use crate::cache::CacheError;
use crate::config::CacheConfig;
use crate::observability::{metrics, Stats};
use crate::store::{Clock, KvStore, MemoryKvStore, StoreError};

const GLOBAL_NAMESPACE: &str = "cache:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheTier {
    Local,
    Global,
}

impl CacheTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheTier::Local => "local",
            CacheTier::Global => "global",
        }
    }
}

/// Outcome of a cache read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    Hit { tier: CacheTier, value: String },
    Miss,
}

impl CacheLookup {
    pub fn value(self) -> Option<String> {
        match self {
            CacheLookup::Hit { value, .. } => Some(value),
            CacheLookup::Miss => None,
        }
    }

    pub fn is_miss(&self) -> bool {
        matches!(self, CacheLookup::Miss)
    }
}

/// Value as stored in the global tier.
#[derive(Debug, Serialize, Deserialize)]
struct GlobalEntry {
    value: String,
    expires_at: DateTime<Utc>,
}

pub struct CacheManager {
    local: MemoryKvStore,
    global: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    local_ttl: Duration,
    global_ttl: Duration,
    stats: Arc<Stats>,
}

impl CacheManager {
    pub fn new(global: Arc<dyn KvStore>, clock: Arc<dyn Clock>, config: &CacheConfig, stats: Arc<Stats>) -> Self {
        Self {
            local: MemoryKvStore::with_clock(clock.clone()),
            global,
            clock,
            local_ttl: Duration::from_secs(config.local_ttl_secs),
            global_ttl: Duration::from_secs(config.global_ttl_secs),
            stats,
        }
    }

    pub async fn get(&self, key: &str) -> CacheLookup {
        match self.local.get(key).await {
            Ok(Some(value)) => {
                self.stats.cache_local_hit();
                metrics::record_cache_lookup("local", "hit");
                return CacheLookup::Hit {
                    tier: CacheTier::Local,
                    value,
                };
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(key = %key, error = %e, "Local cache read failed"),
        }

        match self.global_entry(key).await {
            Some((value, remaining)) => {
                self.stats.cache_global_hit();
                metrics::record_cache_lookup("global", "hit");
                if let Err(e) = self
                    .local
                    .set_with_ttl(key, value.clone(), remaining.min(self.local_ttl))
                    .await
                {
                    tracing::debug!(key = %key, error = %e, "Promotion to local tier failed");
                }
                CacheLookup::Hit {
                    tier: CacheTier::Global,
                    value,
                }
            }
            None => {
                self.stats.cache_miss();
                metrics::record_cache_lookup("any", "miss");
                CacheLookup::Miss
            }
        }
    }

    /// Live global value and the time it has left.
    async fn global_entry(&self, key: &str) -> Option<(String, Duration)> {
        let raw = match self.global.get(&global_key(key)).await {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Global cache read failed, treating as miss");
                return None;
            }
        };
        let entry: GlobalEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Discarding malformed global cache entry");
                return None;
            }
        };
        let remaining = (entry.expires_at - self.clock.now()).to_std().ok()?;
        Some((entry.value, remaining))
    }

    /// Store `value` in `tier`. `ttl` defaults to the tier's configured TTL.
    ///
    /// A global write also refreshes the local tier so the next read on this
    /// instance stays local.
    pub async fn set(&self, key: &str, value: String, tier: CacheTier, ttl: Option<Duration>) -> Result<(), StoreError> {
        match tier {
            CacheTier::Local => {
                let ttl = ttl.unwrap_or(self.local_ttl).min(self.local_ttl);
                self.local.set_with_ttl(key, value, ttl).await
            }
            CacheTier::Global => {
                let ttl = ttl.unwrap_or(self.global_ttl);
                let expires_at = self
                    .clock
                    .now()
                    .checked_add_signed(chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX))
                    .unwrap_or(DateTime::<Utc>::MAX_UTC);
                let entry = serde_json::to_string(&GlobalEntry {
                    value: value.clone(),
                    expires_at,
                })?;
                self.global
                    .set_with_ttl(&global_key(key), entry, ttl)
                    .await?;
                self.local
                    .set_with_ttl(key, value, ttl.min(self.local_ttl))
                    .await
            }
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get(key).await.value()?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Discarding undecodable cache entry");
                None
            }
        }
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, tier: CacheTier) -> Result<(), StoreError> {
        let raw = serde_json::to_string(value)?;
        self.set(key, raw, tier, None).await
    }

    /// Remove every key matching `pattern` from both tiers.
    ///
    /// Returns the number of entries removed across tiers.
    pub async fn invalidate(&self, pattern: &str) -> Result<usize, CacheError> {
        let pattern = KeyPattern::new(pattern)?;
        let local = remove_matching(&self.local, &pattern, "").await?;
        let global = remove_matching(self.global.as_ref(), &pattern, GLOBAL_NAMESPACE).await?;
        let removed = local + global;

        if removed > 0 {
            self.stats.cache_invalidated(removed as u64);
            metrics::record_cache_invalidation(removed as u64);
        }
        tracing::debug!(pattern = %pattern.as_str(), local, global, "Cache invalidated");
        Ok(removed)
    }
}

fn global_key(key: &str) -> String {
    format!("{}{}", GLOBAL_NAMESPACE, key)
}

async fn remove_matching(store: &dyn KvStore, pattern: &KeyPattern, namespace: &str) -> Result<usize, StoreError> {
    if pattern.is_exact() {
        let key = format!("{}{}", namespace, pattern.as_str());
        return Ok(usize::from(store.delete(&key).await?));
    }

    let prefix = format!("{}{}", namespace, pattern.scan_prefix());
    let mut removed = 0;
    for (key, _) in store.scan_prefix(&prefix).await? {
        let logical = &key[namespace.len()..];
        if pattern.matches(logical) && store.delete(&key).await? {
            removed += 1;
        }
    }
    Ok(removed)
}
