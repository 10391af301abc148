//! Replication lag aggregation.
//!
//! # Responsibilities
//! - Scan replication log rows inside a trailing window
//! - Average success latency per (source, target) pair
//! - Publish each sample as a gauge and into the shared store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time;

use crate::health::record::lag_key;
use crate::observability::metrics;
use crate::replication::{ReplicationLog, ReplicationLogEntry, ReplicationStatus};
use crate::store::{Clock, KvStore, StoreError};

/// Approximate replication lag for one (source, target) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LagSample {
    pub source_region: String,
    pub target_region: String,
    /// Mean latency of successful pushes. `None` when the window holds only failures.
    pub avg_latency_ms: Option<f64>,
    pub successes: u64,
    pub failures: u64,
    pub computed_at: DateTime<Utc>,
}

#[derive(Default)]
struct PairTally {
    latency_sum: u64,
    successes: u64,
    failures: u64,
}

/// Fold log rows into one sample per pair, sorted by (source, target).
pub fn summarize(entries: &[ReplicationLogEntry], computed_at: DateTime<Utc>) -> Vec<LagSample> {
    let mut pairs: BTreeMap<(&str, &str), PairTally> = BTreeMap::new();
    for entry in entries {
        let tally = pairs
            .entry((entry.source_region.as_str(), entry.target_region.as_str()))
            .or_default();
        match entry.status {
            ReplicationStatus::Success => {
                tally.latency_sum += entry.latency_ms;
                tally.successes += 1;
            }
            ReplicationStatus::Failed => tally.failures += 1,
        }
    }

    pairs
        .into_iter()
        .map(|((source, target), tally)| LagSample {
            source_region: source.to_string(),
            target_region: target.to_string(),
            avg_latency_ms: (tally.successes > 0)
                .then(|| tally.latency_sum as f64 / tally.successes as f64),
            successes: tally.successes,
            failures: tally.failures,
            computed_at,
        })
        .collect()
}

pub struct LagAggregator {
    log: Arc<dyn ReplicationLog>,
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    window: Duration,
    latest: RwLock<Vec<LagSample>>,
}

impl LagAggregator {
    pub fn new(
        log: Arc<dyn ReplicationLog>,
        store: Arc<dyn KvStore>,
        clock: Arc<dyn Clock>,
        interval: Duration,
        window: Duration,
    ) -> Self {
        Self {
            log,
            store,
            clock,
            interval,
            window,
            latest: RwLock::new(Vec::new()),
        }
    }

    /// One aggregation pass over `[now - window, now]`.
    pub async fn aggregate_once(&self) -> Result<Vec<LagSample>, StoreError> {
        let now = self.clock.now();
        let window = chrono::Duration::from_std(self.window).unwrap_or(chrono::Duration::zero());
        let entries = self.log.entries_since(now - window).await?;
        let samples = summarize(&entries, now);

        let ttl = self.interval * 2;
        for sample in &samples {
            if let Some(avg) = sample.avg_latency_ms {
                metrics::record_replication_lag(&sample.source_region, &sample.target_region, avg);
            }
            let key = lag_key(&sample.source_region, &sample.target_region);
            self.store
                .set_with_ttl(&key, serde_json::to_string(sample)?, ttl)
                .await?;
        }

        tracing::debug!(pairs = samples.len(), rows = entries.len(), "Replication lag aggregated");
        *self.latest.write().unwrap_or_else(|e| e.into_inner()) = samples.clone();
        Ok(samples)
    }

    /// Samples from the most recent pass.
    pub fn latest(&self) -> Vec<LagSample> {
        self.latest.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            window_secs = self.window.as_secs(),
            "Lag aggregator starting"
        );

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.aggregate_once().await {
                        tracing::warn!(error = %e, "Lag aggregation failed");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Lag aggregator received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replication::{MemoryReplicationLog, Operation};
    use crate::store::{ManualClock, MemoryKvStore};
    use uuid::Uuid;

    fn row(target: &str, at: DateTime<Utc>, status: ReplicationStatus, latency_ms: u64) -> ReplicationLogEntry {
        ReplicationLogEntry {
            id: Uuid::new_v4(),
            source_region: "us-west".into(),
            target_region: target.into(),
            operation: Operation::Insert,
            table: "users".into(),
            record_id: "42".into(),
            timestamp: at,
            status,
            latency_ms,
            error: None,
        }
    }

    struct Fixture {
        clock: Arc<ManualClock>,
        log: MemoryReplicationLog,
        store: MemoryKvStore,
        lag: LagAggregator,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::default());
        let log = MemoryReplicationLog::new();
        let store = MemoryKvStore::with_clock(clock.clone());
        let lag = LagAggregator::new(
            Arc::new(log.clone()),
            Arc::new(store.clone()),
            clock.clone(),
            Duration::from_secs(50),
            Duration::from_secs(300),
        );
        Fixture { clock, log, store, lag }
    }

    #[test]
    fn test_summarize_averages_successes_only() {
        let now = Utc::now();
        let entries = vec![
            row("us-east", now, ReplicationStatus::Success, 10),
            row("us-east", now, ReplicationStatus::Success, 30),
            row("europe", now, ReplicationStatus::Failed, 5000),
            row("us-east", now, ReplicationStatus::Failed, 5000),
        ];

        let samples = summarize(&entries, now);
        assert_eq!(samples.len(), 2);

        assert_eq!(samples[0].target_region, "europe");
        assert_eq!(samples[0].avg_latency_ms, None);
        assert_eq!(samples[0].failures, 1);

        assert_eq!(samples[1].target_region, "us-east");
        assert_eq!(samples[1].avg_latency_ms, Some(20.0));
        assert_eq!(samples[1].successes, 2);
        assert_eq!(samples[1].failures, 1);
    }

    #[tokio::test]
    async fn test_rows_outside_window_ignored() {
        let f = fixture();
        let start = f.clock.now();
        f.log
            .append(row("us-east", start, ReplicationStatus::Success, 900))
            .await
            .unwrap();

        f.clock.advance(Duration::from_secs(400));
        f.log
            .append(row("us-east", f.clock.now(), ReplicationStatus::Success, 12))
            .await
            .unwrap();

        let samples = f.lag.aggregate_once().await.unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].avg_latency_ms, Some(12.0));
        assert_eq!(samples[0].successes, 1);
        assert_eq!(f.lag.latest(), samples);
    }

    #[tokio::test]
    async fn test_samples_written_with_ttl() {
        let f = fixture();
        f.log
            .append(row("europe", f.clock.now(), ReplicationStatus::Success, 80))
            .await
            .unwrap();
        f.lag.aggregate_once().await.unwrap();

        let raw = f.store.get("lag:us-west:europe").await.unwrap().unwrap();
        let stored: LagSample = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored.avg_latency_ms, Some(80.0));

        // Two aggregation intervals.
        f.clock.advance(Duration::from_secs(101));
        assert!(f.store.get("lag:us-west:europe").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_log() {
        let f = fixture();
        assert!(f.lag.aggregate_once().await.unwrap().is_empty());
        assert!(f.store.is_empty());
    }
}
