//! Heartbeat publication.
//!
//! # Responsibilities
//! - Periodically write this instance's HealthRecord with a TTL
//! - Report degraded when the replication queue is nearly full

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time;

use crate::health::record::{health_key, HealthRecord, HealthStatus};
use crate::observability::{metrics, Stats};
use crate::replication::ReplicationCoordinator;
use crate::store::{Clock, KvStore, StoreError};

/// Queue depth at or above this fraction of capacity reports degraded.
const DEGRADED_QUEUE_RATIO: f64 = 0.8;

/// Load signal sampled into each heartbeat.
pub trait LoadProbe: Send + Sync {
    fn queue_depth(&self) -> usize;
    fn queue_capacity(&self) -> usize;
}

impl LoadProbe for ReplicationCoordinator {
    fn queue_depth(&self) -> usize {
        ReplicationCoordinator::queue_depth(self)
    }

    fn queue_capacity(&self) -> usize {
        ReplicationCoordinator::queue_capacity(self)
    }
}

pub struct HeartbeatPublisher {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    probe: Arc<dyn LoadProbe>,
    stats: Arc<Stats>,
    region_id: String,
    instance_id: String,
    interval: Duration,
    ttl: Duration,
    started_at: DateTime<Utc>,
}

impl HeartbeatPublisher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn KvStore>,
        clock: Arc<dyn Clock>,
        probe: Arc<dyn LoadProbe>,
        stats: Arc<Stats>,
        region_id: impl Into<String>,
        instance_id: impl Into<String>,
        interval: Duration,
        ttl: Duration,
    ) -> Self {
        let started_at = clock.now();
        Self {
            store,
            clock,
            probe,
            stats,
            region_id: region_id.into(),
            instance_id: instance_id.into(),
            interval,
            ttl,
            started_at,
        }
    }

    /// Build and store one heartbeat.
    pub async fn publish_once(&self) -> Result<HealthRecord, StoreError> {
        let now = self.clock.now();
        let depth = self.probe.queue_depth();
        let capacity = self.probe.queue_capacity().max(1);
        let status = if depth as f64 >= capacity as f64 * DEGRADED_QUEUE_RATIO {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        let record = HealthRecord {
            region_id: self.region_id.clone(),
            instance_id: self.instance_id.clone(),
            timestamp: now,
            status,
            uptime_secs: (now - self.started_at).num_seconds().max(0) as u64,
            queue_depth: depth,
        };

        let key = health_key(&self.region_id, &self.instance_id);
        self.store
            .set_with_ttl(&key, serde_json::to_string(&record)?, self.ttl)
            .await?;

        self.stats.heartbeat_published();
        metrics::record_heartbeat(&self.region_id);
        tracing::debug!(region = %self.region_id, instance = %self.instance_id, status = ?status, "Heartbeat published");
        Ok(record)
    }

    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            region = %self.region_id,
            instance = %self.instance_id,
            interval_secs = self.interval.as_secs(),
            ttl_secs = self.ttl.as_secs(),
            "Heartbeat publisher starting"
        );

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.publish_once().await {
                        tracing::warn!(error = %e, "Heartbeat publish failed");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Heartbeat publisher received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ManualClock, MemoryKvStore};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedLoad(AtomicUsize);

    impl LoadProbe for FixedLoad {
        fn queue_depth(&self) -> usize {
            self.0.load(Ordering::Relaxed)
        }

        fn queue_capacity(&self) -> usize {
            10
        }
    }

    fn publisher(clock: Arc<ManualClock>, store: MemoryKvStore, load: Arc<FixedLoad>) -> HeartbeatPublisher {
        HeartbeatPublisher::new(
            Arc::new(store),
            clock,
            load,
            Arc::new(Stats::new()),
            "europe",
            "i-1",
            Duration::from_secs(10),
            Duration::from_secs(30),
        )
    }

    #[tokio::test]
    async fn test_record_visible_until_ttl() {
        let clock = Arc::new(ManualClock::default());
        let store = MemoryKvStore::with_clock(clock.clone());
        let hb = publisher(clock.clone(), store.clone(), Arc::new(FixedLoad(AtomicUsize::new(0))));

        let record = hb.publish_once().await.unwrap();
        assert_eq!(record.status, HealthStatus::Healthy);

        let raw = store.get("health:europe:i-1").await.unwrap().unwrap();
        let stored: HealthRecord = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored, record);

        clock.advance(Duration::from_secs(30));
        assert!(store.get("health:europe:i-1").await.unwrap().is_some());
        clock.advance(Duration::from_secs(1));
        assert!(store.get("health:europe:i-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_uptime_and_degraded() {
        let clock = Arc::new(ManualClock::default());
        let store = MemoryKvStore::with_clock(clock.clone());
        let load = Arc::new(FixedLoad(AtomicUsize::new(0)));
        let hb = publisher(clock.clone(), store, load.clone());

        clock.advance(Duration::from_secs(95));
        load.0.store(8, Ordering::Relaxed);
        let record = hb.publish_once().await.unwrap();
        assert_eq!(record.uptime_secs, 95);
        assert_eq!(record.status, HealthStatus::Degraded);
        assert_eq!(record.queue_depth, 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_loop_ticks_until_shutdown() {
        let clock = Arc::new(ManualClock::default());
        let store = MemoryKvStore::with_clock(clock.clone());
        let stats = Arc::new(Stats::new());
        let hb = Arc::new(HeartbeatPublisher::new(
            Arc::new(store),
            clock,
            Arc::new(FixedLoad(AtomicUsize::new(0))),
            stats.clone(),
            "europe",
            "i-1",
            Duration::from_secs(10),
            Duration::from_secs(30),
        ));

        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(hb.run(rx));

        // Ticks at 0s, 10s, 20s.
        time::sleep(Duration::from_secs(25)).await;
        tx.send(()).unwrap();
        handle.await.unwrap();

        assert_eq!(stats.snapshot().heartbeats_published, 3);
    }
}
