//! Region health queries and job supervision.
//!
//! Owns the heartbeat publisher and the lag aggregator, starts both on the
//! node's shutdown broadcast, and answers "is region X reachable" from the
//! shared store alone.

use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

use crate::health::heartbeat::HeartbeatPublisher;
use crate::health::lag::{LagAggregator, LagSample};
use crate::health::record::{region_health_prefix, HealthRecord, RegionHealth};
use crate::lifecycle::Shutdown;
use crate::region::RegionRegistry;
use crate::store::{KvStore, StoreError};

/// One row of `all_regions`.
#[derive(Debug, Clone, Serialize)]
pub struct RegionHealthReport {
    pub region_id: String,
    pub health: RegionHealth,
}

pub struct HealthMonitor {
    store: Arc<dyn KvStore>,
    registry: Arc<RegionRegistry>,
    heartbeat: Arc<HeartbeatPublisher>,
    lag: Arc<LagAggregator>,
    enabled: bool,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl HealthMonitor {
    pub fn new(
        store: Arc<dyn KvStore>,
        registry: Arc<RegionRegistry>,
        heartbeat: Arc<HeartbeatPublisher>,
        lag: Arc<LagAggregator>,
        enabled: bool,
    ) -> Self {
        Self {
            store,
            registry,
            heartbeat,
            lag,
            enabled,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawn both periodic jobs. They exit when `shutdown` fires.
    pub fn start(&self, shutdown: &Shutdown) {
        if !self.enabled {
            tracing::info!("Health jobs disabled");
            return;
        }

        let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        handles.push(tokio::spawn(self.heartbeat.clone().run(shutdown.subscribe())));
        handles.push(tokio::spawn(self.lag.clone().run(shutdown.subscribe())));
    }

    /// Wait for the jobs to exit after shutdown was triggered.
    pub async fn join(&self) {
        let handles: Vec<_> = self
            .handles
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Health job panicked");
            }
        }
    }

    pub fn heartbeat(&self) -> &HeartbeatPublisher {
        &self.heartbeat
    }

    pub fn lag(&self) -> &LagAggregator {
        &self.lag
    }

    pub fn lag_samples(&self) -> Vec<LagSample> {
        self.lag.latest()
    }

    /// Health derived from the region's unexpired heartbeats.
    pub async fn region_health(&self, region_id: &str) -> Result<RegionHealth, StoreError> {
        let rows = self.store.scan_prefix(&region_health_prefix(region_id)).await?;
        let records = rows
            .into_iter()
            .filter_map(|(key, raw)| match serde_json::from_str::<HealthRecord>(&raw) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Skipping malformed health record");
                    None
                }
            })
            .collect();
        Ok(RegionHealth::from_records(records))
    }

    pub async fn is_reachable(&self, region_id: &str) -> bool {
        match self.region_health(region_id).await {
            Ok(health) => health.is_reachable(),
            Err(e) => {
                tracing::warn!(region = %region_id, error = %e, "Health lookup failed");
                false
            }
        }
    }

    /// Every registered region, sorted by id.
    pub async fn all_regions(&self) -> Result<Vec<RegionHealthReport>, StoreError> {
        let mut reports = Vec::with_capacity(self.registry.len());
        for region in self.registry.list() {
            reports.push(RegionHealthReport {
                region_id: region.id.clone(),
                health: self.region_health(&region.id).await?,
            });
        }
        Ok(reports)
    }
}
