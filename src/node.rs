//! A single serving instance of one region.
//!
//! # Responsibilities
//! - Own every subsystem for the served region
//! - Write path: commit → invalidate → replicate (fire-and-forget)
//! - Read path: two-tier cache in front of the record store
//! - Ingress path: apply a replicated write without fanning it out again
//!
//! # Design Decisions
//! - Only the local commit and the cache invalidation can fail a write
//! - Replication failures are logged, never returned
//! - Background jobs listen on the node's own shutdown broadcast so the
//!   listener can stop before replication drains

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::cache::{CacheError, CacheManager, CacheTier};
use crate::config::NodeConfig;
use crate::geo::locator::CidrParseError;
use crate::geo::{GeoIpLookup, GeoLocator, NearestResolver, RankedRegion, RoutingAdvice, StaticGeoIp};
use crate::health::{HealthMonitor, HeartbeatPublisher, LagAggregator};
use crate::lifecycle::Shutdown;
use crate::observability::Stats;
use crate::region::{Coordinates, Region, RegionRegistry, RegistryError};
use crate::replication::{
    HttpIngressClient, IngressClient, MemoryReplicationLog, Operation, ReplicationCoordinator,
    ReplicationEnvelope, ReplicationLog,
};
use crate::store::records::record_cache_key;
use crate::store::{Clock, KvStore, MemoryKvStore, MemoryRecordStore, Record, RecordStore, StoreError, SystemClock};

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("invalid region layout: {0}")]
    Registry(#[from] RegistryError),

    #[error("served region '{0}' is not configured")]
    UnknownRegion(String),

    #[error("invalid geoip table: {0}")]
    GeoIp(#[from] CidrParseError),
}

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("datastore error: {0}")]
    Store(#[from] StoreError),

    #[error("cache invalidation failed: {0}")]
    CacheInvalidation(CacheError),

    #[error("replicated write from unknown region '{0}'")]
    UnknownSource(String),
}

/// External systems a node talks to.
pub struct Collaborators {
    pub kv: Arc<dyn KvStore>,
    pub records: Arc<dyn RecordStore>,
    pub log: Arc<dyn ReplicationLog>,
    pub ingress: Arc<dyn IngressClient>,
    pub geoip: Arc<dyn GeoIpLookup>,
    pub clock: Arc<dyn Clock>,
}

impl Collaborators {
    /// Single-process defaults: in-memory stores, HTTP ingress, static Geo-IP table.
    pub fn in_memory(config: &NodeConfig) -> Result<Self, NodeError> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Ok(Self {
            kv: Arc::new(MemoryKvStore::with_clock(clock.clone())),
            records: Arc::new(MemoryRecordStore::new()),
            log: Arc::new(MemoryReplicationLog::new()),
            ingress: Arc::new(HttpIngressClient::new(config.replication.ingress_path.clone())),
            geoip: Arc::new(StaticGeoIp::from_config(&config.geoip)?),
            clock,
        })
    }
}

/// Snapshot served by `GET /status`.
#[derive(Debug, Clone, Serialize)]
pub struct NodeStatus {
    pub region_id: String,
    pub region_name: String,
    pub instance_id: String,
    pub is_primary: bool,
    pub backup_regions: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
    pub queue_depth: usize,
    pub queue_capacity: usize,
    pub pending_replications: usize,
    pub version: &'static str,
}

pub struct RegionNode {
    region: Region,
    instance_id: String,
    registry: Arc<RegionRegistry>,
    records: Arc<dyn RecordStore>,
    log: Arc<dyn ReplicationLog>,
    clock: Arc<dyn Clock>,
    cache: CacheManager,
    locator: GeoLocator,
    resolver: NearestResolver,
    coordinator: Arc<ReplicationCoordinator>,
    health: HealthMonitor,
    stats: Arc<Stats>,
    writes: WriteFence,
    jobs: Shutdown,
    started_at: DateTime<Utc>,
}

/// Tracks local commits so a read never caches a row a concurrent write replaced.
#[derive(Default)]
struct WriteFence {
    in_progress: AtomicUsize,
    generation: AtomicU64,
}

impl WriteFence {
    fn enter(&self) -> WriteGuard<'_> {
        self.in_progress.fetch_add(1, Ordering::SeqCst);
        WriteGuard { fence: self }
    }

    /// `None` while a write is in progress.
    fn snapshot(&self) -> Option<u64> {
        let generation = self.generation.load(Ordering::SeqCst);
        (self.in_progress.load(Ordering::SeqCst) == 0).then_some(generation)
    }
}

struct WriteGuard<'a> {
    fence: &'a WriteFence,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.fence.generation.fetch_add(1, Ordering::SeqCst);
        self.fence.in_progress.fetch_sub(1, Ordering::SeqCst);
    }
}

impl RegionNode {
    /// Build every subsystem and spawn the replication workers and health jobs.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(config: &NodeConfig, collaborators: Collaborators) -> Result<Self, NodeError> {
        let Collaborators {
            kv,
            records,
            log,
            ingress,
            geoip,
            clock,
        } = collaborators;

        let registry = Arc::new(RegionRegistry::from_config(&config.regions)?);
        let region = registry
            .lookup(&config.node.region_id)
            .cloned()
            .ok_or_else(|| NodeError::UnknownRegion(config.node.region_id.clone()))?;
        let instance_id = if config.node.instance_id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            config.node.instance_id.clone()
        };

        let stats = Arc::new(Stats::new());
        let jobs = Shutdown::new();

        let cache = CacheManager::new(kv.clone(), clock.clone(), &config.cache, stats.clone());
        let locator = GeoLocator::new(geoip, region.clone());
        let resolver = NearestResolver::new(registry.clone(), region.id.clone(), config.routing.distance_metric);

        let coordinator = Arc::new(ReplicationCoordinator::start(
            registry.clone(),
            ingress,
            log.clone(),
            clock.clone(),
            stats.clone(),
            &config.replication,
            &jobs,
        ));

        let heartbeat = Arc::new(HeartbeatPublisher::new(
            kv.clone(),
            clock.clone(),
            coordinator.clone(),
            stats.clone(),
            region.id.clone(),
            instance_id.clone(),
            config.health.heartbeat_interval(),
            config.health.heartbeat_ttl(),
        ));
        let lag = Arc::new(LagAggregator::new(
            log.clone(),
            kv.clone(),
            clock.clone(),
            config.health.lag_interval(),
            config.health.lag_window(),
        ));
        let health = HealthMonitor::new(kv, registry.clone(), heartbeat, lag, config.health.enabled);
        health.start(&jobs);

        tracing::info!(
            region = %region.id,
            instance = %instance_id,
            primary = region.is_primary,
            backups = ?region.backup_regions,
            "Region node started"
        );

        Ok(Self {
            started_at: clock.now(),
            region,
            instance_id,
            registry,
            records,
            log,
            clock,
            cache,
            locator,
            resolver,
            coordinator,
            health,
            stats,
            writes: WriteFence::default(),
            jobs,
        })
    }

    /// Commit locally, invalidate cached copies, then schedule replication.
    ///
    /// Returns the number of replication tasks scheduled.
    pub async fn write(&self, record: Record, operation: Operation) -> Result<usize, WriteError> {
        self.commit(&record, operation).await?;

        let scheduled = match self.coordinator.replicate(&record, operation, &self.region.id) {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(
                    table = %record.table,
                    record_id = %record.id,
                    error = %e,
                    "Replication scheduling failed, local write kept"
                );
                0
            }
        };

        tracing::debug!(
            table = %record.table,
            record_id = %record.id,
            operation = %operation,
            scheduled,
            "Write committed"
        );
        Ok(scheduled)
    }

    /// Apply a write pushed from another region. Never replicated further.
    pub async fn apply_replicated(&self, envelope: ReplicationEnvelope) -> Result<(), WriteError> {
        if self.registry.lookup(&envelope.source_region).is_none() {
            return Err(WriteError::UnknownSource(envelope.source_region));
        }

        self.commit(&envelope.record, envelope.operation).await?;
        tracing::debug!(
            source = %envelope.source_region,
            table = %envelope.record.table,
            record_id = %envelope.record.id,
            operation = %envelope.operation,
            "Replicated write applied"
        );
        Ok(())
    }

    async fn commit(&self, record: &Record, operation: Operation) -> Result<(), WriteError> {
        let _guard = self.writes.enter();
        match operation {
            Operation::Insert | Operation::Update => self.records.upsert(record.clone()).await?,
            Operation::Delete => {
                self.records.delete(&record.table, &record.id).await?;
            }
        }

        self.cache
            .invalidate(&record.cache_key())
            .await
            .map_err(WriteError::CacheInvalidation)?;
        self.cache
            .invalidate(&format!("{}:list:*", record.table))
            .await
            .map_err(WriteError::CacheInvalidation)?;
        Ok(())
    }

    /// Cache-through read of one record.
    ///
    /// The fetched row is cached only if no local write overlapped the fetch.
    /// Writes on other instances can still race a populate until the entry's
    /// TTL runs out.
    pub async fn read(&self, table: &str, id: &str) -> Result<Option<Record>, StoreError> {
        let key = record_cache_key(table, id);
        if let Some(record) = self.cache.get_json::<Record>(&key).await {
            return Ok(Some(record));
        }

        let before = self.writes.snapshot();
        let record = self.records.get(table, id).await?;
        if let Some(record) = &record {
            if before.is_some() && self.writes.snapshot() == before {
                if let Err(e) = self.cache.set_json(&key, record, CacheTier::Global).await {
                    tracing::warn!(key = %key, error = %e, "Cache populate failed");
                }
                // A write that started after the check may have invalidated
                // before the populate landed.
                if self.writes.snapshot() != before {
                    if let Err(e) = self.cache.invalidate(&key).await {
                        tracing::warn!(key = %key, error = %e, "Dropping overlapped populate failed");
                    }
                }
            } else {
                tracing::debug!(key = %key, "Write overlapped read, not caching");
            }
        }
        Ok(record)
    }

    pub async fn routing_advice(&self, client: IpAddr) -> RoutingAdvice {
        let location = self.locator.locate(client).await;
        self.resolver.advise(location)
    }

    pub fn nearest_regions(&self, coordinates: Coordinates) -> Vec<RankedRegion> {
        self.resolver.nearest_regions(coordinates)
    }

    pub fn status(&self) -> NodeStatus {
        let now = self.clock.now();
        NodeStatus {
            region_id: self.region.id.clone(),
            region_name: self.region.name.clone(),
            instance_id: self.instance_id.clone(),
            is_primary: self.region.is_primary,
            backup_regions: self.region.backup_regions.clone(),
            started_at: self.started_at,
            uptime_secs: (now - self.started_at).num_seconds().max(0) as u64,
            queue_depth: self.coordinator.queue_depth(),
            queue_capacity: self.coordinator.queue_capacity(),
            pending_replications: self.coordinator.pending(),
            version: env!("CARGO_PKG_VERSION"),
        }
    }

    pub fn region(&self) -> &Region {
        &self.region
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn registry(&self) -> &RegionRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    pub fn coordinator(&self) -> &ReplicationCoordinator {
        &self.coordinator
    }

    pub fn health(&self) -> &HealthMonitor {
        &self.health
    }

    pub fn replication_log(&self) -> &dyn ReplicationLog {
        self.log.as_ref()
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Drain replication, then stop workers and health jobs.
    pub async fn shutdown(&self) {
        tracing::info!(pending = self.coordinator.pending(), "Draining replication queue");
        self.coordinator.drain().await;
        self.jobs.trigger();
        self.coordinator.join().await;
        self.health.join().await;
        tracing::info!(stats = ?self.stats.snapshot(), "Region node stopped");
    }
}
