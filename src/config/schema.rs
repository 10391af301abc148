//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for a region node.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for a region node.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Identity of this serving instance.
    pub node: NodeIdentityConfig,

    /// Every region in the deployment.
    pub regions: Vec<RegionConfig>,

    /// Static Geo-IP table.
    pub geoip: Vec<GeoIpEntryConfig>,

    /// Replication fan-out settings.
    pub replication: ReplicationConfig,

    /// Heartbeat and lag aggregation settings.
    pub health: HealthConfig,

    /// Two-tier cache settings.
    pub cache: CacheConfig,

    /// Nearest-datacenter ranking settings.
    pub routing: RoutingConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node: NodeIdentityConfig::default(),
            regions: default_regions(),
            geoip: Vec::new(),
            replication: ReplicationConfig::default(),
            health: HealthConfig::default(),
            cache: CacheConfig::default(),
            routing: RoutingConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Which region this instance serves and where it listens.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NodeIdentityConfig {
    /// Region served by this instance.
    pub region_id: String,

    /// Instance identifier. Generated (UUID v4) when empty.
    pub instance_id: String,

    /// Bind address for the HTTP surface (e.g., "0.0.0.0:3000").
    pub bind_address: String,

    /// Request timeout for the HTTP surface in seconds.
    pub request_timeout_secs: u64,
}

impl Default for NodeIdentityConfig {
    fn default() -> Self {
        Self {
            region_id: "us-west".to_string(),
            instance_id: String::new(),
            bind_address: "0.0.0.0:3000".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// A region definition.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RegionConfig {
    /// Unique region identifier (e.g., "us-west").
    pub id: String,

    /// Human-readable name.
    pub name: String,

    /// IANA timezone (e.g., "America/Los_Angeles").
    pub timezone: String,

    pub latitude: f64,
    pub longitude: f64,

    /// Is this the primary region.
    #[serde(default)]
    pub primary: bool,

    /// Regions that receive asynchronous copies of this region's writes.
    #[serde(default)]
    pub backup_regions: Vec<String>,

    /// Edge/CDN point-of-presence identifiers attached to this region.
    #[serde(default)]
    pub edge_locations: Vec<String>,

    /// Base URL of this region's replication ingress (e.g., "http://us-east.internal:3000").
    pub ingress_url: String,
}

/// One row of the static Geo-IP table.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct GeoIpEntryConfig {
    /// Network in CIDR notation (e.g., "81.2.69.0/24").
    pub cidr: String,

    pub country: String,

    #[serde(default)]
    pub region: Option<String>,

    #[serde(default)]
    pub city: Option<String>,

    pub latitude: f64,
    pub longitude: f64,

    pub timezone: String,
}

/// Replication fan-out configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReplicationConfig {
    /// Fixed number of push workers.
    pub workers: usize,

    /// Bounded queue capacity. Tasks beyond this are logged as failed.
    pub queue_capacity: usize,

    /// Per-push timeout in milliseconds.
    pub timeout_ms: u64,

    /// Path appended to a region's ingress URL.
    pub ingress_path: String,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 1024,
            timeout_ms: 5000,
            ingress_path: "/internal/replicate".to_string(),
        }
    }
}

impl ReplicationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Heartbeat and lag aggregation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Enable the periodic jobs.
    pub enabled: bool,

    /// Heartbeat interval in seconds.
    pub heartbeat_interval_secs: u64,

    /// Heartbeat record TTL in seconds. Must exceed the interval.
    pub heartbeat_ttl_secs: u64,

    /// Lag aggregation runs every `heartbeat_interval * lag_interval_multiplier`.
    pub lag_interval_multiplier: u32,

    /// Trailing window scanned by the lag aggregator, in seconds.
    pub lag_window_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            heartbeat_interval_secs: 10,
            heartbeat_ttl_secs: 30,
            lag_interval_multiplier: 5,
            lag_window_secs: 300,
        }
    }
}

impl HealthConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn heartbeat_ttl(&self) -> Duration {
        Duration::from_secs(self.heartbeat_ttl_secs)
    }

    pub fn lag_interval(&self) -> Duration {
        self.heartbeat_interval() * self.lag_interval_multiplier
    }

    pub fn lag_window(&self) -> Duration {
        Duration::from_secs(self.lag_window_secs)
    }
}

/// Two-tier cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Local tier TTL in seconds.
    pub local_ttl_secs: u64,

    /// Global tier TTL in seconds. Must be >= local.
    pub global_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            local_ttl_secs: 60,
            global_ttl_secs: 300,
        }
    }
}

/// Distance metric used to rank regions.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Euclidean distance over raw latitude/longitude degrees.
    #[default]
    Planar,
    /// Great-circle distance in kilometres.
    Haversine,
}

/// Routing configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub distance_metric: DistanceMetric,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log format ("pretty" or "json").
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// The built-in three-region layout used when no config file is given.
fn default_regions() -> Vec<RegionConfig> {
    vec![
        RegionConfig {
            id: "us-west".to_string(),
            name: "US West".to_string(),
            timezone: "America/Los_Angeles".to_string(),
            latitude: 37.7749,
            longitude: -122.4194,
            primary: true,
            backup_regions: vec!["us-east".to_string(), "europe".to_string()],
            edge_locations: vec!["sfo".to_string(), "lax".to_string(), "sea".to_string()],
            ingress_url: "http://localhost:3000".to_string(),
        },
        RegionConfig {
            id: "us-east".to_string(),
            name: "US East".to_string(),
            timezone: "America/New_York".to_string(),
            latitude: 40.7128,
            longitude: -74.0060,
            primary: false,
            backup_regions: vec!["us-west".to_string()],
            edge_locations: vec!["iad".to_string(), "jfk".to_string()],
            ingress_url: "http://localhost:3001".to_string(),
        },
        RegionConfig {
            id: "europe".to_string(),
            name: "Europe".to_string(),
            timezone: "Europe/London".to_string(),
            latitude: 51.5074,
            longitude: -0.1278,
            primary: false,
            backup_regions: vec!["us-east".to_string()],
            edge_locations: vec!["lhr".to_string(), "fra".to_string(), "ams".to_string()],
            ingress_url: "http://localhost:3002".to_string(),
        },
    ]
}
