//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (backup regions reference existing regions)
//! - Validate value ranges (timeouts > 0, TTL ordering)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: NodeConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use thiserror::Error;
use url::Url;

use crate::config::schema::NodeConfig;
use crate::geo::locator::parse_network;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("no regions configured")]
    NoRegions,

    #[error("duplicate region id '{0}'")]
    DuplicateRegion(String),

    #[error("region id '{0}' must be non-empty and must not contain ':'")]
    InvalidRegionId(String),

    #[error("region '{region}' lists backup region '{backup}' more than once")]
    DuplicateBackup { region: String, backup: String },

    #[error("region '{region}' lists unknown backup region '{backup}'")]
    UnknownBackupRegion { region: String, backup: String },

    #[error("region '{0}' lists itself as a backup")]
    SelfBackup(String),

    #[error("region '{region}' has invalid coordinates ({latitude}, {longitude})")]
    InvalidCoordinates {
        region: String,
        latitude: f64,
        longitude: f64,
    },

    #[error("region '{region}' has invalid ingress url '{url}'")]
    InvalidIngressUrl { region: String, url: String },

    #[error("more than one primary region: {0:?}")]
    MultiplePrimaries(Vec<String>),

    #[error("node region '{0}' is not a configured region")]
    UnknownNodeRegion(String),

    #[error("invalid geoip cidr '{0}'")]
    InvalidCidr(String),

    #[error("geoip entry '{cidr}' has invalid coordinates ({latitude}, {longitude})")]
    InvalidGeoIpCoordinates {
        cidr: String,
        latitude: f64,
        longitude: f64,
    },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("heartbeat ttl ({ttl}s) must exceed heartbeat interval ({interval}s)")]
    HeartbeatTtlTooShort { ttl: u64, interval: u64 },

    #[error("global cache ttl ({global}s) must be >= local cache ttl ({local}s)")]
    CacheTtlOrder { local: u64, global: u64 },
}

/// Check a parsed configuration for semantic errors.
pub fn validate_config(config: &NodeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.regions.is_empty() {
        errors.push(ValidationError::NoRegions);
    }

    let mut ids = HashSet::new();
    for region in &config.regions {
        // ':' separates the segments of health and lag keys.
        if region.id.is_empty() || region.id.contains(':') {
            errors.push(ValidationError::InvalidRegionId(region.id.clone()));
        }
        if !ids.insert(region.id.as_str()) {
            errors.push(ValidationError::DuplicateRegion(region.id.clone()));
        }
    }

    for region in &config.regions {
        let mut seen = HashSet::new();
        for backup in &region.backup_regions {
            if !seen.insert(backup.as_str()) {
                errors.push(ValidationError::DuplicateBackup {
                    region: region.id.clone(),
                    backup: backup.clone(),
                });
            } else if backup == &region.id {
                errors.push(ValidationError::SelfBackup(region.id.clone()));
            } else if !ids.contains(backup.as_str()) {
                errors.push(ValidationError::UnknownBackupRegion {
                    region: region.id.clone(),
                    backup: backup.clone(),
                });
            }
        }

        if !valid_coordinates(region.latitude, region.longitude) {
            errors.push(ValidationError::InvalidCoordinates {
                region: region.id.clone(),
                latitude: region.latitude,
                longitude: region.longitude,
            });
        }

        if Url::parse(&region.ingress_url).is_err() {
            errors.push(ValidationError::InvalidIngressUrl {
                region: region.id.clone(),
                url: region.ingress_url.clone(),
            });
        }
    }

    let primaries: Vec<String> = config
        .regions
        .iter()
        .filter(|r| r.primary)
        .map(|r| r.id.clone())
        .collect();
    if primaries.len() > 1 {
        errors.push(ValidationError::MultiplePrimaries(primaries));
    }

    if !config.regions.is_empty() && !ids.contains(config.node.region_id.as_str()) {
        errors.push(ValidationError::UnknownNodeRegion(config.node.region_id.clone()));
    }

    for entry in &config.geoip {
        if parse_network(&entry.cidr).is_err() {
            errors.push(ValidationError::InvalidCidr(entry.cidr.clone()));
        }
        if !valid_coordinates(entry.latitude, entry.longitude) {
            errors.push(ValidationError::InvalidGeoIpCoordinates {
                cidr: entry.cidr.clone(),
                latitude: entry.latitude,
                longitude: entry.longitude,
            });
        }
    }

    if config.node.request_timeout_secs == 0 {
        errors.push(ValidationError::Zero("node.request_timeout_secs"));
    }

    if config.replication.workers == 0 {
        errors.push(ValidationError::Zero("replication.workers"));
    }
    if config.replication.queue_capacity == 0 {
        errors.push(ValidationError::Zero("replication.queue_capacity"));
    }
    if config.replication.timeout_ms == 0 {
        errors.push(ValidationError::Zero("replication.timeout_ms"));
    }

    let health = &config.health;
    if health.heartbeat_interval_secs == 0 {
        errors.push(ValidationError::Zero("health.heartbeat_interval_secs"));
    }
    if health.lag_interval_multiplier == 0 {
        errors.push(ValidationError::Zero("health.lag_interval_multiplier"));
    }
    if health.lag_window_secs == 0 {
        errors.push(ValidationError::Zero("health.lag_window_secs"));
    }
    if health.heartbeat_ttl_secs <= health.heartbeat_interval_secs {
        errors.push(ValidationError::HeartbeatTtlTooShort {
            ttl: health.heartbeat_ttl_secs,
            interval: health.heartbeat_interval_secs,
        });
    }

    if config.cache.local_ttl_secs == 0 {
        errors.push(ValidationError::Zero("cache.local_ttl_secs"));
    }
    if config.cache.global_ttl_secs < config.cache.local_ttl_secs {
        errors.push(ValidationError::CacheTtlOrder {
            local: config.cache.local_ttl_secs,
            global: config.cache.global_ttl_secs,
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn valid_coordinates(latitude: f64, longitude: f64) -> bool {
    (-90.0..=90.0).contains(&latitude) && (-180.0..=180.0).contains(&longitude)
}
