//! Health records and region health state.
//!
//! # States
//! - Healthy: at least one live heartbeat reports healthy
//! - Degraded: live heartbeats exist but none report healthy
//! - Unknown: every heartbeat has expired (treated as unreachable)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const HEALTH_PREFIX: &str = "health:";
pub const LAG_PREFIX: &str = "lag:";

/// Status an instance reports about itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

/// One heartbeat. Stored with a TTL; absence means unknown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthRecord {
    pub region_id: String,
    pub instance_id: String,
    pub timestamp: DateTime<Utc>,
    pub status: HealthStatus,
    pub uptime_secs: u64,
    #[serde(default)]
    pub queue_depth: usize,
}

/// Aggregated view of one region derived from live heartbeats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RegionHealth {
    Healthy { instances: usize, latest: HealthRecord },
    Degraded { instances: usize, latest: HealthRecord },
    Unknown,
}

impl RegionHealth {
    /// Fold the live heartbeats of one region.
    pub fn from_records(mut records: Vec<HealthRecord>) -> Self {
        records.sort_by_key(|r| r.timestamp);
        let instances = records.len();
        let any_healthy = records.iter().any(|r| r.status == HealthStatus::Healthy);
        match records.pop() {
            None => RegionHealth::Unknown,
            Some(latest) if any_healthy => RegionHealth::Healthy { instances, latest },
            Some(latest) => RegionHealth::Degraded { instances, latest },
        }
    }

    pub fn is_reachable(&self) -> bool {
        !matches!(self, RegionHealth::Unknown)
    }
}

pub fn health_key(region_id: &str, instance_id: &str) -> String {
    format!("{}{}:{}", HEALTH_PREFIX, region_id, instance_id)
}

pub fn region_health_prefix(region_id: &str) -> String {
    format!("{}{}:", HEALTH_PREFIX, region_id)
}

pub fn lag_key(source: &str, target: &str) -> String {
    format!("{}{}:{}", LAG_PREFIX, source, target)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(instance: &str, secs: i64, status: HealthStatus) -> HealthRecord {
        HealthRecord {
            region_id: "europe".into(),
            instance_id: instance.into(),
            timestamp: DateTime::<Utc>::from_timestamp(secs, 0).unwrap(),
            status,
            uptime_secs: 1,
            queue_depth: 0,
        }
    }

    #[test]
    fn test_fold() {
        assert_eq!(RegionHealth::from_records(vec![]), RegionHealth::Unknown);

        let health = RegionHealth::from_records(vec![
            record("b", 20, HealthStatus::Degraded),
            record("a", 10, HealthStatus::Healthy),
        ]);
        match health {
            RegionHealth::Healthy { instances, latest } => {
                assert_eq!(instances, 2);
                assert_eq!(latest.instance_id, "b");
            }
            other => panic!("unexpected {:?}", other),
        }

        let health = RegionHealth::from_records(vec![record("a", 10, HealthStatus::Degraded)]);
        assert!(matches!(health, RegionHealth::Degraded { .. }));
        assert!(health.is_reachable());
    }

    #[test]
    fn test_keys() {
        assert_eq!(health_key("europe", "i-1"), "health:europe:i-1");
        assert!(health_key("europe", "i-1").starts_with(&region_health_prefix("europe")));
        assert_eq!(lag_key("us-west", "europe"), "lag:us-west:europe");
    }

    #[test]
    fn test_serialized_state_tag() {
        let json = serde_json::to_value(RegionHealth::Unknown).unwrap();
        assert_eq!(json["state"], "unknown");
    }
}
