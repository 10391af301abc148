//! Static per-region metadata and lookup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::config::RegionConfig;

/// A point on the map in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// A named deployment locality with its own datastore, cache and compute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    /// Region ID
    pub id: String,
    /// Display name
    pub name: String,
    /// IANA timezone
    pub timezone: String,
    pub coordinates: Coordinates,
    /// Is primary region
    pub is_primary: bool,
    /// Regions receiving asynchronous copies of this region's writes
    pub backup_regions: Vec<String>,
    /// Edge/CDN point-of-presence ids
    pub edge_locations: Vec<String>,
    /// Base URL of the replication ingress
    pub ingress_url: String,
}

impl From<&RegionConfig> for Region {
    fn from(config: &RegionConfig) -> Self {
        Self {
            id: config.id.clone(),
            name: config.name.clone(),
            timezone: config.timezone.clone(),
            coordinates: Coordinates::new(config.latitude, config.longitude),
            is_primary: config.primary,
            backup_regions: config.backup_regions.clone(),
            edge_locations: config.edge_locations.clone(),
            ingress_url: config.ingress_url.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("duplicate region id '{0}'")]
    DuplicateRegion(String),

    #[error("region '{region}' lists unknown backup region '{backup}'")]
    DanglingBackup { region: String, backup: String },

    #[error("region '{0}' lists itself as a backup")]
    SelfBackup(String),

    #[error("region '{region}' lists backup region '{backup}' more than once")]
    DuplicateBackup { region: String, backup: String },

    #[error("invalid region id '{0}'")]
    InvalidId(String),
}

/// Read-only lookup over every region in the deployment.
#[derive(Debug, Clone)]
pub struct RegionRegistry {
    regions: HashMap<String, Region>,
    /// Region ids in sorted order for deterministic listing.
    order: Vec<String>,
}

impl RegionRegistry {
    /// Build the registry, rejecting any region whose backups do not resolve.
    pub fn new(regions: Vec<Region>) -> Result<Self, RegistryError> {
        let mut map = HashMap::with_capacity(regions.len());
        for region in regions {
            if region.id.is_empty() || region.id.contains(':') {
                return Err(RegistryError::InvalidId(region.id));
            }
            if map.contains_key(&region.id) {
                return Err(RegistryError::DuplicateRegion(region.id));
            }
            map.insert(region.id.clone(), region);
        }

        for region in map.values() {
            for (i, backup) in region.backup_regions.iter().enumerate() {
                if region.backup_regions[..i].contains(backup) {
                    return Err(RegistryError::DuplicateBackup {
                        region: region.id.clone(),
                        backup: backup.clone(),
                    });
                }
                if backup == &region.id {
                    return Err(RegistryError::SelfBackup(region.id.clone()));
                }
                if !map.contains_key(backup) {
                    return Err(RegistryError::DanglingBackup {
                        region: region.id.clone(),
                        backup: backup.clone(),
                    });
                }
            }
        }

        let mut order: Vec<String> = map.keys().cloned().collect();
        order.sort();

        Ok(Self {
            regions: map,
            order,
        })
    }

    pub fn from_config(configs: &[RegionConfig]) -> Result<Self, RegistryError> {
        Self::new(configs.iter().map(Region::from).collect())
    }

    pub fn lookup(&self, id: &str) -> Option<&Region> {
        self.regions.get(id)
    }

    /// All regions, ordered by id.
    pub fn list(&self) -> Vec<&Region> {
        self.order
            .iter()
            .filter_map(|id| self.regions.get(id))
            .collect()
    }

    /// Resolve a region's backup list. `None` if the region is unknown.
    pub fn backups_of(&self, id: &str) -> Option<Vec<&Region>> {
        let region = self.regions.get(id)?;
        Some(
            region
                .backup_regions
                .iter()
                .filter_map(|b| self.regions.get(b))
                .collect(),
        )
    }

    pub fn primary(&self) -> Option<&Region> {
        self.list().into_iter().find(|r| r.is_primary)
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfig;

    fn region(id: &str, backups: &[&str]) -> Region {
        Region {
            id: id.to_string(),
            name: id.to_uppercase(),
            timezone: "UTC".to_string(),
            coordinates: Coordinates::new(0.0, 0.0),
            is_primary: false,
            backup_regions: backups.iter().map(|s| s.to_string()).collect(),
            edge_locations: Vec::new(),
            ingress_url: format!("http://{}.internal", id),
        }
    }

    #[test]
    fn test_default_layout_has_referential_integrity() {
        let registry = RegionRegistry::from_config(&NodeConfig::default().regions).unwrap();
        for r in registry.list() {
            for backup in &r.backup_regions {
                assert!(registry.lookup(backup).is_some(), "{} -> {}", r.id, backup);
            }
        }
        assert_eq!(registry.primary().unwrap().id, "us-west");
    }

    #[test]
    fn test_dangling_backup_rejected() {
        let err = RegionRegistry::new(vec![region("a", &["b"])]).unwrap_err();
        assert_eq!(
            err,
            RegistryError::DanglingBackup {
                region: "a".into(),
                backup: "b".into()
            }
        );
    }

    #[test]
    fn test_self_backup_rejected() {
        let err = RegionRegistry::new(vec![region("a", &["a"])]).unwrap_err();
        assert_eq!(err, RegistryError::SelfBackup("a".into()));
    }

    #[test]
    fn test_duplicate_rejected() {
        let err = RegionRegistry::new(vec![region("a", &[]), region("a", &[])]).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateRegion("a".into()));
    }

    #[test]
    fn test_duplicate_backup_rejected() {
        let err = RegionRegistry::new(vec![region("a", &["b", "b"]), region("b", &[])]).unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicateBackup {
                region: "a".into(),
                backup: "b".into()
            }
        );
    }

    #[test]
    fn test_separator_in_id_rejected() {
        let err = RegionRegistry::new(vec![region("us", &[]), region("us:west", &[])]).unwrap_err();
        assert_eq!(err, RegistryError::InvalidId("us:west".into()));
    }

    #[test]
    fn test_list_is_sorted_and_backups_resolve() {
        let registry = RegionRegistry::new(vec![
            region("c", &["a"]),
            region("a", &["b", "c"]),
            region("b", &[]),
        ])
        .unwrap();

        let ids: Vec<&str> = registry.list().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);

        let backups: Vec<&str> = registry
            .backups_of("a")
            .unwrap()
            .iter()
            .map(|r| r.id.as_str())
            .collect();
        assert_eq!(backups, vec!["b", "c"]);
        assert!(registry.backups_of("zz").is_none());
        assert!(registry.primary().is_none());
    }
}
