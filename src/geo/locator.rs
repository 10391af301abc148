//! Client address to approximate location.
//!
//! # Responsibilities
//! - Resolve a client IP through the Geo-IP collaborator
//! - Fall back to the serving region on any miss
//!
//! # Design Decisions
//! - Never errors: private addresses, unknown addresses and collaborator
//!   failures all produce the serving region's location
//! - Static table uses longest-prefix match over `ipnetwork` networks

use async_trait::async_trait;
use ipnetwork::{IpNetwork, IpNetworkError};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use thiserror::Error;

use crate::config::GeoIpEntryConfig;
use crate::region::{Coordinates, Region};
use crate::store::StoreError;

/// What the Geo-IP collaborator knows about an address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoIpRecord {
    pub country: String,
    pub region: Option<String>,
    pub city: Option<String>,
    pub coordinates: Coordinates,
    pub timezone: String,
}

/// Geo-IP lookup collaborator. `Ok(None)` means not found.
#[async_trait]
pub trait GeoIpLookup: Send + Sync {
    async fn lookup(&self, addr: IpAddr) -> Result<Option<GeoIpRecord>, StoreError>;
}

/// How a [`GeoLocation`] was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationSource {
    Geoip,
    ServingRegionFallback,
}

/// Best-effort client location. Derived per request, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub coordinates: Coordinates,
    pub timezone: String,
    pub source: LocationSource,
}

/// Why a lookup fell back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupMiss {
    NonRoutable,
    NotFound,
    Unavailable,
}

/// Resolves client addresses on behalf of one serving region.
#[derive(Clone)]
pub struct GeoLocator {
    lookup: Arc<dyn GeoIpLookup>,
    serving: Region,
}

impl GeoLocator {
    pub fn new(lookup: Arc<dyn GeoIpLookup>, serving: Region) -> Self {
        Self { lookup, serving }
    }

    pub fn serving_region(&self) -> &Region {
        &self.serving
    }

    pub async fn locate(&self, addr: IpAddr) -> GeoLocation {
        match self.resolve(addr).await {
            Ok(record) => GeoLocation {
                country: Some(record.country),
                region: record.region,
                city: record.city,
                coordinates: record.coordinates,
                timezone: record.timezone,
                source: LocationSource::Geoip,
            },
            Err(miss) => {
                tracing::debug!(addr = %addr, reason = ?miss, region = %self.serving.id, "Geo lookup miss, using serving region");
                self.fallback()
            }
        }
    }

    async fn resolve(&self, addr: IpAddr) -> Result<GeoIpRecord, LookupMiss> {
        if !is_routable(addr) {
            return Err(LookupMiss::NonRoutable);
        }
        match self.lookup.lookup(addr).await {
            Ok(Some(record)) => Ok(record),
            Ok(None) => Err(LookupMiss::NotFound),
            Err(e) => {
                tracing::warn!(addr = %addr, error = %e, "Geo-IP collaborator failed");
                Err(LookupMiss::Unavailable)
            }
        }
    }

    fn fallback(&self) -> GeoLocation {
        GeoLocation {
            country: None,
            region: None,
            city: None,
            coordinates: self.serving.coordinates,
            timezone: self.serving.timezone.clone(),
            source: LocationSource::ServingRegionFallback,
        }
    }
}

/// Client address from an `X-Forwarded-For` value, else the socket peer.
pub fn client_addr(forwarded_for: Option<&str>, peer: IpAddr) -> IpAddr {
    forwarded_for
        .and_then(|value| {
            value
                .split(',')
                .find_map(|part| part.trim().parse::<IpAddr>().ok())
        })
        .unwrap_or(peer)
}

/// False for private, loopback, link-local and otherwise non-public addresses.
pub fn is_routable(addr: IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => is_routable_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_routable_v4(v4),
            None => is_routable_v6(v6),
        },
    }
}

fn is_routable_v4(addr: Ipv4Addr) -> bool {
    let shared = addr.octets()[0] == 100 && (addr.octets()[1] & 0xc0) == 64;
    !(addr.is_private()
        || addr.is_loopback()
        || addr.is_link_local()
        || addr.is_unspecified()
        || addr.is_broadcast()
        || addr.is_documentation()
        || shared)
}

fn is_routable_v6(addr: Ipv6Addr) -> bool {
    let first = addr.segments()[0];
    let unique_local = (first & 0xfe00) == 0xfc00;
    let link_local = (first & 0xffc0) == 0xfe80;
    !(addr.is_loopback() || addr.is_unspecified() || unique_local || link_local)
}

#[derive(Debug, Error)]
#[error("invalid cidr '{cidr}': {source}")]
pub struct CidrParseError {
    cidr: String,
    #[source]
    source: IpNetworkError,
}

/// Parse a `[[geoip]]` network. A bare address is a host route.
pub fn parse_network(cidr: &str) -> Result<IpNetwork, CidrParseError> {
    cidr.trim().parse::<IpNetwork>().map_err(|source| CidrParseError {
        cidr: cidr.to_string(),
        source,
    })
}

/// Geo-IP table loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticGeoIp {
    entries: Vec<(IpNetwork, GeoIpRecord)>,
}

impl StaticGeoIp {
    pub fn new(entries: Vec<(IpNetwork, GeoIpRecord)>) -> Self {
        Self { entries }
    }

    pub fn from_config(entries: &[GeoIpEntryConfig]) -> Result<Self, CidrParseError> {
        let entries = entries
            .iter()
            .map(|e| {
                let network = parse_network(&e.cidr)?;
                let record = GeoIpRecord {
                    country: e.country.clone(),
                    region: e.region.clone(),
                    city: e.city.clone(),
                    coordinates: Coordinates::new(e.latitude, e.longitude),
                    timezone: e.timezone.clone(),
                };
                Ok((network, record))
            })
            .collect::<Result<Vec<_>, CidrParseError>>()?;
        Ok(Self::new(entries))
    }

    fn find(&self, addr: IpAddr) -> Option<&GeoIpRecord> {
        self.entries
            .iter()
            .filter(|(network, _)| network.contains(addr))
            .max_by_key(|(network, _)| network.prefix())
            .map(|(_, record)| record)
    }
}

#[async_trait]
impl GeoIpLookup for StaticGeoIp {
    async fn lookup(&self, addr: IpAddr) -> Result<Option<GeoIpRecord>, StoreError> {
        Ok(self.find(addr).cloned())
    }
}
