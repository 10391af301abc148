//! Nearest-datacenter ranking.
//!
//! # Responsibilities
//! - Rank every known region by distance to a location
//! - Report whether the serving region is the best choice
//!
//! # Design Decisions
//! - Planar distance over raw degrees is the default. It ignores longitude
//!   convergence toward the poles and the antimeridian wrap
//! - Ties are broken by region id so the same input always ranks the same way

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;

use crate::config::DistanceMetric;
use crate::geo::locator::GeoLocation;
use crate::region::{Coordinates, Region, RegionRegistry};

const EARTH_RADIUS_KM: f64 = 6371.0;

/// One entry of a ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedRegion {
    pub region_id: String,
    pub name: String,
    pub distance: f64,
}

/// Whether the serving region is the top-ranked one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingDecision {
    Optimal,
    Suboptimal,
}

/// Routing advice for one client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingAdvice {
    pub client_location: GeoLocation,
    pub serving_region: String,
    pub recommended_region: Option<String>,
    pub decision: RoutingDecision,
    pub ranked: Vec<RankedRegion>,
}

impl DistanceMetric {
    pub fn distance(&self, a: Coordinates, b: Coordinates) -> f64 {
        match self {
            DistanceMetric::Planar => planar_distance(a, b),
            DistanceMetric::Haversine => haversine_km(a, b),
        }
    }
}

pub fn planar_distance(a: Coordinates, b: Coordinates) -> f64 {
    let dlat = a.latitude - b.latitude;
    let dlon = a.longitude - b.longitude;
    (dlat * dlat + dlon * dlon).sqrt()
}

pub fn haversine_km(a: Coordinates, b: Coordinates) -> f64 {
    let (lat1, lat2) = (a.latitude.to_radians(), b.latitude.to_radians());
    let dlat = lat2 - lat1;
    let dlon = (b.longitude - a.longitude).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

/// Sort regions ascending by distance to `from`, ties by id.
pub fn rank_regions<'a, I>(from: Coordinates, regions: I, metric: DistanceMetric) -> Vec<RankedRegion>
where
    I: IntoIterator<Item = &'a Region>,
{
    let mut ranked: Vec<RankedRegion> = regions
        .into_iter()
        .map(|r| RankedRegion {
            region_id: r.id.clone(),
            name: r.name.clone(),
            distance: metric.distance(from, r.coordinates),
        })
        .collect();

    ranked.sort_by(|a, b| match a.distance.total_cmp(&b.distance) {
        Ordering::Equal => a.region_id.cmp(&b.region_id),
        other => other,
    });
    ranked
}

/// Ranks the registry's regions for a given serving region.
#[derive(Debug, Clone)]
pub struct NearestResolver {
    registry: Arc<RegionRegistry>,
    serving_region: String,
    metric: DistanceMetric,
}

impl NearestResolver {
    pub fn new(registry: Arc<RegionRegistry>, serving_region: impl Into<String>, metric: DistanceMetric) -> Self {
        Self {
            registry,
            serving_region: serving_region.into(),
            metric,
        }
    }

    pub fn nearest_regions(&self, coordinates: Coordinates) -> Vec<RankedRegion> {
        rank_regions(coordinates, self.registry.list(), self.metric)
    }

    pub fn decision(&self, ranked: &[RankedRegion]) -> RoutingDecision {
        match ranked.first() {
            Some(top) if top.region_id != self.serving_region => RoutingDecision::Suboptimal,
            _ => RoutingDecision::Optimal,
        }
    }

    pub fn advise(&self, location: GeoLocation) -> RoutingAdvice {
        let ranked = self.nearest_regions(location.coordinates);
        let decision = self.decision(&ranked);
        if decision == RoutingDecision::Suboptimal {
            tracing::debug!(
                serving = %self.serving_region,
                recommended = ?ranked.first().map(|r| &r.region_id),
                "Client served by a non-nearest region"
            );
        }
        RoutingAdvice {
            client_location: location,
            serving_region: self.serving_region.clone(),
            recommended_region: ranked.first().map(|r| r.region_id.clone()),
            decision,
            ranked,
        }
    }
}
