//! Geo-aware routing advice.
//!
//! # Data Flow
//! ```text
//! Client address (socket peer / X-Forwarded-For)
//!     → locator.rs (Geo-IP lookup, fallback to serving region)
//!     → GeoLocation
//!     → nearest.rs (rank regions by distance)
//!     → RoutingAdvice (ranked list + optimal/suboptimal)
//! ```
//!
//! # Design Decisions
//! - Advisory only: nothing here redirects traffic
//! - Independent of the read/write path

pub mod locator;
pub mod nearest;

pub use locator::{client_addr, GeoIpLookup, GeoIpRecord, GeoLocation, GeoLocator, LocationSource, StaticGeoIp};
pub use nearest::{NearestResolver, RankedRegion, RoutingAdvice, RoutingDecision};
