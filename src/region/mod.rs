//! Region metadata.
//!
//! The registry is built once from configuration at startup and shared via
//! `Arc` to the geo, replication and health subsystems. It is never mutated.

pub mod registry;

pub use registry::{Coordinates, Region, RegionRegistry, RegistryError};
