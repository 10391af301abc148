//! Multi-region replication and geo-routing node.

pub mod cache;
pub mod config;
pub mod geo;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod node;
pub mod observability;
pub mod region;
pub mod replication;
pub mod store;

pub use config::schema::NodeConfig;
pub use http::ApiServer;
pub use lifecycle::Shutdown;
pub use node::{Collaborators, RegionNode};
