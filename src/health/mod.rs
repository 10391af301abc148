//! Cross-region health subsystem.
//!
//! # Data Flow
//! ```text
//! Heartbeat publisher (heartbeat.rs), short interval:
//!     queue depth sample
//!     → HealthRecord → shared store health:{region}:{instance} (TTL)
//!
//! Lag aggregator (lag.rs), heartbeat interval × multiplier:
//!     replication log rows in trailing window
//!     → LagSample per (source, target)
//!     → gauge + shared store lag:{source}:{target} (TTL = 2 intervals)
//!
//! Queries (monitor.rs):
//!     scan health:{region}: → Healthy | Degraded | Unknown
//! ```
//!
//! # Design Decisions
//! - No health RPC between regions; an expired record means unreachable
//! - Both jobs are plain tokio tasks stopped by the node's shutdown broadcast
//! - Each job exposes a single-step method so tests drive it with a manual clock

pub mod heartbeat;
pub mod lag;
pub mod monitor;
pub mod record;

pub use heartbeat::{HeartbeatPublisher, LoadProbe};
pub use lag::{LagAggregator, LagSample};
pub use monitor::{HealthMonitor, RegionHealthReport};
pub use record::{HealthRecord, HealthStatus, RegionHealth};
