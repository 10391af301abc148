//! Cross-region replication subsystem.
//!
//! # Data Flow
//! ```text
//! Local write committed
//!     → coordinator.rs replicate() (returns immediately)
//!     → one ReplicationTask per backup region → bounded queue
//!     → worker pool: ingress.rs push() under a per-task timeout
//!     → log.rs append (success | failed, latency)
//!
//! Receiving side:
//!     POST /internal/replicate → node apply path (commit + invalidate, no fan-out)
//! ```
//!
//! # Design Decisions
//! - Local write availability over cross-region consistency
//! - Log rows are append-only and are the only record of an attempt
//! - Health of a target is never probed here; failures are just logged

pub mod coordinator;
pub mod ingress;
pub mod log;
pub mod types;

pub use coordinator::{ReplicationCoordinator, ReplicationTask};
pub use ingress::{HttpIngressClient, IngressClient};
pub use log::{MemoryReplicationLog, ReplicationLog};
pub use types::{
    Operation, ReplicationEnvelope, ReplicationLogEntry, ReplicationStatus, TaskState,
};

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplicationError {
    #[error("replication timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("target unreachable: {0}")]
    TargetUnreachable(String),

    #[error("target rejected replication with status {0}")]
    Rejected(u16),

    #[error("unknown source region '{0}'")]
    UnknownRegion(String),

    #[error("replication queue full")]
    QueueFull,

    #[error("replication queue closed")]
    QueueClosed,
}
