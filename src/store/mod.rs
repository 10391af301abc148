//! Storage collaborators.
//!
//! # Data Flow
//! ```text
//! Shared key-value store (kv.rs):
//!     health.rs  → health:{region}:{instance}   (TTL, last-write-wins)
//!     health.rs  → lag:{source}:{target}        (TTL)
//!     cache      → cache:{key}                  (global tier, TTL)
//!
//! Relational datastore (records.rs):
//!     node.rs write path → upsert/delete by primary key
//!     replication ingress → same
//!
//! Clock (clock.rs):
//!     TTL expiry, heartbeat timestamps, lag windows
//! ```
//!
//! # Design Decisions
//! - Every collaborator is an async trait object so deployments can swap in
//!   a networked store without touching the subsystems
//! - In-memory implementations are the single-process default and the test doubles
//! - Expired entries are invisible to readers; eviction is lazy

pub mod clock;
pub mod kv;
pub mod records;

pub use clock::{Clock, ManualClock, SystemClock};
pub use kv::{KvStore, MemoryKvStore};
pub use records::{MemoryRecordStore, Record, RecordStore};

use thiserror::Error;

/// Failure reported by a storage collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
