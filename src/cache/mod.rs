//! Two-tier cache subsystem.
//!
//! # Data Flow
//! ```text
//! get(key)
//!     → local tier (per-instance memory)
//!     → global tier (shared store, `cache:` namespace), promote on hit
//!     → Miss (caller falls through to the record store)
//!
//! write committed
//!     → invalidate(pattern) on both tiers
//!     → only then report success
//! ```

pub mod manager;
pub mod pattern;

pub use manager::{CacheLookup, CacheManager, CacheTier};
pub use pattern::KeyPattern;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("invalid cache key pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error(transparent)]
    Store(#[from] crate::store::StoreError),
}
