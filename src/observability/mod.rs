//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms via the `metrics` facade)
//!     → stats.rs (in-process atomic counters, served on /stats)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID flows through every HTTP request
//! - Stats are injected, not global, so tests see only their own counts

pub mod logging;
pub mod metrics;
pub mod stats;

pub use stats::{Stats, StatsSnapshot};
