//! HTTP surface of a region node.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing, timeout)
//!     → handlers.rs
//!         POST /internal/replicate → node apply path
//!         GET  status / regions / routing / health / lag / stats → read-only views
//! ```

pub mod handlers;
pub mod request;
pub mod server;

pub use request::{RequestIdExt, X_REQUEST_ID};
pub use server::{ApiServer, AppState};
