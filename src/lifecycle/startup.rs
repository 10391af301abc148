//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize subsystems in dependency order
//! - Start background tasks (replication workers, health jobs, metrics)
//! - Bind the listener last and serve until a signal arrives
//! - Tear down in reverse: listener, replication drain, jobs
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listeners start last (traffic only when ready)

use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::NodeConfig;
use crate::http::ApiServer;
use crate::lifecycle::{signals, Shutdown};
use crate::node::{Collaborators, NodeError, RegionNode};
use crate::observability::metrics;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Node(#[from] NodeError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid metrics address '{0}'")]
    MetricsAddress(String),
}

/// Build the node with the default collaborators and start its background jobs.
pub fn bootstrap(config: &NodeConfig) -> Result<Arc<RegionNode>, StartupError> {
    if config.observability.metrics_enabled {
        let addr: SocketAddr = config
            .observability
            .metrics_address
            .parse()
            .map_err(|_| StartupError::MetricsAddress(config.observability.metrics_address.clone()))?;
        metrics::init_metrics(addr);
    }

    let collaborators = Collaborators::in_memory(config)?;
    Ok(Arc::new(RegionNode::start(config, collaborators)?))
}

/// Run a node until Ctrl+C / SIGTERM, then shut down in order.
pub async fn run(config: NodeConfig) -> Result<(), StartupError> {
    let node = bootstrap(&config)?;

    let listener = TcpListener::bind(&config.node.bind_address).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        region = %node.region().id,
        instance = %node.instance_id(),
        "Listening for connections"
    );

    let signal = Shutdown::new();
    tokio::spawn(signals::shutdown_on_signal(signal.clone()));

    let served = ApiServer::new(node.clone(), &config).run(listener, signal).await;
    node.shutdown().await;
    served?;

    tracing::info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bad_metrics_address() {
        let mut config = NodeConfig::default();
        config.observability.metrics_enabled = true;
        config.observability.metrics_address = "not-an-address".into();
        assert!(matches!(bootstrap(&config), Err(StartupError::MetricsAddress(_))));
    }

    #[tokio::test]
    async fn test_bootstrap_default_layout() {
        let mut config = NodeConfig::default();
        config.health.enabled = false;
        let node = bootstrap(&config).unwrap();
        assert_eq!(node.region().id, "us-west");
        assert!(!node.instance_id().is_empty());
        node.shutdown().await;
    }
}
