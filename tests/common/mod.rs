//! Shared utilities for integration testing.

#![allow(dead_code)]

use axum::{http::StatusCode, routing::post, Router};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use georeplica::config::NodeConfig;
use georeplica::node::{Collaborators, RegionNode};
use georeplica::{ApiServer, Shutdown};

/// Bind an ephemeral loopback port.
pub async fn bind_local() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// An address nothing listens on.
pub async fn closed_addr() -> SocketAddr {
    let (listener, addr) = bind_local().await;
    drop(listener);
    addr
}

/// Default three-region layout with ingress URLs pointed at the given addresses.
pub fn layout(region_id: &str, ingress: &[(&str, SocketAddr)]) -> NodeConfig {
    let mut config = NodeConfig::default();
    config.node.region_id = region_id.to_string();
    config.node.instance_id = format!("{}-test", region_id);
    config.health.enabled = false;
    config.replication.timeout_ms = 2_000;
    for region in &mut config.regions {
        if let Some((_, addr)) = ingress.iter().find(|(id, _)| *id == region.id) {
            region.ingress_url = format!("http://{}", addr);
        }
    }
    config
}

/// A node serving its HTTP surface on a loopback port.
pub struct TestNode {
    pub node: Arc<RegionNode>,
    pub addr: SocketAddr,
    shutdown: Shutdown,
    server: JoinHandle<()>,
}

impl TestNode {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        let _ = self.server.await;
        self.node.shutdown().await;
    }
}

pub fn start_node(config: &NodeConfig, collaborators: Collaborators) -> Arc<RegionNode> {
    Arc::new(RegionNode::start(config, collaborators).unwrap())
}

/// Start a node and serve it on an already-bound listener.
pub fn serve_node(config: &NodeConfig, collaborators: Collaborators, listener: TcpListener) -> TestNode {
    let addr = listener.local_addr().unwrap();
    let node = start_node(config, collaborators);
    let shutdown = Shutdown::new();
    let server = ApiServer::new(node.clone(), config);
    let signal = shutdown.clone();
    let server = tokio::spawn(async move {
        server.run(listener, signal).await.unwrap();
    });
    TestNode {
        node,
        addr,
        shutdown,
        server,
    }
}

/// Start a programmable ingress that answers every push with `f()`.
pub async fn start_programmable_ingress<F, Fut>(path: &'static str, f: F) -> SocketAddr
where
    F: Fn() -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = StatusCode> + Send + 'static,
{
    let (listener, addr) = bind_local().await;
    let app = Router::new().route(path, post(move || f()));
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

/// An ingress that accepts the request and never answers.
pub async fn start_silent_ingress(path: &'static str) -> SocketAddr {
    start_programmable_ingress(path, || std::future::pending::<StatusCode>()).await
}
