//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with all handlers
//! - Wire up middleware (request ID, tracing, timeout)
//! - Serve on a bound listener until shutdown

use axum::{
    body::Body,
    http::Request,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::NodeConfig;
use crate::http::handlers;
use crate::http::request::{request_id_header, RequestIdExt};
use crate::lifecycle::Shutdown;
use crate::node::RegionNode;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub node: Arc<RegionNode>,
}

/// HTTP surface of one region node.
pub struct ApiServer {
    router: Router,
}

impl ApiServer {
    pub fn new(node: Arc<RegionNode>, config: &NodeConfig) -> Self {
        let state = AppState { node };
        let timeout = Duration::from_secs(config.node.request_timeout_secs);
        Self {
            router: Self::build_router(state, timeout, &config.replication.ingress_path),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(state: AppState, timeout: Duration, ingress_path: &str) -> Router {
        let x_request_id = request_id_header();

        Router::new()
            .route(ingress_path, post(handlers::ingest_replication))
            .route("/status", get(handlers::get_status))
            .route("/regions", get(handlers::get_regions))
            .route("/regions/nearest", get(handlers::get_nearest_regions))
            .route("/routing/advice", get(handlers::get_routing_advice))
            .route("/health/regions", get(handlers::get_region_health))
            .route("/replication/lag", get(handlers::get_replication_lag))
            .route("/stats", get(handlers::get_stats))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                    .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                        tracing::info_span!(
                            "http",
                            method = %request.method(),
                            path = %request.uri().path(),
                            request_id = %request.headers().request_id(),
                        )
                    }))
                    .layer(PropagateRequestIdLayer::new(x_request_id))
                    .layer(TimeoutLayer::new(timeout)),
            )
    }

    /// The configured router, for in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve until `shutdown` fires, then finish in-flight requests.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.triggered().await })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::StaticGeoIp;
    use crate::node::Collaborators;
    use crate::replication::{MemoryReplicationLog, Operation, ReplicationEnvelope};
    use crate::store::{MemoryKvStore, MemoryRecordStore, Record, SystemClock};
    use axum::extract::connect_info::MockConnectInfo;
    use axum::http::{header, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn node(region: &str) -> Arc<RegionNode> {
        let mut config = NodeConfig::default();
        config.node.region_id = region.to_string();
        config.health.enabled = false;
        let collaborators = Collaborators {
            kv: Arc::new(MemoryKvStore::new()),
            records: Arc::new(MemoryRecordStore::new()),
            log: Arc::new(MemoryReplicationLog::new()),
            ingress: Arc::new(crate::replication::HttpIngressClient::new("/internal/replicate")),
            geoip: Arc::new(StaticGeoIp::new(Vec::new())),
            clock: Arc::new(SystemClock),
        };
        Arc::new(RegionNode::start(&config, collaborators).unwrap())
    }

    fn app(node: Arc<RegionNode>) -> Router {
        ApiServer::new(node, &NodeConfig::default())
            .router()
            .layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))))
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_status_and_request_id() {
        let node = node("us-west");
        let response = app(node.clone())
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));

        let (_, body) = get_json(app(node.clone()), "/status").await;
        assert_eq!(body["region_id"], "us-west");
        assert_eq!(body["is_primary"], true);
        node.shutdown().await;
    }

    #[tokio::test]
    async fn test_request_id_propagated() {
        let node = node("us-west");
        let response = app(node.clone())
            .oneshot(
                Request::builder()
                    .uri("/regions")
                    .header("x-request-id", "req-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()["x-request-id"], "req-123");
        node.shutdown().await;
    }

    #[tokio::test]
    async fn test_regions_sorted() {
        let node = node("us-west");
        let (status, body) = get_json(app(node.clone()), "/regions").await;
        assert_eq!(status, StatusCode::OK);
        let ids: Vec<_> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["europe", "us-east", "us-west"]);
        node.shutdown().await;
    }

    #[tokio::test]
    async fn test_nearest_regions() {
        let node = node("us-west");
        let (status, body) = get_json(app(node.clone()), "/regions/nearest?lat=48.8566&lon=2.3522").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["region_id"], "europe");

        let (status, _) = get_json(app(node.clone()), "/regions/nearest?lat=95&lon=0").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = get_json(app(node.clone()), "/regions/nearest?lat=abc").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        node.shutdown().await;
    }

    #[tokio::test]
    async fn test_routing_advice_loopback_falls_back() {
        let node = node("us-east");
        let (status, body) = get_json(app(node.clone()), "/routing/advice").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["serving_region"], "us-east");
        assert_eq!(body["recommended_region"], "us-east");
        assert_eq!(body["decision"], "optimal");
        assert_eq!(body["client_location"]["source"], "serving_region_fallback");
        node.shutdown().await;
    }

    #[tokio::test]
    async fn test_ingest_replication() {
        let node = node("europe");
        let envelope = ReplicationEnvelope {
            source_region: "us-west".into(),
            operation: Operation::Insert,
            record: Record::new("users", "42", json!({ "name": "ada" })),
            sent_at: chrono::Utc::now(),
        };

        let response = app(node.clone())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/internal/replicate")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(serde_json::to_vec(&envelope).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(node.read("users", "42").await.unwrap().is_some());
        assert_eq!(node.coordinator().pending(), 0);
        node.shutdown().await;
    }

    #[tokio::test]
    async fn test_ingest_rejects_unknown_source() {
        let node = node("europe");
        let mut envelope = json!({
            "source_region": "mars",
            "operation": "insert",
            "record": { "table": "users", "id": "1", "data": {} },
            "sent_at": "2024-01-01T00:00:00Z"
        });
        let response = app(node.clone())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/internal/replicate")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(envelope.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        envelope["operation"] = json!("truncate");
        let response = app(node.clone())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/internal/replicate")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(envelope.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(response.status().is_client_error());
        node.shutdown().await;
    }

    #[tokio::test]
    async fn test_health_lag_and_stats() {
        let node = node("us-west");

        let (status, body) = get_json(app(node.clone()), "/health/regions").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 3);
        assert_eq!(body[0]["health"]["state"], "unknown");

        let (status, body) = get_json(app(node.clone()), "/replication/lag?recent=5").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["samples"].as_array().unwrap().is_empty());
        assert!(body["recent"].as_array().unwrap().is_empty());

        let (status, body) = get_json(app(node.clone()), "/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["replication_scheduled"], 0);
        assert_eq!(body["cache_hit_ratio"], 0.0);
        node.shutdown().await;
    }
}
