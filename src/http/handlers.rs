//! Route handlers.
//!
//! Everything except `/internal/replicate` is read-only.

use axum::{
    extract::{ConnectInfo, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::geo::{RankedRegion, RoutingAdvice};
use crate::health::{LagSample, RegionHealthReport};
use crate::http::request::{client_address, RequestIdExt, X_SOURCE_REGION};
use crate::http::server::AppState;
use crate::node::{NodeStatus, WriteError};
use crate::observability::StatsSnapshot;
use crate::region::{Coordinates, Region};
use crate::replication::{ReplicationEnvelope, ReplicationLog, ReplicationLogEntry};
use crate::store::StoreError;

const DEFAULT_RECENT_ROWS: usize = 20;
const MAX_RECENT_ROWS: usize = 500;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unavailable(String),
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(ErrorBody { error })).into_response()
    }
}

impl From<WriteError> for ApiError {
    fn from(e: WriteError) -> Self {
        match e {
            WriteError::UnknownSource(_) => ApiError::BadRequest(e.to_string()),
            WriteError::Store(_) | WriteError::CacheInvalidation(_) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Unavailable(e.to_string())
    }
}

/// Apply a write pushed by another region's replication worker.
pub async fn ingest_replication(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(envelope): Json<ReplicationEnvelope>,
) -> Result<StatusCode, ApiError> {
    tracing::debug!(
        request_id = %headers.request_id(),
        source = %envelope.source_region,
        header_source = ?headers.get(X_SOURCE_REGION),
        record_id = %envelope.record.id,
        "Replication ingress"
    );

    if let Err(e) = state.node.apply_replicated(envelope).await {
        tracing::warn!(request_id = %headers.request_id(), error = %e, "Replicated write rejected");
        return Err(e.into());
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_status(State(state): State<AppState>) -> Json<NodeStatus> {
    Json(state.node.status())
}

pub async fn get_regions(State(state): State<AppState>) -> Json<Vec<Region>> {
    Json(state.node.registry().list().into_iter().cloned().collect())
}

#[derive(Debug, Deserialize)]
pub struct NearestQuery {
    pub lat: f64,
    pub lon: f64,
}

pub async fn get_nearest_regions(
    State(state): State<AppState>,
    Query(query): Query<NearestQuery>,
) -> Result<Json<Vec<RankedRegion>>, ApiError> {
    if !(-90.0..=90.0).contains(&query.lat) || !(-180.0..=180.0).contains(&query.lon) {
        return Err(ApiError::BadRequest(format!(
            "coordinates out of range: lat={}, lon={}",
            query.lat, query.lon
        )));
    }
    Ok(Json(state.node.nearest_regions(Coordinates::new(query.lat, query.lon))))
}

pub async fn get_routing_advice(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Json<RoutingAdvice> {
    let client = client_address(&headers, peer.ip());
    let advice = state.node.routing_advice(client).await;
    tracing::debug!(
        request_id = %headers.request_id(),
        client = %client,
        recommended = ?advice.recommended_region,
        decision = ?advice.decision,
        "Routing advice"
    );
    Json(advice)
}

pub async fn get_region_health(State(state): State<AppState>) -> Result<Json<Vec<RegionHealthReport>>, ApiError> {
    Ok(Json(state.node.health().all_regions().await?))
}

#[derive(Debug, Deserialize)]
pub struct LagQuery {
    pub recent: Option<usize>,
}

#[derive(Serialize)]
pub struct LagReport {
    pub samples: Vec<LagSample>,
    pub recent: Vec<ReplicationLogEntry>,
}

pub async fn get_replication_lag(
    State(state): State<AppState>,
    Query(query): Query<LagQuery>,
) -> Result<Json<LagReport>, ApiError> {
    let limit = query.recent.unwrap_or(DEFAULT_RECENT_ROWS).min(MAX_RECENT_ROWS);
    let recent = state.node.replication_log().recent(limit).await?;
    Ok(Json(LagReport {
        samples: state.node.health().lag_samples(),
        recent,
    }))
}

#[derive(Serialize)]
pub struct StatsReport {
    #[serde(flatten)]
    pub counters: StatsSnapshot,
    pub cache_hit_ratio: f64,
    pub queue_depth: usize,
    pub pending_replications: usize,
}

pub async fn get_stats(State(state): State<AppState>) -> Json<StatsReport> {
    let counters = state.node.stats().snapshot();
    Json(StatsReport {
        cache_hit_ratio: counters.cache_hit_ratio(),
        counters,
        queue_depth: state.node.coordinator().queue_depth(),
        pending_replications: state.node.coordinator().pending(),
    })
}
