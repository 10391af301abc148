//! End-to-end replication, routing and health across real loopback nodes.

use axum::http::StatusCode;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use georeplica::config::GeoIpEntryConfig;
use georeplica::health::RegionHealth;
use georeplica::node::Collaborators;
use georeplica::replication::{Operation, ReplicationLogEntry, ReplicationStatus};
use georeplica::store::{KvStore, MemoryKvStore, Record};

mod common;

const INGRESS: &str = "/internal/replicate";

async fn rows_by_target(node: &georeplica::RegionNode) -> Vec<ReplicationLogEntry> {
    let mut rows = node.replication_log().recent(100).await.unwrap();
    rows.sort_by(|a, b| a.target_region.cmp(&b.target_region));
    rows
}

#[tokio::test]
async fn test_write_replicates_to_live_backups() {
    let (east_listener, east_addr) = common::bind_local().await;
    let (europe_listener, europe_addr) = common::bind_local().await;
    let ingress = [("us-east", east_addr), ("europe", europe_addr)];

    let east_config = common::layout("us-east", &ingress);
    let east = common::serve_node(&east_config, Collaborators::in_memory(&east_config).unwrap(), east_listener);
    let europe_config = common::layout("europe", &ingress);
    let europe = common::serve_node(&europe_config, Collaborators::in_memory(&europe_config).unwrap(), europe_listener);

    let west_config = common::layout("us-west", &ingress);
    let west = common::start_node(&west_config, Collaborators::in_memory(&west_config).unwrap());

    let record = Record::new("users", "42", json!({ "name": "ada" }));
    assert_eq!(west.write(record, Operation::Insert).await.unwrap(), 2);
    west.coordinator().drain().await;

    let rows = rows_by_target(&west).await;
    assert_eq!(rows.len(), 2);
    for row in &rows {
        assert_eq!(row.source_region, "us-west");
        assert_eq!(row.status, ReplicationStatus::Success, "{:?}", row);
        assert_eq!(row.record_id, "42");
        assert!(row.error.is_none());
    }

    for backup in [&east, &europe] {
        let copy = backup.node.read("users", "42").await.unwrap().unwrap();
        assert_eq!(copy.data["name"], "ada");
        // Applied writes are never fanned out again.
        assert!(backup.node.replication_log().recent(10).await.unwrap().is_empty());
        assert_eq!(backup.node.stats().snapshot().replication_scheduled, 0);
    }

    west.shutdown().await;
    east.stop().await;
    europe.stop().await;
}

#[tokio::test]
async fn test_partial_replication_is_terminal() {
    let (east_listener, east_addr) = common::bind_local().await;
    let europe_addr = common::start_silent_ingress(INGRESS).await;
    let ingress = [("us-east", east_addr), ("europe", europe_addr)];

    let east_config = common::layout("us-east", &ingress);
    let east = common::serve_node(&east_config, Collaborators::in_memory(&east_config).unwrap(), east_listener);

    let mut west_config = common::layout("us-west", &ingress);
    west_config.replication.timeout_ms = 300;
    let west = common::start_node(&west_config, Collaborators::in_memory(&west_config).unwrap());

    west.write(Record::new("users", "42", json!({})), Operation::Insert)
        .await
        .unwrap();
    west.coordinator().drain().await;

    let rows = rows_by_target(&west).await;
    assert_eq!(rows.len(), 2);

    assert_eq!(rows[0].target_region, "europe");
    assert_eq!(rows[0].status, ReplicationStatus::Failed);
    assert!(rows[0].latency_ms >= 300);
    assert!(rows[0].error.as_deref().unwrap().contains("timed out"));

    assert_eq!(rows[1].target_region, "us-east");
    assert_eq!(rows[1].status, ReplicationStatus::Success);

    // The local write stands regardless.
    assert!(west.read("users", "42").await.unwrap().is_some());

    west.shutdown().await;
    east.stop().await;
}

#[tokio::test]
async fn test_unreachable_and_rejecting_targets() {
    let east_addr = common::closed_addr().await;
    let europe_addr = common::start_programmable_ingress(INGRESS, || async { StatusCode::SERVICE_UNAVAILABLE }).await;
    let ingress = [("us-east", east_addr), ("europe", europe_addr)];

    let west_config = common::layout("us-west", &ingress);
    let west = common::start_node(&west_config, Collaborators::in_memory(&west_config).unwrap());

    west.write(Record::new("orders", "7", json!({ "total": 10 })), Operation::Update)
        .await
        .unwrap();
    west.coordinator().drain().await;

    let rows = rows_by_target(&west).await;
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.status == ReplicationStatus::Failed));
    assert!(rows[0].error.as_deref().unwrap().contains("503"));
    assert!(rows[1].error.as_deref().unwrap().contains("unreachable"));

    let stats = west.stats().snapshot();
    assert_eq!(stats.replication_failed, 2);
    assert_eq!(stats.replication_succeeded, 0);

    west.shutdown().await;
}

#[tokio::test]
async fn test_routing_advice_over_http() {
    let (listener, _) = common::bind_local().await;
    let mut config = common::layout("us-west", &[]);
    config.geoip.push(GeoIpEntryConfig {
        cidr: "81.2.69.0/24".into(),
        country: "FR".into(),
        region: Some("Ile-de-France".into()),
        city: Some("Paris".into()),
        latitude: 48.8566,
        longitude: 2.3522,
        timezone: "Europe/Paris".into(),
    });
    let west = common::serve_node(&config, Collaborators::in_memory(&config).unwrap(), listener);

    let client = reqwest::Client::new();
    let advice: Value = client
        .get(west.url("/routing/advice"))
        .header("x-forwarded-for", "81.2.69.160")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(advice["serving_region"], "us-west");
    assert_eq!(advice["recommended_region"], "europe");
    assert_eq!(advice["decision"], "suboptimal");
    assert_eq!(advice["client_location"]["city"], "Paris");
    assert_eq!(advice["ranked"][0]["region_id"], "europe");

    // Loopback peer without a forwarded address falls back to the serving region.
    let advice: Value = client
        .get(west.url("/routing/advice"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(advice["recommended_region"], "us-west");
    assert_eq!(advice["decision"], "optimal");

    west.stop().await;
}

#[tokio::test]
async fn test_heartbeats_visible_across_regions() {
    let shared = MemoryKvStore::new();

    let mut europe_config = common::layout("europe", &[]);
    europe_config.health.enabled = true;
    europe_config.health.heartbeat_interval_secs = 1;
    europe_config.health.heartbeat_ttl_secs = 3;
    let mut europe_collab = Collaborators::in_memory(&europe_config).unwrap();
    europe_collab.kv = Arc::new(shared.clone());
    let europe = common::start_node(&europe_config, europe_collab);

    let west_config = common::layout("us-west", &[]);
    let mut west_collab = Collaborators::in_memory(&west_config).unwrap();
    west_collab.kv = Arc::new(shared.clone());
    let west = common::start_node(&west_config, west_collab);

    let mut health = RegionHealth::Unknown;
    for _ in 0..50 {
        health = west.health().region_health("europe").await.unwrap();
        if health.is_reachable() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    match health {
        RegionHealth::Healthy { instances, latest } => {
            assert_eq!(instances, 1);
            assert_eq!(latest.instance_id, "europe-test");
        }
        other => panic!("europe not healthy: {:?}", other),
    }

    // us-west publishes nothing with health disabled.
    assert_eq!(west.health().region_health("us-west").await.unwrap(), RegionHealth::Unknown);
    assert!(shared.scan_prefix("health:europe:").await.unwrap().len() == 1);

    europe.shutdown().await;
    west.shutdown().await;
}

#[tokio::test]
async fn test_status_endpoint_over_http() {
    let (listener, _) = common::bind_local().await;
    let config = common::layout("europe", &[]);
    let europe = common::serve_node(&config, Collaborators::in_memory(&config).unwrap(), listener);

    let response = reqwest::get(europe.url("/status")).await.unwrap();
    assert!(response.status().is_success());
    assert!(response.headers().contains_key("x-request-id"));
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["region_id"], "europe");
    assert_eq!(body["instance_id"], "europe-test");
    assert_eq!(body["backup_regions"], json!(["us-east"]));

    europe.stop().await;
}
