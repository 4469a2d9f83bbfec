//! Pipeline results survive a restart of the SQLite backend

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use fleet_inspector::inspection::build_scheduler;
use fleet_inspector::model::{AlertStatus, NodeStatus, Severity};
use fleet_inspector::storage::sqlite::SqliteBackend;
use fleet_inspector::storage::{StorageBackend, seed_inventory};
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;
use wiremock::MockServer;

use crate::helpers::{config_for, mount_node, report, seed};

#[tokio::test]
async fn test_cycle_results_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("inspector.db");

    let server = MockServer::start().await;
    mount_node(&server, "db-01", report("db-01", "CRITICAL", "disk full")).await;
    mount_node(&server, "web-01", report("web-01", "OK", "fine")).await;

    let config = config_for(&server.uri(), &["db-01", "web-01"], json!({}), json!({}));

    let alert_id = {
        let storage = Arc::new(SqliteBackend::new(&db_path).await.unwrap());
        seed(storage.as_ref(), &config).await;

        let summary = build_scheduler(&config, storage.clone())
            .unwrap()
            .run_once()
            .await
            .unwrap();
        assert_eq!(summary.succeeded, 2);

        let alerts = storage.list_alerts(10, 0).await.unwrap();
        assert_eq!(alerts.len(), 1);
        storage.close().await.unwrap();
        alerts[0].id.unwrap()
    };

    let storage = SqliteBackend::new(&db_path).await.unwrap();

    let nodes = storage.list_nodes().await.unwrap();
    assert_eq!(nodes.len(), 2);
    assert!(nodes.iter().all(|n| n.status == NodeStatus::Online));

    let latest = storage.latest_inspections().await.unwrap();
    assert_eq!(latest.len(), 2);
    let critical = latest
        .iter()
        .find(|i| i.level == Severity::Critical)
        .unwrap();
    assert_eq!(critical.hostname, "db-01");
    assert_eq!(critical.metrics.cpu_used, 23.5);
    assert_eq!(critical.raw_data["cpu_load"], "0.42");

    let alert = &storage.list_alerts(10, 0).await.unwrap()[0];
    assert_eq!(alert.id, Some(alert_id));
    assert_eq!(alert.inspection_id, critical.id);
    assert_eq!(alert.summary, "disk full");

    storage
        .update_alert_status(alert_id, AlertStatus::Resolved)
        .await
        .unwrap();
    let stats = storage.alert_stats().await.unwrap();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.critical, 1);

    storage.close().await.unwrap();
}

#[tokio::test]
async fn test_reseeding_keeps_node_ids_stable() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("inspector.db");
    let config = config_for("http://127.0.0.1:1", &["a", "b", "c"], json!({}), json!({}));

    let first = {
        let storage = SqliteBackend::new(&db_path).await.unwrap();
        let nodes = seed(&storage, &config).await;
        storage.close().await.unwrap();
        nodes
    };

    let storage = SqliteBackend::new(&db_path).await.unwrap();
    let seeded = seed_inventory(&storage, config.node_specs()).await.unwrap();
    assert_eq!(seeded, 3);

    let second = storage.list_nodes().await.unwrap();
    assert_eq!(
        first.iter().map(|n| (n.id, n.name.clone())).collect::<Vec<_>>(),
        second.iter().map(|n| (n.id, n.name.clone())).collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn test_cleanup_keeps_alert_history() {
    let dir = TempDir::new().unwrap();
    let storage = Arc::new(SqliteBackend::new(dir.path().join("inspector.db")).await.unwrap());

    let server = MockServer::start().await;
    mount_node(&server, "db-01", report("db-01", "CRITICAL", "disk full")).await;
    let config = config_for(&server.uri(), &["db-01"], json!({}), json!({}));
    seed(storage.as_ref(), &config).await;

    build_scheduler(&config, storage.clone())
        .unwrap()
        .run_once()
        .await
        .unwrap();

    let removed = storage
        .cleanup_old_inspections(Utc::now() + ChronoDuration::minutes(1))
        .await
        .unwrap();
    assert_eq!(removed, 1);
    assert!(storage.latest_inspections().await.unwrap().is_empty());

    let alerts = storage.list_alerts(10, 0).await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].inspection_id, None);
}
