//! End-to-end cycles against mock node agents

use std::sync::Arc;

use fleet_inspector::inspection::{AlertEngine, build_scheduler, build_scheduler_with_probe};
use fleet_inspector::inspection::{Aggregator, Dispatcher, HttpProber, Scheduler};
use fleet_inspector::model::{AlertStatus, NodeStatus, Severity};
use fleet_inspector::storage::StorageBackend;
use fleet_inspector::storage::memory::MemoryBackend;
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::{
    RecordingNotifier, config_for, mount_garbage_node, mount_node, report, seed,
};

#[tokio::test]
async fn test_malformed_node_counts_as_success() {
    let server = MockServer::start().await;
    let names = ["node-1", "node-2", "node-3", "node-4", "node-5"];

    for name in names {
        if name == "node-3" {
            mount_garbage_node(&server, name).await;
        } else {
            mount_node(&server, name, report(name, "OK", "healthy")).await;
        }
    }

    let config = config_for(
        &server.uri(),
        &names,
        json!({ "max_concurrent": 2, "retry_times": 1 }),
        json!({}),
    );
    let storage = Arc::new(MemoryBackend::new());
    let nodes = seed(storage.as_ref(), &config).await;
    let scheduler = build_scheduler(&config, storage.clone()).unwrap();

    let summary = scheduler.run_once().await.unwrap();

    assert_eq!(summary.total, 5);
    assert_eq!(summary.succeeded, 5);
    assert_eq!(summary.failed, 0);

    let latest = storage.latest_inspections().await.unwrap();
    assert_eq!(latest.len(), 5);

    let critical: Vec<_> = latest
        .iter()
        .filter(|i| i.level == Severity::Critical)
        .collect();
    assert_eq!(critical.len(), 1);
    assert_eq!(critical[0].node_id, nodes[2].id);
    assert_eq!(critical[0].hostname, "node-3");
    assert_eq!(critical[0].analysis["summary"], "bad response format");

    let healthy = latest.iter().find(|i| i.node_id == nodes[0].id).unwrap();
    assert_eq!(healthy.metrics.cpu_used, 23.5);
    assert_eq!(healthy.metrics.memory_used, 61.0);
    assert_eq!(healthy.metrics.load_avg, 0.42);

    for node in storage.list_nodes().await.unwrap() {
        assert_eq!(node.status, NodeStatus::Online);
        assert!(node.last_check_at.is_some());
    }

    // the synthetic CRITICAL verdict raises an alert like any other
    let alerts = storage.list_alerts(10, 0).await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].node_id, nodes[2].id);
}

#[tokio::test]
async fn test_disk_full_raises_one_notified_alert() {
    let server = MockServer::start().await;

    mount_node(
        &server,
        "db-01",
        json!({
            "hostname": "db-01.internal",
            "raw_data": { "disk_used": "99%" },
            "analysis": {
                "alert": true,
                "level": "CRITICAL",
                "summary": "disk full",
                "details": ["/var/lib/postgresql at 99%"],
                "plan": "expand volume"
            }
        }),
    )
    .await;

    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(body_partial_json(json!({ "subject": "[Fleet Inspector] CRITICAL - db-01" })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(
        &server.uri(),
        &["db-01"],
        json!({ "retry_times": 1 }),
        json!({
            "notify": {
                "channel": { "type": "webhook", "url": format!("{}/hook", server.uri()) }
            }
        }),
    );
    let storage = Arc::new(MemoryBackend::new());
    seed(storage.as_ref(), &config).await;
    let scheduler = build_scheduler(&config, storage.clone()).unwrap();

    scheduler.run_once().await.unwrap();

    let alerts = storage.list_alerts(10, 0).await.unwrap();
    assert_eq!(alerts.len(), 1);

    let alert = &alerts[0];
    assert!(alert.title.contains("db-01"));
    assert!(alert.title.contains("CRITICAL"));
    assert_eq!(alert.summary, "disk full");
    assert_eq!(alert.solution, "expand volume");
    assert_eq!(alert.details, "/var/lib/postgresql at 99%");
    assert_eq!(alert.status, AlertStatus::Pending);
    assert!(alert.notified);
    assert!(alert.inspection_id.is_some());

    // second cycle inside the cooldown window stays quiet
    scheduler.run_once().await.unwrap();
    assert_eq!(storage.list_alerts(10, 0).await.unwrap().len(), 1);
    assert_eq!(
        storage
            .inspections_for_node(alert.node_id, 10)
            .await
            .unwrap()
            .len(),
        2
    );
}

#[tokio::test]
async fn test_unreachable_node_is_retried_then_marked_offline() {
    let server = MockServer::start().await;
    mount_node(&server, "web-01", report("web-01", "OK", "fine")).await;

    let mut config = config_for(
        &server.uri(),
        &["web-01"],
        json!({ "retry_times": 2, "backoff_secs": 1, "timeout_secs": 2 }),
        json!({}),
    );
    // nothing listens on the discard port
    config.nodes.push(
        serde_json::from_value(json!({
            "name": "web-02",
            "ip": "127.0.0.1",
            "url": "http://127.0.0.1:9",
        }))
        .unwrap(),
    );

    let storage = Arc::new(MemoryBackend::new());
    let nodes = seed(storage.as_ref(), &config).await;
    let scheduler = build_scheduler(&config, storage.clone()).unwrap();

    let started = std::time::Instant::now();
    let summary = scheduler.run_once().await.unwrap();

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 1);
    // one backoff sleep between the two attempts
    assert!(started.elapsed() >= std::time::Duration::from_secs(1));

    let offline = storage.get_node(nodes[1].id).await.unwrap().unwrap();
    assert_eq!(offline.status, NodeStatus::Offline);
    assert!(storage
        .inspections_for_node(nodes[1].id, 10)
        .await
        .unwrap()
        .is_empty());
    assert!(storage.list_alerts(10, 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_token_header_sent_to_nodes() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/secure/inspect"))
        .and(wiremock::matchers::header("X-INSPECTOR-TOKEN", "s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(report("secure", "OK", "ok")))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = config_for(&server.uri(), &["secure"], json!({}), json!({}));
    config.nodes[0].token = Some("s3cret".to_string());

    let storage = Arc::new(MemoryBackend::new());
    seed(storage.as_ref(), &config).await;

    let summary = build_scheduler(&config, storage)
        .unwrap()
        .run_once()
        .await
        .unwrap();
    assert_eq!(summary.succeeded, 1);
}

#[tokio::test]
async fn test_disabled_nodes_are_skipped() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/parked/inspect"))
        .respond_with(ResponseTemplate::new(200).set_body_json(report("parked", "OK", "ok")))
        .expect(0)
        .mount(&server)
        .await;
    mount_node(&server, "active", report("active", "OK", "ok")).await;

    let mut config = config_for(&server.uri(), &["parked", "active"], json!({}), json!({}));
    config.nodes[0].enabled = false;

    let storage = Arc::new(MemoryBackend::new());
    seed(storage.as_ref(), &config).await;

    let summary = build_scheduler(&config, storage)
        .unwrap()
        .run_once()
        .await
        .unwrap();
    assert_eq!(summary.total, 1);
}

#[tokio::test]
async fn test_custom_notifier_receives_rendered_body() {
    let server = MockServer::start().await;
    mount_node(&server, "cache-01", report("cache-01", "CRITICAL", "memory exhausted")).await;

    let config = config_for(&server.uri(), &["cache-01"], json!({}), json!({}));
    let storage: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    seed(storage.as_ref(), &config).await;

    let notifier = Arc::new(RecordingNotifier::default());
    let engine = AlertEngine::new(storage.clone(), &config.alert)
        .with_notifier(notifier.clone(), "[ops]");
    let probe = Arc::new(HttpProber::new(config.check.timeout()).unwrap());
    let scheduler = Scheduler::new(
        storage.clone(),
        Dispatcher::from_config(probe, &config.check),
        Aggregator::new(storage.clone(), Arc::new(engine)),
        config.check.interval(),
    );

    scheduler.run_once().await.unwrap();

    let sent = notifier.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "[ops] CRITICAL - cache-01");
    assert!(sent[0].1.contains("Summary:   memory exhausted"));
    assert!(sent[0].1.contains("Solution:  Inspect the node manually"));
}

#[tokio::test]
async fn test_notifications_disabled_by_switch() {
    let server = MockServer::start().await;
    mount_node(&server, "db-02", report("db-02", "CRITICAL", "replication broken")).await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let config = config_for(
        &server.uri(),
        &["db-02"],
        json!({}),
        json!({
            "notify": {
                "enabled": false,
                "channel": { "type": "webhook", "url": format!("{}/hook", server.uri()) }
            }
        }),
    );
    let storage = Arc::new(MemoryBackend::new());
    seed(storage.as_ref(), &config).await;

    let probe = Arc::new(HttpProber::new(config.check.timeout()).unwrap());
    build_scheduler_with_probe(&config, storage.clone(), probe)
        .unwrap()
        .run_once()
        .await
        .unwrap();

    let alerts = storage.list_alerts(10, 0).await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert!(!alerts[0].notified);
}
