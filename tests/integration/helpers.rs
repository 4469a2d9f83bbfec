//! Helper functions for integration tests

#![allow(dead_code)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fleet_inspector::config::{Config, parse_config};
use fleet_inspector::model::{
    Alert, AlertStats, AlertStatus, Inspection, Node, NodeSpec, NodeStatus,
};
use fleet_inspector::notify::Notifier;
use fleet_inspector::storage::memory::MemoryBackend;
use fleet_inspector::storage::{HealthStatus, StorageBackend, StorageError, StorageResult};
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Envelope a node agent would serve
pub fn report(hostname: &str, level: &str, summary: &str) -> Value {
    json!({
        "hostname": hostname,
        "raw_data": {
            "cpu_used": "23.5%",
            "mem_used": "61.0%",
            "cpu_load": "0.42",
            "ping_loss": "0%"
        },
        "analysis": {
            "alert": level == "CRITICAL",
            "level": level,
            "summary": summary,
            "details": [],
            "plan": ""
        }
    })
}

/// Serve `body` on `/{name}/inspect`
pub async fn mount_node(server: &MockServer, name: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path(format!("/{name}/inspect")))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Serve a non-JSON body on `/{name}/inspect`
pub async fn mount_garbage_node(server: &MockServer, name: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/{name}/inspect")))
        .respond_with(ResponseTemplate::new(200).set_body_string("{ this is not json"))
        .mount(server)
        .await;
}

/// Configuration with one inventory entry per name, all served by `server`
pub fn config_for(server_uri: &str, names: &[&str], check: Value, extra: Value) -> Config {
    let nodes: Vec<Value> = names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            json!({
                "name": name,
                "ip": format!("10.20.0.{}", i + 1),
                "url": format!("{server_uri}/{name}"),
            })
        })
        .collect();

    let mut body = json!({
        "check": check,
        "storage": { "backend": "none" },
        "nodes": nodes,
    });
    if let (Some(target), Value::Object(extra)) = (body.as_object_mut(), extra) {
        target.extend(extra);
    }

    parse_config(&body.to_string()).expect("test config is valid")
}

pub async fn seed(storage: &dyn StorageBackend, config: &Config) -> Vec<Node> {
    fleet_inspector::storage::seed_inventory(storage, config.node_specs())
        .await
        .unwrap();
    storage.list_nodes().await.unwrap()
}

pub fn spec(name: &str, url: &str) -> NodeSpec {
    NodeSpec {
        name: name.to_string(),
        ip: "10.30.0.1".to_string(),
        url: url.to_string(),
        enabled: true,
        check_interval_secs: 300,
        token: None,
    }
}

/// Notifier that records every message
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, subject: &str, body: &str) -> anyhow::Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((subject.to_string(), body.to_string()));
        Ok(())
    }
}

/// In-memory storage with switchable faults
#[derive(Default)]
pub struct FaultyStorage {
    pub inner: MemoryBackend,
    pub fail_inventory: AtomicBool,
    pub fail_inspections: AtomicBool,
}

impl FaultyStorage {
    pub fn set_fail_inventory(&self, fail: bool) {
        self.fail_inventory.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_inspections(&self, fail: bool) {
        self.fail_inspections.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl StorageBackend for FaultyStorage {
    async fn upsert_node(&self, spec: NodeSpec) -> StorageResult<Node> {
        self.inner.upsert_node(spec).await
    }

    async fn list_nodes(&self) -> StorageResult<Vec<Node>> {
        self.inner.list_nodes().await
    }

    async fn list_enabled_nodes(&self) -> StorageResult<Vec<Node>> {
        if self.fail_inventory.load(Ordering::SeqCst) {
            return Err(StorageError::ConnectionFailed("inventory offline".to_string()));
        }
        self.inner.list_enabled_nodes().await
    }

    async fn get_node(&self, id: i64) -> StorageResult<Option<Node>> {
        self.inner.get_node(id).await
    }

    async fn update_node_status(&self, id: i64, status: NodeStatus) -> StorageResult<()> {
        self.inner.update_node_status(id, status).await
    }

    async fn save_inspection(&self, inspection: &Inspection) -> StorageResult<i64> {
        if self.fail_inspections.load(Ordering::SeqCst) {
            return Err(StorageError::QueryFailed("disk I/O error".to_string()));
        }
        self.inner.save_inspection(inspection).await
    }

    async fn latest_inspections(&self) -> StorageResult<Vec<Inspection>> {
        self.inner.latest_inspections().await
    }

    async fn inspections_for_node(
        &self,
        node_id: i64,
        limit: usize,
    ) -> StorageResult<Vec<Inspection>> {
        self.inner.inspections_for_node(node_id, limit).await
    }

    async fn cleanup_old_inspections(&self, before: DateTime<Utc>) -> StorageResult<usize> {
        self.inner.cleanup_old_inspections(before).await
    }

    async fn create_alert(&self, alert: &Alert) -> StorageResult<i64> {
        self.inner.create_alert(alert).await
    }

    async fn mark_alert_notified(&self, id: i64) -> StorageResult<()> {
        self.inner.mark_alert_notified(id).await
    }

    async fn update_alert_status(&self, id: i64, status: AlertStatus) -> StorageResult<()> {
        self.inner.update_alert_status(id, status).await
    }

    async fn list_alerts(&self, limit: usize, offset: usize) -> StorageResult<Vec<Alert>> {
        self.inner.list_alerts(limit, offset).await
    }

    async fn alert_stats(&self) -> StorageResult<AlertStats> {
        self.inner.alert_stats().await
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        self.inner.health_check().await
    }

    async fn close(&self) -> StorageResult<()> {
        self.inner.close().await
    }
}
