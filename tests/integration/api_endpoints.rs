//! Administrative API served over a real socket

use std::net::SocketAddr;
use std::sync::Arc;

use fleet_inspector::api::{ApiConfig, ApiState, spawn_api_server};
use fleet_inspector::config::Config;
use fleet_inspector::inspection::{Scheduler, build_scheduler};
use fleet_inspector::storage::StorageBackend;
use fleet_inspector::storage::memory::MemoryBackend;
use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use serde_json::{Value, json};
use wiremock::MockServer;

use crate::helpers::{config_for, mount_node, report, seed};

struct TestApi {
    addr: SocketAddr,
    client: reqwest::Client,
    storage: Arc<dyn StorageBackend>,
    scheduler: Arc<Scheduler>,
    _server: MockServer,
}

impl TestApi {
    async fn start(auth_token: Option<&str>) -> Self {
        let server = MockServer::start().await;
        mount_node(&server, "db-01", report("db-01", "CRITICAL", "disk full")).await;
        mount_node(&server, "web-01", report("web-01", "OK", "fine")).await;

        let config: Config =
            config_for(&server.uri(), &["db-01", "web-01"], json!({}), json!({}));
        let storage: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
        seed(storage.as_ref(), &config).await;
        let scheduler = Arc::new(build_scheduler(&config, storage.clone()).unwrap());

        let api_config = ApiConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            auth_token: auth_token.map(str::to_string),
            enable_cors: true,
        };
        let addr = spawn_api_server(api_config, ApiState::new(storage.clone(), scheduler.clone()))
            .await
            .unwrap();

        Self {
            addr,
            client: reqwest::Client::new(),
            storage,
            scheduler,
            _server: server,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    async fn get_json(&self, path: &str) -> Value {
        let response = self.client.get(self.url(path)).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "GET {path}");
        response.json().await.unwrap()
    }
}

#[tokio::test]
async fn test_health_and_status() {
    let api = TestApi::start(None).await;

    let health = api.get_json("/api/v1/health").await;
    assert_eq!(health["status"], "ok");
    assert_eq!(health["storage"]["healthy"], true);

    let status = api.get_json("/api/v1/status").await;
    assert_eq!(status["running"], false);
    assert_eq!(status["cycles_completed"], 0);
    assert_eq!(status["interval_secs"], 300);
    assert_eq!(status["total_nodes"], 2);
    assert_eq!(status["enabled_nodes"], 2);
}

#[tokio::test]
async fn test_trigger_then_browse_results() {
    let api = TestApi::start(None).await;

    let response = api
        .client
        .post(api.url("/api/v1/trigger"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    api.scheduler.wait_idle().await;

    let status = api.get_json("/api/v1/status").await;
    assert_eq!(status["cycles_completed"], 1);
    assert_eq!(status["last_summary"]["succeeded"], 2);

    let latest = api.get_json("/api/v1/inspections/latest").await;
    assert_eq!(latest["count"], 2);

    let nodes = api.get_json("/api/v1/nodes").await;
    assert_eq!(nodes["count"], 2);
    // tokens never leave the hub
    assert!(nodes["nodes"][0].get("token").is_none());

    let db = api
        .storage
        .list_nodes()
        .await
        .unwrap()
        .into_iter()
        .find(|n| n.name == "db-01")
        .unwrap();
    let history = api
        .get_json(&format!("/api/v1/nodes/{}/inspections?limit=5", db.id))
        .await;
    assert_eq!(history["node"]["name"], "db-01");
    assert_eq!(history["count"], 1);
    assert_eq!(history["inspections"][0]["level"], "CRITICAL");

    let alerts = api.get_json("/api/v1/alerts?limit=10").await;
    assert_eq!(alerts["count"], 1);
    assert_eq!(alerts["alerts"][0]["summary"], "disk full");
    assert_eq!(alerts["alerts"][0]["status"], "pending");

    let stats = api.get_json("/api/v1/alerts/stats").await;
    assert_eq!(stats["total"], 1);
    assert_eq!(stats["pending"], 1);
}

#[tokio::test]
async fn test_alert_lifecycle_update() {
    let api = TestApi::start(None).await;
    api.scheduler.run_once().await.unwrap();

    let alert_id = api.storage.list_alerts(1, 0).await.unwrap()[0].id.unwrap();

    let response = api
        .client
        .put(api.url(&format!("/api/v1/alerts/{alert_id}/status")))
        .json(&json!({ "status": "resolved" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "resolved");

    let alert = &api.storage.list_alerts(1, 0).await.unwrap()[0];
    assert!(alert.resolved_at.is_some());

    let stats = api.get_json("/api/v1/alerts/stats").await;
    assert_eq!(stats["pending"], 0);
}

#[tokio::test]
async fn test_unknown_ids_are_not_found() {
    let api = TestApi::start(None).await;

    let response = api
        .client
        .get(api.url("/api/v1/nodes/9999/inspections"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = api
        .client
        .put(api.url("/api/v1/alerts/9999/status"))
        .json(&json!({ "status": "processing" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_bearer_token_required() {
    let api = TestApi::start(Some("hub-secret")).await;

    let missing = api
        .client
        .get(api.url("/api/v1/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let malformed = api
        .client
        .get(api.url("/api/v1/health"))
        .header("Authorization", "Token hub-secret")
        .send()
        .await
        .unwrap();
    assert_eq!(malformed.status(), StatusCode::UNAUTHORIZED);

    let wrong = api
        .client
        .get(api.url("/api/v1/health"))
        .bearer_auth("nope")
        .send()
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::FORBIDDEN);
    let body: Value = wrong.json().await.unwrap();
    assert_eq!(body["error"], "Invalid token");

    let ok = api
        .client
        .get(api.url("/api/v1/health"))
        .bearer_auth("hub-secret")
        .send()
        .await
        .unwrap();
    assert_eq!(ok.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_taken_port_fails_before_scheduler_starts() {
    let api = TestApi::start(None).await;

    let config = ApiConfig {
        bind_addr: api.addr,
        auth_token: None,
        enable_cors: false,
    };
    let err = spawn_api_server(
        config,
        ApiState::new(api.storage.clone(), api.scheduler.clone()),
    )
    .await
    .unwrap_err();

    assert!(
        format!("{err:#}").contains("failed to bind API server"),
        "{err:#}"
    );
    assert!(!api.scheduler.is_running());
    assert_eq!(api.scheduler.status().cycles_completed, 0);
}
