//! Administrative REST API for the inspection hub
//!
//! A thin read/invoke surface over storage and the scheduler.
//!
//! ## Architecture
//!
//! - **Axum** web framework with Tower middleware
//! - **Shared state** holding the storage backend and the scheduler
//! - Optional **bearer token** required on every route
//!
//! ## Endpoints
//!
//! - `GET /api/v1/health` - Health check including storage
//! - `GET /api/v1/status` - Scheduler status and node counts
//! - `POST /api/v1/trigger` - Start an inspection cycle now
//! - `GET /api/v1/nodes` - Fleet inventory
//! - `GET /api/v1/nodes/{id}/inspections` - Inspection history of a node
//! - `GET /api/v1/inspections/latest` - Newest inspection per node
//! - `GET /api/v1/alerts` - Alerts, newest first
//! - `GET /api/v1/alerts/stats` - Alert counters
//! - `PUT /api/v1/alerts/{id}/status` - Move an alert through its lifecycle

#[cfg(feature = "api")]
pub mod error;
#[cfg(feature = "api")]
pub mod middleware;
#[cfg(feature = "api")]
pub mod routes;
#[cfg(feature = "api")]
pub mod state;
#[cfg(feature = "api")]
pub mod types;

#[cfg(feature = "api")]
pub use error::{ApiError, ApiResult};
#[cfg(feature = "api")]
pub use state::ApiState;

use std::net::{Ipv4Addr, SocketAddr};

use anyhow::Context;
#[cfg(feature = "api")]
use axum::{
    Router,
    routing::{get, post, put},
};
#[cfg(feature = "api")]
use tracing::info;

use crate::config::ApiSettings;

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind address (e.g., "0.0.0.0:8080")
    pub bind_addr: SocketAddr,

    /// Optional authentication token
    pub auth_token: Option<String>,

    /// Enable CORS for dashboards
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 8080)),
            auth_token: None,
            enable_cors: true,
        }
    }
}

impl TryFrom<&ApiSettings> for ApiConfig {
    type Error = anyhow::Error;

    fn try_from(settings: &ApiSettings) -> anyhow::Result<Self> {
        let bind_addr = settings
            .bind
            .parse()
            .with_context(|| format!("invalid api.bind address '{}'", settings.bind))?;

        Ok(Self {
            bind_addr,
            auth_token: settings.auth_token.clone().filter(|t| !t.is_empty()),
            enable_cors: settings.enable_cors,
        })
    }
}

/// Build the router with every route and the configured layers
#[cfg(feature = "api")]
pub fn router(config: &ApiConfig, state: ApiState) -> Router {
    use tower_http::cors::{Any, CorsLayer};
    use tower_http::trace::TraceLayer;

    let mut app = Router::new()
        .route("/api/v1/health", get(routes::health::health_check))
        .route("/api/v1/status", get(routes::scheduler::get_status))
        .route("/api/v1/trigger", post(routes::scheduler::trigger))
        .route("/api/v1/nodes", get(routes::nodes::list_nodes))
        .route(
            "/api/v1/nodes/:id/inspections",
            get(routes::nodes::node_inspections),
        )
        .route(
            "/api/v1/inspections/latest",
            get(routes::nodes::latest_inspections),
        )
        .route("/api/v1/alerts", get(routes::alerts::list_alerts))
        .route("/api/v1/alerts/stats", get(routes::alerts::alert_stats))
        .route(
            "/api/v1/alerts/:id/status",
            put(routes::alerts::update_alert_status),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    if let Some(token) = config.auth_token.clone() {
        app = app.layer(axum::middleware::from_fn_with_state(
            token,
            middleware::auth::auth_middleware,
        ));
    }

    app
}

/// Spawn the API server
///
/// This starts an Axum HTTP server in a background task.
/// Returns the server's local address.
#[cfg(feature = "api")]
pub async fn spawn_api_server(config: ApiConfig, state: ApiState) -> anyhow::Result<SocketAddr> {
    info!("starting API server on {}", config.bind_addr);

    let app = router(&config, state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind API server to {}", config.bind_addr))?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("API server error: {}", e);
        }
    });

    Ok(addr)
}
