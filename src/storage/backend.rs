//! Storage backend trait definition
//!
//! This module defines the core `StorageBackend` trait that all
//! storage implementations must implement.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::StorageResult;
use crate::model::{Alert, AlertStats, AlertStatus, Inspection, Node, NodeSpec, NodeStatus};

/// Health status of the storage backend
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Is the backend operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,

    /// Additional backend-specific metadata
    pub metadata: std::collections::HashMap<String, String>,
}

/// Trait for persistent storage backends
///
/// Holds the fleet inventory, the inspection history and the alerts of
/// record. The inspection pipeline only needs the inventory reads,
/// `save_inspection`, `update_node_status`, `create_alert` and
/// `mark_alert_notified`; the rest serves the administrative surface and
/// retention.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync` as they are shared by every
/// concurrent probe task through an `Arc`.
///
/// ## Error Handling
///
/// Methods return `StorageResult<T>` which wraps `StorageError`.
/// Implementations should convert backend-specific errors to
/// `StorageError` variants.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Insert a node or update the existing one with the same name
    async fn upsert_node(&self, spec: NodeSpec) -> StorageResult<Node>;

    /// All nodes ordered by id
    async fn list_nodes(&self) -> StorageResult<Vec<Node>>;

    /// Nodes that take part in inspection cycles
    async fn list_enabled_nodes(&self) -> StorageResult<Vec<Node>>;

    async fn get_node(&self, id: i64) -> StorageResult<Option<Node>>;

    /// Record liveness and stamp `last_check_at` with the current time
    async fn update_node_status(&self, id: i64, status: NodeStatus) -> StorageResult<()>;

    /// Persist an inspection, returning its id
    async fn save_inspection(&self, inspection: &Inspection) -> StorageResult<i64>;

    /// Newest inspection of every node that has one
    async fn latest_inspections(&self) -> StorageResult<Vec<Inspection>>;

    /// Newest first
    async fn inspections_for_node(&self, node_id: i64, limit: usize)
    -> StorageResult<Vec<Inspection>>;

    /// Delete inspections older than the specified timestamp
    ///
    /// Used for retention policy enforcement. Returns the number of
    /// inspections deleted.
    async fn cleanup_old_inspections(&self, before: DateTime<Utc>) -> StorageResult<usize>;

    /// Persist an alert, returning its id
    async fn create_alert(&self, alert: &Alert) -> StorageResult<i64>;

    /// Flag an alert as delivered to the notification channel
    async fn mark_alert_notified(&self, id: i64) -> StorageResult<()>;

    /// Move an alert through its lifecycle
    ///
    /// Resolving stamps `resolved_at`. Every change stamps `updated_at`.
    async fn update_alert_status(&self, id: i64, status: AlertStatus) -> StorageResult<()>;

    /// Newest first
    async fn list_alerts(&self, limit: usize, offset: usize) -> StorageResult<Vec<Alert>>;

    async fn alert_stats(&self) -> StorageResult<AlertStats>;

    /// Check backend health
    ///
    /// Performs a lightweight operation to verify the backend
    /// is operational (e.g., ping database, check file access).
    async fn health_check(&self) -> StorageResult<HealthStatus>;

    /// Close the backend and release resources
    async fn close(&self) -> StorageResult<()>;
}
