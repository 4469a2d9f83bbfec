//! In-memory storage backend (no persistence)
//!
//! Useful for:
//! - Testing without database dependencies
//! - Deployments that only care about live alerting
//!
//! ## Limitations
//!
//! - **No persistence**: All data lost on restart
//! - **Bounded history**: Only the newest inspections per node are kept

use std::collections::{BTreeMap, HashMap, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use super::backend::{HealthStatus, StorageBackend};
use super::error::{StorageError, StorageResult};
use crate::model::{
    Alert, AlertStats, AlertStatus, Inspection, Node, NodeSpec, NodeStatus, Severity,
};

/// Maximum inspections to keep in memory per node
const MAX_INSPECTIONS_PER_NODE: usize = 1000;

#[derive(Default)]
struct Inner {
    nodes: BTreeMap<i64, Node>,
    inspections: HashMap<i64, VecDeque<Inspection>>,
    alerts: BTreeMap<i64, Alert>,
    next_node_id: i64,
    next_inspection_id: i64,
    next_alert_id: i64,
}

impl Inner {
    fn next_id(counter: &mut i64) -> i64 {
        *counter += 1;
        *counter
    }
}

/// In-memory storage backend
///
/// All state sits behind a single `RwLock`; ids increase monotonically and
/// are never reused.
#[derive(Default)]
pub struct MemoryBackend {
    inner: RwLock<Inner>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn upsert_node(&self, spec: NodeSpec) -> StorageResult<Node> {
        let mut inner = self.inner.write().await;

        if let Some(node) = inner.nodes.values_mut().find(|n| n.name == spec.name) {
            node.ip = spec.ip;
            node.url = spec.url;
            node.enabled = spec.enabled;
            node.check_interval_secs = spec.check_interval_secs;
            node.token = spec.token;
            return Ok(node.clone());
        }

        let id = Inner::next_id(&mut inner.next_node_id);
        let node = Node {
            id,
            name: spec.name,
            ip: spec.ip,
            url: spec.url,
            enabled: spec.enabled,
            check_interval_secs: spec.check_interval_secs,
            status: NodeStatus::Unknown,
            last_check_at: None,
            token: spec.token,
        };
        inner.nodes.insert(id, node.clone());
        debug!("in-memory backend: registered node {} as {}", node.name, id);
        Ok(node)
    }

    async fn list_nodes(&self) -> StorageResult<Vec<Node>> {
        Ok(self.inner.read().await.nodes.values().cloned().collect())
    }

    async fn list_enabled_nodes(&self) -> StorageResult<Vec<Node>> {
        Ok(self
            .inner
            .read()
            .await
            .nodes
            .values()
            .filter(|n| n.enabled)
            .cloned()
            .collect())
    }

    async fn get_node(&self, id: i64) -> StorageResult<Option<Node>> {
        Ok(self.inner.read().await.nodes.get(&id).cloned())
    }

    async fn update_node_status(&self, id: i64, status: NodeStatus) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        let node = inner
            .nodes
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("node {id}")))?;
        node.status = status;
        node.last_check_at = Some(Utc::now());
        Ok(())
    }

    async fn save_inspection(&self, inspection: &Inspection) -> StorageResult<i64> {
        let mut inner = self.inner.write().await;
        let id = Inner::next_id(&mut inner.next_inspection_id);

        let mut stored = inspection.clone();
        stored.id = Some(id);

        let history = inner.inspections.entry(inspection.node_id).or_default();
        if history.len() >= MAX_INSPECTIONS_PER_NODE {
            history.pop_front();
        }
        history.push_back(stored);
        Ok(id)
    }

    async fn latest_inspections(&self) -> StorageResult<Vec<Inspection>> {
        let inner = self.inner.read().await;
        let mut latest: Vec<Inspection> = inner
            .inspections
            .values()
            .filter_map(|history| history.back().cloned())
            .collect();
        latest.sort_by_key(|i| i.node_id);
        Ok(latest)
    }

    async fn inspections_for_node(
        &self,
        node_id: i64,
        limit: usize,
    ) -> StorageResult<Vec<Inspection>> {
        let inner = self.inner.read().await;
        Ok(inner
            .inspections
            .get(&node_id)
            .map(|history| history.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn cleanup_old_inspections(&self, before: DateTime<Utc>) -> StorageResult<usize> {
        let mut inner = self.inner.write().await;
        let mut deleted = 0;
        for history in inner.inspections.values_mut() {
            let len = history.len();
            history.retain(|i| i.created_at >= before);
            deleted += len - history.len();
        }
        Ok(deleted)
    }

    async fn create_alert(&self, alert: &Alert) -> StorageResult<i64> {
        let mut inner = self.inner.write().await;
        let id = Inner::next_id(&mut inner.next_alert_id);
        let mut stored = alert.clone();
        stored.id = Some(id);
        inner.alerts.insert(id, stored);
        Ok(id)
    }

    async fn mark_alert_notified(&self, id: i64) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        let alert = inner
            .alerts
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("alert {id}")))?;
        alert.notified = true;
        alert.updated_at = Utc::now();
        Ok(())
    }

    async fn update_alert_status(&self, id: i64, status: AlertStatus) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        let alert = inner
            .alerts
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("alert {id}")))?;
        let now = Utc::now();
        alert.status = status;
        alert.updated_at = now;
        if status == AlertStatus::Resolved {
            alert.resolved_at = Some(now);
        }
        Ok(())
    }

    async fn list_alerts(&self, limit: usize, offset: usize) -> StorageResult<Vec<Alert>> {
        let inner = self.inner.read().await;
        Ok(inner
            .alerts
            .values()
            .rev()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn alert_stats(&self) -> StorageResult<AlertStats> {
        let inner = self.inner.read().await;
        let mut stats = AlertStats::default();
        for alert in inner.alerts.values() {
            stats.total += 1;
            if alert.status == AlertStatus::Pending {
                stats.pending += 1;
            }
            match alert.level {
                Severity::Critical => stats.critical += 1,
                Severity::Warning => stats.warning += 1,
                Severity::Ok => {}
            }
        }
        Ok(stats)
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let inner = self.inner.read().await;
        let mut metadata = HashMap::new();
        metadata.insert("backend".to_string(), "memory".to_string());
        metadata.insert("nodes".to_string(), inner.nodes.len().to_string());
        metadata.insert("alerts".to_string(), inner.alerts.len().to_string());

        Ok(HealthStatus {
            healthy: true,
            message: "in-memory backend operational".to_string(),
            metadata,
        })
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("in-memory backend: close called (no-op)");
        Ok(())
    }
}
