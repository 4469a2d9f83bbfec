//! Alert Decision Engine
//!
//! Decides whether a persisted inspection becomes an alert of record:
//!
//! 1. alerting switched off, or severity below CRITICAL: nothing happens
//! 2. the (node, severity) key is cooling down: nothing happens
//! 3. otherwise the alert is persisted, then the notifier is invoked and a
//!    successful delivery flips `notified`
//!
//! Persistence and delivery failures are logged and swallowed. An alert that
//! could not be delivered stays persisted with `notified = false`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, instrument, trace};

use super::cooldown::CooldownTracker;
use crate::config::AlertConfig;
use crate::model::{Alert, AlertStatus, AnalysisVerdict, Inspection, Node};
use crate::notify::Notifier;
use crate::storage::StorageBackend;

const DEFAULT_SOLUTION: &str = "Inspect the node manually";

pub struct AlertEngine {
    enabled: bool,
    cooldown: Duration,
    tracker: Arc<CooldownTracker>,
    storage: Arc<dyn StorageBackend>,
    notifier: Option<Arc<dyn Notifier>>,
    subject_prefix: String,
}

impl AlertEngine {
    pub fn new(storage: Arc<dyn StorageBackend>, settings: &AlertConfig) -> Self {
        Self {
            enabled: settings.enabled,
            cooldown: settings.cooldown(),
            tracker: Arc::new(CooldownTracker::new()),
            storage,
            notifier: None,
            subject_prefix: String::new(),
        }
    }

    pub fn with_notifier(
        mut self,
        notifier: Arc<dyn Notifier>,
        subject_prefix: impl Into<String>,
    ) -> Self {
        self.notifier = Some(notifier);
        self.subject_prefix = subject_prefix.into();
        self
    }

    pub fn tracker(&self) -> &Arc<CooldownTracker> {
        &self.tracker
    }

    /// Evaluate one persisted inspection, returning the alert if one was raised
    #[instrument(skip_all, fields(node = %node.name, level = %inspection.level))]
    pub async fn evaluate(&self, inspection: &Inspection, node: &Node) -> Option<Alert> {
        if !self.enabled || !inspection.level.is_alerting() {
            return None;
        }

        let key = (node.id, inspection.level);
        if !self.tracker.try_acquire(key, self.cooldown) {
            let remaining = self.tracker.remaining(key, self.cooldown).unwrap_or_default();
            trace!(
                remaining_secs = remaining.as_secs(),
                "alert suppressed by cooldown"
            );
            return None;
        }

        let mut alert = build_alert(inspection, node);

        let id = match self.storage.create_alert(&alert).await {
            Ok(id) => id,
            Err(e) => {
                error!("failed to persist alert: {e}");
                return None;
            }
        };
        alert.id = Some(id);
        info!(alert_id = id, "alert raised: {}", alert.summary);

        let Some(notifier) = &self.notifier else {
            return Some(alert);
        };

        let subject = self.subject(&alert, node);
        let body = render_body(&alert, node);
        match notifier.send(&subject, &body).await {
            Ok(()) => {
                alert.notified = true;
                if let Err(e) = self.storage.mark_alert_notified(id).await {
                    error!(alert_id = id, "failed to record notification: {e}");
                }
            }
            Err(e) => {
                error!(alert_id = id, "failed to send notification: {e:#}");
            }
        }

        Some(alert)
    }

    fn subject(&self, alert: &Alert, node: &Node) -> String {
        let subject = format!("{} - {}", alert.level, node.name);
        if self.subject_prefix.is_empty() {
            subject
        } else {
            format!("{} {subject}", self.subject_prefix)
        }
    }
}

/// Synthesize the alert of record for a CRITICAL inspection
pub fn build_alert(inspection: &Inspection, node: &Node) -> Alert {
    let verdict = AnalysisVerdict::parse(&inspection.analysis).unwrap_or_default();

    let summary = if verdict.summary.trim().is_empty() {
        format!("Node {} reported {} status", node.name, inspection.level)
    } else {
        verdict.summary
    };

    let solution = if verdict.plan.trim().is_empty() {
        DEFAULT_SOLUTION.to_string()
    } else {
        verdict.plan
    };

    let now = Utc::now();
    Alert {
        id: None,
        node_id: node.id,
        inspection_id: inspection.id,
        level: inspection.level,
        title: format!("{} - {}", node.name, inspection.level),
        summary,
        details: verdict.details.into_iter().next().unwrap_or_default(),
        solution,
        status: AlertStatus::Pending,
        notified: false,
        resolved_at: None,
        created_at: now,
        updated_at: now,
    }
}

/// Plaintext notification body
pub fn render_body(alert: &Alert, node: &Node) -> String {
    format!(
        "[Fleet Inspector alert]\n\
         \n\
         Node:      {name}\n\
         Address:   {ip}\n\
         Severity:  {level}\n\
         Raised at: {raised}\n\
         Summary:   {summary}\n\
         Solution:  {solution}\n\
         \n\
         Please take action.\n",
        name = node.name,
        ip = node.ip,
        level = alert.level,
        raised = alert.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
        summary = alert.summary,
        solution = alert.solution,
    )
}
