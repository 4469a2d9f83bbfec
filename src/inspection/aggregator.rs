//! Result Aggregator - turns a cycle's outcomes into state changes
//!
//! ```text
//! Unreachable ─► failed += 1, node offline, nothing persisted
//! Inspected   ─► succeeded += 1 ─► save_inspection ─► node online ─► AlertEngine::evaluate
//! ```
//!
//! A format failure arrives as `Inspected` carrying a synthetic CRITICAL
//! inspection, so it is persisted and counted as a success.

use std::sync::Arc;

use tokio::time::Instant;
use tracing::{error, info, instrument};

use super::alert::AlertEngine;
use super::messages::{CycleSummary, NodeOutcome, ProbeOutcome};
use crate::model::NodeStatus;
use crate::storage::StorageBackend;

pub struct Aggregator {
    storage: Arc<dyn StorageBackend>,
    engine: Arc<AlertEngine>,
}

impl Aggregator {
    pub fn new(storage: Arc<dyn StorageBackend>, engine: Arc<AlertEngine>) -> Self {
        Self { storage, engine }
    }

    /// Process every outcome of a cycle started at `started`
    #[instrument(skip_all, fields(total = outcomes.len()))]
    pub async fn process(&self, outcomes: Vec<NodeOutcome>, started: Instant) -> CycleSummary {
        let total = outcomes.len();
        let mut succeeded = 0;
        let mut failed = 0;

        for NodeOutcome { node, outcome, .. } in outcomes {
            let mut inspection = match outcome {
                ProbeOutcome::Unreachable { error, .. } => {
                    failed += 1;
                    error!(node = %node.name, "inspection failed: {error}");
                    if let Err(e) = self
                        .storage
                        .update_node_status(node.id, NodeStatus::Offline)
                        .await
                    {
                        error!(node = %node.name, "failed to mark node offline: {e}");
                    }
                    continue;
                }
                ProbeOutcome::Inspected(inspection) => inspection,
            };

            succeeded += 1;

            match self.storage.save_inspection(&inspection).await {
                Ok(id) => inspection.id = Some(id),
                Err(e) => {
                    error!(node = %node.name, "failed to save inspection: {e}");
                    continue;
                }
            }

            if let Err(e) = self
                .storage
                .update_node_status(node.id, NodeStatus::Online)
                .await
            {
                error!(node = %node.name, "failed to mark node online: {e}");
            }

            self.engine.evaluate(&inspection, &node).await;
        }

        let summary = CycleSummary {
            total,
            succeeded,
            failed,
            elapsed: started.elapsed(),
        };

        info!(
            total,
            succeeded,
            failed,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "inspection cycle complete"
        );

        summary
    }
}
