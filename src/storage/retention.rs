//! Retention policy enforcement for the inspection history

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, info, trace};

use super::backend::StorageBackend;

/// Run retention cleanup daily
const CLEANUP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Delete inspections older than `retention_days`, returning how many went
pub async fn run_cleanup(backend: &dyn StorageBackend, retention_days: u32) -> usize {
    let cutoff = chrono::Utc::now() - chrono::Duration::days(i64::from(retention_days));
    debug!(
        "running retention cleanup (deleting inspections before {})",
        cutoff
    );

    match backend.cleanup_old_inspections(cutoff).await {
        Ok(0) => {
            trace!("retention cleanup: no old inspections to delete");
            0
        }
        Ok(deleted) => {
            info!(
                "retention cleanup complete: deleted {} old inspections",
                deleted
            );
            deleted
        }
        Err(e) => {
            // retried on the next tick
            error!("failed to cleanup old inspections: {}", e);
            0
        }
    }
}

/// Clean up once now and then every day until the task is aborted
pub fn spawn_retention_task(backend: Arc<dyn StorageBackend>, retention_days: u32) -> JoinHandle<()> {
    debug!("retention cleanup enabled: {} days", retention_days);

    tokio::spawn(async move {
        let mut interval = time::interval(CLEANUP_INTERVAL);
        loop {
            // first tick completes immediately
            interval.tick().await;
            run_cleanup(backend.as_ref(), retention_days).await;
        }
    })
}
