//! Storage backends for the fleet inventory, inspections and alerts
//!
//! ## Design
//!
//! - **Trait-based**: `StorageBackend` trait allows swapping implementations
//! - **Async**: All operations are async and safe to call from concurrent
//!   probe tasks
//!
//! ## Backends
//!
//! - **SQLite** (default): Embedded database with migrations
//! - **In-Memory** (fallback): No persistence, for testing or alert-only
//!   deployments
//!
//! ## Usage
//!
//! ```no_run
//! use fleet_inspector::storage::{StorageBackend, sqlite::SqliteBackend};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let backend = SqliteBackend::new("./inspector.db").await?;
//!     let nodes = backend.list_enabled_nodes().await?;
//!     println!("{} nodes enabled", nodes.len());
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod error;
pub mod memory;
pub mod retention;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

pub use backend::{HealthStatus, StorageBackend};
pub use error::{StorageError, StorageResult};

use tracing::debug;

use crate::model::NodeSpec;

/// Register every configured node, returning how many were seeded
///
/// Nodes are keyed by name, so re-running with the same inventory updates
/// rows instead of duplicating them.
pub async fn seed_inventory(
    backend: &dyn StorageBackend,
    specs: Vec<NodeSpec>,
) -> StorageResult<usize> {
    let mut seeded = 0;
    for spec in specs {
        let node = backend.upsert_node(spec).await?;
        debug!(node = %node.name, id = node.id, enabled = node.enabled, "node registered");
        seeded += 1;
    }
    Ok(seeded)
}
