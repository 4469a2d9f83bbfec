//! Shared state passed to all API handlers

use std::sync::Arc;

use crate::inspection::Scheduler;
use crate::storage::StorageBackend;

#[derive(Clone)]
pub struct ApiState {
    /// Inventory, inspections and alerts
    pub storage: Arc<dyn StorageBackend>,

    /// For status snapshots and manual triggers
    pub scheduler: Arc<Scheduler>,
}

impl ApiState {
    pub fn new(storage: Arc<dyn StorageBackend>, scheduler: Arc<Scheduler>) -> Self {
        Self { storage, scheduler }
    }
}
