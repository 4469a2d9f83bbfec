//! API request and response bodies

use serde::{Deserialize, Serialize};

use crate::inspection::SchedulerStatus;
use crate::model::AlertStatus;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    pub storage: StorageHealth,
}

#[derive(Debug, Serialize)]
pub struct StorageHealth {
    pub healthy: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub scheduler: SchedulerStatus,
    pub interval_secs: u64,
    pub total_nodes: usize,
    pub enabled_nodes: usize,
}

/// Paging for list endpoints
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl PageQuery {
    pub const DEFAULT_LIMIT: usize = 50;
    pub const MAX_LIMIT: usize = 500;

    pub fn limit(&self) -> usize {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }

    pub fn offset(&self) -> usize {
        self.offset.unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
pub struct AlertStatusUpdate {
    pub status: AlertStatus,
}
