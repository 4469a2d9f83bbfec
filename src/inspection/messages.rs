use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{Inspection, Node};

/// What one node produced in one cycle
#[derive(Debug, Clone)]
pub enum ProbeOutcome {
    /// The node answered; the inspection may still be a synthetic
    /// bad-response verdict
    Inspected(Inspection),

    /// Every attempt failed to connect
    Unreachable { inspection: Inspection, error: String },
}

impl ProbeOutcome {
    pub fn is_unreachable(&self) -> bool {
        matches!(self, ProbeOutcome::Unreachable { .. })
    }
}

/// Outcome of one node paired with the node it belongs to
#[derive(Debug, Clone)]
pub struct NodeOutcome {
    pub node: Node,
    pub outcome: ProbeOutcome,
    /// Probe attempts spent, at most the configured retry count
    pub attempts: u32,
    pub duration: Duration,
}

/// Tally of one inspection cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CycleSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

fn serialize_millis<S: serde::Serializer>(elapsed: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(elapsed.as_millis().min(u128::from(u64::MAX)) as u64)
}

/// Snapshot of the scheduler for operators
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub next_cycle_at: Option<DateTime<Utc>>,
    pub cycles_completed: u64,
    pub last_summary: Option<CycleSummary>,
}
