//! Bounded Dispatcher - fans one cycle out across the fleet
//!
//! One task per node, at most `max_concurrent` of them probing at any time.
//! A task holds its semaphore permit for its whole retry sequence, backoff
//! sleeps included, so the cap bounds nodes being worked on rather than
//! sockets open.
//!
//! ```text
//! nodes ──► spawn task per node ──► [permit] ─► pull ─► retry w/ backoff ─► NodeOutcome
//!                                        ▲                                       │
//!                                   Semaphore(k)                    JoinSet barrier ─► Vec<NodeOutcome>
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{self, Instant};
use tracing::{debug, error, instrument, warn};

use super::messages::{NodeOutcome, ProbeOutcome};
use super::prober::NodeProbe;
use crate::config::CheckConfig;
use crate::model::{Inspection, Node};

/// Retry knobs applied to every node of a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per node, at least one
    pub retry_times: u32,
    /// Sleep after failed attempt `i` is `i * backoff`
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(attempt)
    }
}

pub struct Dispatcher {
    probe: Arc<dyn NodeProbe>,
    max_concurrent: usize,
    policy: RetryPolicy,
}

impl Dispatcher {
    pub fn new(probe: Arc<dyn NodeProbe>, max_concurrent: usize, policy: RetryPolicy) -> Self {
        Self {
            probe,
            max_concurrent: max_concurrent.max(1),
            policy: RetryPolicy {
                retry_times: policy.retry_times.max(1),
                backoff: policy.backoff,
            },
        }
    }

    pub fn from_config(probe: Arc<dyn NodeProbe>, check: &CheckConfig) -> Self {
        Self::new(
            probe,
            check.max_concurrent,
            RetryPolicy {
                retry_times: check.retry_times,
                backoff: check.backoff(),
            },
        )
    }

    /// Probe every node and wait for all of them
    ///
    /// Returns exactly one outcome per input node, in completion order. A
    /// task that dies without producing an outcome is reported as
    /// unreachable.
    #[instrument(skip_all, fields(nodes = nodes.len()))]
    pub async fn run_cycle(&self, nodes: Vec<Node>) -> Vec<NodeOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = JoinSet::new();
        let mut in_flight = HashMap::with_capacity(nodes.len());

        for node in nodes {
            let handle = tasks.spawn(probe_with_retry(
                self.probe.clone(),
                semaphore.clone(),
                node.clone(),
                self.policy,
            ));
            in_flight.insert(handle.id(), node);
        }

        let mut outcomes = Vec::with_capacity(in_flight.len());
        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((id, outcome)) => {
                    in_flight.remove(&id);
                    outcomes.push(outcome);
                }
                Err(e) => {
                    let Some(node) = in_flight.remove(&e.id()) else {
                        error!("probe task failed for an untracked node: {e}");
                        continue;
                    };
                    error!(node = %node.name, "probe task failed: {e}");
                    let error = format!("probe task failed: {e}");
                    outcomes.push(NodeOutcome {
                        outcome: ProbeOutcome::Unreachable {
                            inspection: Inspection::unreachable(&node, &error),
                            error,
                        },
                        node,
                        attempts: 0,
                        duration: Duration::ZERO,
                    });
                }
            }
        }

        debug!("cycle dispatch complete: {} outcomes", outcomes.len());
        outcomes
    }
}

async fn probe_with_retry(
    probe: Arc<dyn NodeProbe>,
    semaphore: Arc<Semaphore>,
    node: Node,
    policy: RetryPolicy,
) -> NodeOutcome {
    let started = Instant::now();

    let _permit = match semaphore.acquire_owned().await {
        Ok(permit) => permit,
        Err(e) => {
            let error = format!("dispatcher closed: {e}");
            return NodeOutcome {
                outcome: ProbeOutcome::Unreachable {
                    inspection: Inspection::unreachable(&node, &error),
                    error,
                },
                node,
                attempts: 0,
                duration: started.elapsed(),
            };
        }
    };

    let mut last_error = String::new();
    for attempt in 1..=policy.retry_times {
        match probe.pull(&node).await {
            Ok(inspection) => {
                return NodeOutcome {
                    node,
                    outcome: ProbeOutcome::Inspected(inspection),
                    attempts: attempt,
                    duration: started.elapsed(),
                };
            }
            Err(e) => {
                last_error = format!("{e:#}");
                warn!(
                    node = %node.name,
                    attempt,
                    max_attempts = policy.retry_times,
                    "probe failed: {last_error}"
                );
                if attempt < policy.retry_times {
                    time::sleep(policy.delay_after(attempt)).await;
                }
            }
        }
    }

    error!(
        node = %node.name,
        "node unreachable after {} attempts: {last_error}",
        policy.retry_times
    );

    NodeOutcome {
        outcome: ProbeOutcome::Unreachable {
            inspection: Inspection::unreachable(&node, &last_error),
            error: last_error,
        },
        node,
        attempts: policy.retry_times,
        duration: started.elapsed(),
    }
}
