//! The inspection pipeline
//!
//! ## Data flow
//!
//! ```text
//! Scheduler tick / trigger
//!     → Dispatcher: list enabled nodes, probe each (bounded, retried)
//!     → Aggregator: persist, update liveness, tally
//!     → AlertEngine: cooldown, alert of record, notification
//! ```

use std::sync::Arc;

use anyhow::Result;

use crate::config::Config;
use crate::notify;
use crate::storage::StorageBackend;

pub mod aggregator;
pub mod alert;
pub mod cooldown;
pub mod dispatcher;
pub mod messages;
pub mod prober;
pub mod scheduler;

pub use aggregator::Aggregator;
pub use alert::AlertEngine;
pub use cooldown::CooldownTracker;
pub use dispatcher::{Dispatcher, RetryPolicy};
pub use messages::{CycleSummary, NodeOutcome, ProbeOutcome, SchedulerStatus};
pub use prober::{HttpProber, NodeProbe};
pub use scheduler::Scheduler;

/// Wire the full pipeline from configuration with a custom probe
pub fn build_scheduler_with_probe(
    config: &Config,
    storage: Arc<dyn StorageBackend>,
    probe: Arc<dyn NodeProbe>,
) -> Result<Scheduler> {
    let mut engine = AlertEngine::new(storage.clone(), &config.alert);
    if let Some(notify_config) = &config.notify
        && let Some(notifier) = notify::from_config(notify_config)?
    {
        engine = engine.with_notifier(notifier, notify_config.subject_prefix.clone());
    }

    let dispatcher = Dispatcher::from_config(probe, &config.check);
    let aggregator = Aggregator::new(storage.clone(), Arc::new(engine));

    Ok(Scheduler::new(
        storage,
        dispatcher,
        aggregator,
        config.check.interval(),
    ))
}

/// Wire the full pipeline from configuration, probing over HTTP
pub fn build_scheduler(config: &Config, storage: Arc<dyn StorageBackend>) -> Result<Scheduler> {
    let probe = Arc::new(HttpProber::new(config.check.timeout())?);
    build_scheduler_with_probe(config, storage, probe)
}
