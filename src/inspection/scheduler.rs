//! Scheduler - cycle cadence, manual triggers and lifecycle
//!
//! ## State machine
//!
//! ```text
//! Stopped ──start()──► Running ──stop()──► Stopped
//!            │                    │
//!            ├ immediate cycle    ├ ticker cancelled at once
//!            └ ticker loop        └ waits for in-flight cycles
//! ```
//!
//! Every cycle, whether ticked, triggered or run inline, is registered with a
//! [`CycleTracker`] before it starts so `stop()` can wait for it. Cycles may
//! overlap; each one only adds inspections and shares the cooldown state.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use tokio::sync::{Notify, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use super::aggregator::Aggregator;
use super::dispatcher::Dispatcher;
use super::messages::{CycleSummary, SchedulerStatus};
use crate::storage::StorageBackend;

/// Counts cycles in flight and wakes waiters when none are left
#[derive(Debug, Default)]
pub struct CycleTracker {
    active: AtomicUsize,
    idle: Notify,
}

impl CycleTracker {
    /// Register a cycle; it stays registered until the guard drops
    pub fn begin(self: &Arc<Self>) -> CycleGuard {
        self.active.fetch_add(1, Ordering::SeqCst);
        CycleGuard {
            tracker: self.clone(),
        }
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            // register before checking so a wake-up in between is not lost
            notified.as_mut().enable();

            if self.active() == 0 {
                return;
            }
            notified.await;
        }
    }
}

pub struct CycleGuard {
    tracker: Arc<CycleTracker>,
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        if self.tracker.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.tracker.idle.notify_waiters();
        }
    }
}

#[derive(Default)]
struct Ticker {
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

struct Shared {
    storage: Arc<dyn StorageBackend>,
    dispatcher: Dispatcher,
    aggregator: Aggregator,
    interval: Duration,
    cycles: Arc<CycleTracker>,
    status: Mutex<SchedulerStatus>,
}

impl Shared {
    fn update_status(&self, f: impl FnOnce(&mut SchedulerStatus)) {
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut status);
    }

    async fn run_cycle(&self) -> anyhow::Result<CycleSummary> {
        let started = Instant::now();
        self.update_status(|s| s.last_cycle_at = Some(Utc::now()));

        let nodes = self
            .storage
            .list_enabled_nodes()
            .await
            .context("failed to list enabled nodes")?;

        if nodes.is_empty() {
            debug!("no enabled nodes to inspect");
        }

        let outcomes = self.dispatcher.run_cycle(nodes).await;
        let summary = self.aggregator.process(outcomes, started).await;

        self.update_status(|s| {
            s.cycles_completed += 1;
            s.last_summary = Some(summary);
        });

        Ok(summary)
    }

    fn spawn_cycle(self: &Arc<Self>) {
        let guard = self.cycles.begin();
        let shared = self.clone();
        tokio::spawn(async move {
            let _guard = guard;
            if let Err(e) = shared.run_cycle().await {
                error!("inspection cycle aborted: {e:#}");
            }
        });
    }
}

/// Wall-clock time one interval from now, `None` when it is not representable
fn next_cycle_at(interval: Duration) -> Option<DateTime<Utc>> {
    let interval = chrono::Duration::from_std(interval).ok()?;
    Utc::now().checked_add_signed(interval)
}

async fn tick_loop(shared: Arc<Shared>, mut shutdown: oneshot::Receiver<()>) {
    let Some(first) = Instant::now().checked_add(shared.interval) else {
        warn!("interval too large to schedule, only manual cycles will run");
        let _ = shutdown.await;
        return;
    };
    let mut ticker = time::interval_at(first, shared.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let next = next_cycle_at(shared.interval);
                shared.update_status(|s| s.next_cycle_at = next);
                debug!("interval tick, starting cycle");
                shared.spawn_cycle();
            }
            _ = &mut shutdown => break,
        }
    }

    debug!("tick loop stopped");
}

/// Owns the inspection cadence
///
/// Share it through an `Arc`; every method takes `&self`.
pub struct Scheduler {
    shared: Arc<Shared>,
    ticker: tokio::sync::Mutex<Ticker>,
}

impl Scheduler {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        dispatcher: Dispatcher,
        aggregator: Aggregator,
        interval: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                storage,
                dispatcher,
                aggregator,
                interval: interval.max(Duration::from_secs(1)),
                cycles: Arc::new(CycleTracker::default()),
                status: Mutex::new(SchedulerStatus::default()),
            }),
            ticker: tokio::sync::Mutex::new(Ticker::default()),
        }
    }

    /// Launch an immediate cycle and the interval ticker
    ///
    /// Calling it on a running scheduler does nothing.
    #[instrument(skip(self))]
    pub async fn start(&self) {
        let mut ticker = self.ticker.lock().await;
        if ticker.handle.is_some() {
            warn!("scheduler already running");
            return;
        }

        let interval = self.shared.interval;
        let next = next_cycle_at(interval);
        self.shared.update_status(|s| {
            s.running = true;
            s.next_cycle_at = next;
        });

        self.shared.spawn_cycle();

        let (tx, rx) = oneshot::channel();
        ticker.shutdown = Some(tx);
        ticker.handle = Some(tokio::spawn(tick_loop(self.shared.clone(), rx)));

        info!("scheduler started, interval {}s", interval.as_secs());
    }

    /// Cancel the ticker and wait for every in-flight cycle
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        let mut ticker = self.ticker.lock().await;

        if let Some(tx) = ticker.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = ticker.handle.take()
            && let Err(e) = handle.await
        {
            error!("tick loop ended abnormally: {e}");
        }

        self.shared.update_status(|s| {
            s.running = false;
            s.next_cycle_at = None;
        });

        let active = self.shared.cycles.active();
        if active > 0 {
            info!("waiting for {active} in-flight cycle(s)");
        }
        self.shared.cycles.wait_idle().await;

        info!("scheduler stopped");
    }

    /// Start an extra cycle in the background
    ///
    /// The interval ticker is not touched, so this cycle may overlap with a
    /// ticked one.
    pub fn trigger_now(&self) {
        info!("manual inspection triggered");
        self.shared.spawn_cycle();
    }

    /// Run one cycle inline and return its summary
    ///
    /// Fails only when the inventory cannot be read.
    pub async fn run_once(&self) -> anyhow::Result<CycleSummary> {
        let _guard = self.shared.cycles.begin();
        self.shared.run_cycle().await
    }

    pub fn status(&self) -> SchedulerStatus {
        self.shared
            .status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_running(&self) -> bool {
        self.status().running
    }

    /// Wait until no cycle is in flight
    pub async fn wait_idle(&self) {
        self.shared.cycles.wait_idle().await;
    }

    pub fn interval(&self) -> Duration {
        self.shared.interval
    }
}
