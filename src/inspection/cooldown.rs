use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::model::Severity;

/// Key of a cooldown entry
pub type CooldownKey = (i64, Severity);

/// Last-alert timestamps per (node, severity)
///
/// Process-lifetime state, never persisted. The only mutation is
/// [`CooldownTracker::try_acquire`], whose check and refresh happen under one
/// lock so concurrent evaluations of the same key cannot both win.
#[derive(Debug, Default)]
pub struct CooldownTracker {
    entries: Mutex<HashMap<CooldownKey, Instant>>,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the right to alert for `key`
    ///
    /// Returns `false` when the previous claim is younger than `window`.
    /// Otherwise records now as the claim time and returns `true`.
    pub fn try_acquire(&self, key: CooldownKey, window: Duration) -> bool {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        match entries.get(&key) {
            Some(last) if now.duration_since(*last) < window => false,
            _ => {
                entries.insert(key, now);
                true
            }
        }
    }

    /// Time left before `key` may alert again
    pub fn remaining(&self, key: CooldownKey, window: Duration) -> Option<Duration> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(&key)
            .map(|last| window.saturating_sub(last.elapsed()))
            .filter(|left| !left.is_zero())
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
