//! # Runner liveness tracker with sequence-based ordering.
//!
//! Maintains the set of runners currently alive, using event sequence numbers
//! to handle out-of-order delivery.
//!
//! ## Architecture
//! ```text
//! runner threads ──► Bus ──► subscriber_listener() ──► AliveTracker::update()
//!                                                           │
//!                                                           ▼
//!                                               HashMap<String, RunnerLiveness>
//!                                                   (name → {seq, alive})
//! ```
//!
//! ## Rules
//! - Only `RunnerStarted` / `RunnerDead` change alive state
//! - Read operations (`snapshot`, `is_alive`) are **eventually consistent**
//! - Other events **update seq** but don't affect alive status
//! - Events with `seq <= last_seq` are **rejected** (stale)

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::events::{Event, EventKind};

#[derive(Debug, Clone)]
struct RunnerLiveness {
    last_seq: Option<u64>,
    alive: bool,
}

/// Thread-safe tracker of alive runners.
///
/// Used by the supervisor to report runners that did not stop within the
/// grace period.
#[derive(Debug, Default)]
pub struct AliveTracker {
    state: RwLock<HashMap<String, RunnerLiveness>>,
}

impl AliveTracker {
    /// Creates a new empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies `ev` if it is newer than the last event seen for its runner.
    ///
    /// ```text
    /// update(RunnerDead, seq=100)    → alive=false, last_seq=100
    /// update(RunnerStarted, seq=99)  → rejected (stale)
    /// ```
    ///
    /// Returns `true` if the alive state changed.
    pub async fn update(&self, ev: &Event) -> bool {
        let Some(name) = ev.runner.as_deref() else {
            return false;
        };
        if matches!(
            ev.kind,
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked
        ) {
            return false;
        }

        let mut state = self.state.write().await;
        let entry = state.entry(name.to_string()).or_insert(RunnerLiveness {
            last_seq: None,
            alive: false,
        });
        if entry.last_seq.is_some_and(|last| ev.seq <= last) {
            return false;
        }
        entry.last_seq = Some(ev.seq);
        match ev.kind {
            EventKind::RunnerStarted => {
                entry.alive = true;
                true
            }
            EventKind::RunnerDead => {
                entry.alive = false;
                true
            }
            _ => false,
        }
    }

    /// Returns the sorted names of runners started but not yet dead.
    pub async fn snapshot(&self) -> Vec<String> {
        let state = self.state.read().await;
        let mut alive: Vec<String> = state
            .iter()
            .filter(|(_, rl)| rl.alive)
            .map(|(name, _)| name.clone())
            .collect();
        alive.sort_unstable();
        alive
    }

    /// Returns true if the runner is currently alive.
    pub async fn is_alive(&self, name: &str) -> bool {
        self.state
            .read()
            .await
            .get(name)
            .is_some_and(|rl| rl.alive)
    }
}
