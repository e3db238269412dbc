//! PollWaiter: the long-polling blocking-read state machine.
//!
//! ```text
//! Idle ──satisfied──────────────▶ Satisfied
//!   │
//!   └──▶ Waiting ──satisfied────▶ Satisfied
//!           │
//!           └──deadline passed──▶ TimedOut
//! ```
//!
//! A wait is satisfied when the log length differs from the caller's
//! threshold: either new messages arrived, or the caller claims to have seen
//! more than exists (stale or malformed client state, answered at once).
//!
//! While `Waiting`, the caller's task is parked on three wake sources: the
//! log's length channel, a periodic re-check tick and the deadline. No lock
//! is held while parked, and each waiter is a future, not a thread.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};

use crate::config::WAIT_CEILING;
use crate::log::MessageLog;
use crate::message::Snapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitState {
    Idle,
    Waiting,
    Satisfied,
    TimedOut,
}

impl WaitState {
    /// Pure transition function. Terminal states never change.
    pub fn advance(self, satisfied: bool, expired: bool) -> Self {
        match self {
            Self::Satisfied | Self::TimedOut => self,
            _ if satisfied => Self::Satisfied,
            Self::Waiting if expired => Self::TimedOut,
            _ => Self::Waiting,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Satisfied | Self::TimedOut)
    }
}

/// Result of a long-poll: always the full current log, plus how the wait ended.
#[derive(Debug, Clone)]
pub struct WaitOutcome {
    pub messages: Snapshot,
    pub state: WaitState,
}

impl WaitOutcome {
    pub fn timed_out(&self) -> bool {
        self.state == WaitState::TimedOut
    }
}

pub struct PollWaiter {
    log: Arc<MessageLog>,
    recheck_interval: Duration,
    max_wait: Duration,
    // std Mutex: deregistration happens in `Drop`, which cannot await.
    pending: Mutex<PendingRegistry>,
}

#[derive(Default)]
struct PendingRegistry {
    next_id: u64,
    /// Registration id -> threshold the caller is waiting past.
    waits: HashMap<u64, usize>,
}

/// One blocked long-poll. Deregisters itself when dropped, which covers
/// satisfaction, timeout and the caller abandoning the future.
struct PendingWait<'a> {
    id: u64,
    registry: &'a Mutex<PendingRegistry>,
}

impl Drop for PendingWait<'_> {
    fn drop(&mut self) {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        registry.waits.remove(&self.id);
    }
}

impl PollWaiter {
    /// * `recheck_interval` -- periodic re-check alongside the append wake-up.
    /// * `max_wait`         -- cap applied to every requested wait.
    pub fn new(log: Arc<MessageLog>, recheck_interval: Duration, max_wait: Duration) -> Self {
        Self {
            log,
            recheck_interval: recheck_interval.clamp(Duration::from_millis(1), WAIT_CEILING),
            max_wait: max_wait.min(WAIT_CEILING),
            pending: Mutex::new(PendingRegistry::default()),
        }
    }

    /// Block until the log length differs from `threshold` or `max_wait`
    /// (clamped to the configured cap) elapses. Never fails.
    pub async fn wait(&self, threshold: usize, max_wait: Duration) -> WaitOutcome {
        // Subscribe before the first check so an append racing with it
        // still marks the receiver changed.
        let mut len_rx = self.log.watch_len();
        let max_wait = max_wait.min(self.max_wait);
        let deadline = Instant::now() + max_wait;

        let mut state = WaitState::Idle.advance(self.is_satisfied(threshold), false);
        if state.is_terminal() {
            tracing::trace!(threshold, len = self.log.len(), "long-poll satisfied immediately");
            return self.outcome(state).await;
        }

        let _pending = self.register(threshold);
        tracing::trace!(threshold, max_wait_ms = max_wait.as_millis() as u64, "long-poll waiting");

        let mut recheck =
            tokio::time::interval_at(Instant::now() + self.recheck_interval, self.recheck_interval);
        recheck.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let timeout = tokio::time::sleep_until(deadline);
        tokio::pin!(timeout);
        let mut watching = true;

        while !state.is_terminal() {
            tokio::select! {
                _ = &mut timeout => {}
                changed = len_rx.changed(), if watching => {
                    // Sender lives in the log; fall back to ticks if it ever goes.
                    if changed.is_err() {
                        watching = false;
                    }
                }
                _ = recheck.tick() => {}
            }
            state = state.advance(self.is_satisfied(threshold), Instant::now() >= deadline);
        }

        tracing::trace!(threshold, state = ?state, "long-poll finished");
        self.outcome(state).await
    }

    /// Number of long-polls currently blocked.
    pub fn pending(&self) -> usize {
        self.registry().waits.len()
    }

    /// Thresholds of the currently blocked long-polls, lowest first.
    #[cfg(test)]
    fn pending_thresholds(&self) -> Vec<usize> {
        let mut thresholds: Vec<usize> = self.registry().waits.values().copied().collect();
        thresholds.sort_unstable();
        thresholds
    }

    fn is_satisfied(&self, threshold: usize) -> bool {
        let len = self.log.len();
        len > threshold || threshold > len
    }

    fn register(&self, threshold: usize) -> PendingWait<'_> {
        let mut registry = self.registry();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.waits.insert(id, threshold);
        PendingWait {
            id,
            registry: &self.pending,
        }
    }

    fn registry(&self) -> std::sync::MutexGuard<'_, PendingRegistry> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn outcome(&self, state: WaitState) -> WaitOutcome {
        WaitOutcome {
            messages: self.log.snapshot().await,
            state,
        }
    }
}
