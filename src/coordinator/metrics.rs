//! Coordination loop metrics
//!
//! Lock-free counters written by the loop and read by the status server.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicU8, Ordering};

/// Where the coordination loop currently is within a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoopState {
    Waiting,
    DrainingHigh,
    DrainingNormal,
}

impl LoopState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopState::Waiting => "WAITING",
            LoopState::DrainingHigh => "DRAINING_HIGH",
            LoopState::DrainingNormal => "DRAINING_NORMAL",
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => LoopState::DrainingHigh,
            2 => LoopState::DrainingNormal,
            _ => LoopState::Waiting,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            LoopState::Waiting => 0,
            LoopState::DrainingHigh => 1,
            LoopState::DrainingNormal => 2,
        }
    }
}

impl std::fmt::Display for LoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters for the coordination loop, shared with the status server
pub struct LoopMetrics {
    /// Ticks started
    pub ticks: AtomicU64,
    /// Ticks that found both queues empty
    pub idle_ticks: AtomicU64,
    /// Events handed to a handler that returned normally
    pub events_processed: AtomicU64,
    /// Events dropped on decode or handler error
    pub events_dropped: AtomicU64,
    /// Tasks written to agent queues
    pub tasks_delegated: AtomicU64,
    /// Tasks dropped on the way to an agent queue
    pub delegation_failures: AtomicU64,
    /// Ticks abandoned because the queue backend errored
    pub queue_errors: AtomicU64,
    /// Write-through failures
    pub store_failures: AtomicU64,
    state: AtomicU8,
    last_event_at: AtomicI64,
}

impl LoopMetrics {
    pub fn new() -> Self {
        Self {
            ticks: AtomicU64::new(0),
            idle_ticks: AtomicU64::new(0),
            events_processed: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
            tasks_delegated: AtomicU64::new(0),
            delegation_failures: AtomicU64::new(0),
            queue_errors: AtomicU64::new(0),
            store_failures: AtomicU64::new(0),
            state: AtomicU8::new(LoopState::Waiting.as_u8()),
            last_event_at: AtomicI64::new(0),
        }
    }

    pub fn state(&self) -> LoopState {
        LoopState::from_u8(self.state.load(Ordering::Relaxed))
    }

    pub fn set_state(&self, state: LoopState) {
        self.state.store(state.as_u8(), Ordering::Relaxed);
    }

    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    /// Record that an event left a queue
    pub fn mark_event(&self) {
        self.last_event_at.store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> LoopMetricsSnapshot {
        let last = self.last_event_at.load(Ordering::Relaxed);
        LoopMetricsSnapshot {
            state: self.state(),
            ticks: self.ticks.load(Ordering::Relaxed),
            idle_ticks: self.idle_ticks.load(Ordering::Relaxed),
            events_processed: self.events_processed.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            tasks_delegated: self.tasks_delegated.load(Ordering::Relaxed),
            delegation_failures: self.delegation_failures.load(Ordering::Relaxed),
            queue_errors: self.queue_errors.load(Ordering::Relaxed),
            store_failures: self.store_failures.load(Ordering::Relaxed),
            last_event_at: (last > 0)
                .then(|| DateTime::<Utc>::from_timestamp_millis(last))
                .flatten(),
        }
    }
}

impl Default for LoopMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoopMetricsSnapshot {
    pub state: LoopState,
    pub ticks: u64,
    pub idle_ticks: u64,
    pub events_processed: u64,
    pub events_dropped: u64,
    pub tasks_delegated: u64,
    pub delegation_failures: u64,
    pub queue_errors: u64,
    pub store_failures: u64,
    pub last_event_at: Option<DateTime<Utc>>,
}
