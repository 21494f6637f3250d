//! Outcome of one `on_work` call.

use chrono::{DateTime, Utc};
use ticktask_core::{TaskId, TickTaskError};

/// What happened during a single tick.
#[derive(Debug, Default)]
pub struct TickReport {
    /// 1-based tick number.
    pub tick: u64,
    /// Timestamp captured at the start of the tick.
    pub now: DateTime<Utc>,
    /// Tasks whose callback ran, in firing order.
    pub fired: Vec<TaskId>,
    /// Fired tasks that restarted and stay registered.
    pub rearmed: Vec<TaskId>,
    /// Fired tasks removed because they did not restart or failed.
    pub retired: Vec<TaskId>,
    /// Due tasks held back by the per-tick fire cap.
    pub deferred: Vec<TaskId>,
    /// Cancelled tasks dropped from the registry.
    pub cancelled: Vec<TaskId>,
    /// Tasks registered by callbacks during this tick.
    pub added: Vec<TaskId>,
    /// Callback failures, one per failed task.
    pub failures: Vec<(TaskId, TickTaskError)>,
}

impl TickReport {
    pub(crate) fn new(tick: u64, now: DateTime<Utc>) -> Self {
        Self {
            tick,
            now,
            ..Default::default()
        }
    }

    pub fn fired_count(&self) -> usize {
        self.fired.len()
    }

    /// True when nothing fired, was added or removed.
    pub fn is_idle(&self) -> bool {
        self.fired.is_empty()
            && self.cancelled.is_empty()
            && self.added.is_empty()
            && self.deferred.is_empty()
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}
