//! Task — a single recurring or one-shot timed callback.
//!
//! A [`Task`] is a shared handle: cloning it yields another handle to the
//! same task (same [`TaskId`]). The host may keep a clone to inspect,
//! restart or cancel a task that the manager also holds.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use ticktask_core::{Result, TaskId, TickTaskError};

use crate::clock::{SharedClock, SystemClock};
use crate::context::TaskContext;

/// Callback invoked when a task fires.
pub type TaskCallback = Box<dyn FnMut(&mut TaskContext<'_>) -> anyhow::Result<()> + Send>;

/// Mutable scheduling state, guarded separately from the callback so a
/// running callback can restart its own task.
#[derive(Debug)]
struct TaskState {
    next_deadline: DateTime<Utc>,
    /// Bumped on every restart; lets the manager see a re-arm even when the
    /// new deadline equals the old one (interval 0).
    generation: u64,
    fire_count: u64,
    last_fired: Option<DateTime<Utc>>,
    cancelled: bool,
}

struct TaskInner {
    id: TaskId,
    name: String,
    interval: Duration,
    clock: SharedClock,
    state: Mutex<TaskState>,
    callback: Mutex<TaskCallback>,
}

/// A schedulable unit of work.
#[derive(Clone)]
pub struct Task {
    inner: Arc<TaskInner>,
}

impl Task {
    /// Create a task on the system clock.
    pub fn new<F>(name: impl Into<String>, interval: Duration, callback: F) -> Result<Self>
    where
        F: FnMut(&mut TaskContext<'_>) -> anyhow::Result<()> + Send + 'static,
    {
        Self::with_clock(SystemClock::shared(), name, interval, callback)
    }

    /// Create a task whose deadlines are measured on `clock`.
    ///
    /// Fails with `InvalidArgument` for a negative interval. The first
    /// deadline is `clock.now() + interval`.
    pub fn with_clock<F>(
        clock: SharedClock,
        name: impl Into<String>,
        interval: Duration,
        callback: F,
    ) -> Result<Self>
    where
        F: FnMut(&mut TaskContext<'_>) -> anyhow::Result<()> + Send + 'static,
    {
        let name = name.into();
        if interval < Duration::zero() {
            return Err(TickTaskError::InvalidArgument(format!(
                "task '{name}' has negative interval {}ms",
                interval.num_milliseconds()
            )));
        }
        let next_deadline = clock.now().checked_add_signed(interval).ok_or_else(|| {
            TickTaskError::InvalidArgument(format!(
                "task '{name}' interval {}ms puts its deadline out of range",
                interval.num_milliseconds()
            ))
        })?;
        Ok(Self {
            inner: Arc::new(TaskInner {
                id: TaskId::new(),
                name,
                interval,
                clock,
                state: Mutex::new(TaskState {
                    next_deadline,
                    generation: 0,
                    fire_count: 0,
                    last_fired: None,
                    cancelled: false,
                }),
                callback: Mutex::new(Box::new(callback)),
            }),
        })
    }

    /// Create a task from a `std::time::Duration` interval.
    pub fn every<F>(name: impl Into<String>, interval: std::time::Duration, callback: F) -> Result<Self>
    where
        F: FnMut(&mut TaskContext<'_>) -> anyhow::Result<()> + Send + 'static,
    {
        let interval = Duration::from_std(interval)
            .map_err(|e| TickTaskError::InvalidArgument(format!("interval out of range: {e}")))?;
        Self::new(name, interval, callback)
    }

    pub fn id(&self) -> TaskId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    pub fn next_deadline(&self) -> DateTime<Utc> {
        self.state().next_deadline
    }

    /// How many times the callback has been invoked.
    pub fn fire_count(&self) -> u64 {
        self.state().fire_count
    }

    pub fn last_fired(&self) -> Option<DateTime<Utc>> {
        self.state().last_fired
    }

    pub fn is_cancelled(&self) -> bool {
        self.state().cancelled
    }

    /// Re-arm: `next_deadline = now + interval`, using the time of this call.
    pub fn restart(&self) {
        let now = self.inner.clock.now();
        let mut state = self.state();
        // Saturates; the constructor already rejects intervals that overflow.
        state.next_deadline = now
            .checked_add_signed(self.inner.interval)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        state.generation += 1;
        tracing::trace!(
            "🔁 Task '{}' re-armed, next deadline {}",
            self.inner.name,
            state.next_deadline
        );
    }

    /// Mark the task cancelled. The manager drops it on its next tick and a
    /// cancelled task never fires again, even if it restarts.
    pub fn cancel(&self) {
        self.state().cancelled = true;
    }

    /// True iff `now >= next_deadline`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.state().next_deadline
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        let state = self.state();
        TaskSnapshot {
            id: self.inner.id,
            name: self.inner.name.clone(),
            interval_ms: self.inner.interval.num_milliseconds(),
            next_deadline: state.next_deadline,
            fire_count: state.fire_count,
            last_fired: state.last_fired,
            cancelled: state.cancelled,
        }
    }

    pub(crate) fn generation(&self) -> u64 {
        self.state().generation
    }

    /// Invoke the callback. The state lock is released before the call so the
    /// callback may restart or cancel this task.
    pub(crate) fn run(&self, ctx: &mut TaskContext<'_>) -> anyhow::Result<()> {
        {
            let mut state = self.state();
            state.fire_count += 1;
            state.last_fired = Some(ctx.now());
        }
        let mut guard = self
            .inner
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let callback = &mut *guard;
        callback(ctx)
    }

    fn state(&self) -> MutexGuard<'_, TaskState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Task {}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("Task")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("interval_ms", &self.inner.interval.num_milliseconds())
            .field("next_deadline", &state.next_deadline)
            .field("fire_count", &state.fire_count)
            .field("cancelled", &state.cancelled)
            .finish()
    }
}

/// Point-in-time view of a task, for listing and JSON output.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub name: String,
    pub interval_ms: i64,
    pub next_deadline: DateTime<Utc>,
    pub fire_count: u64,
    pub last_fired: Option<DateTime<Utc>>,
    pub cancelled: bool,
}
