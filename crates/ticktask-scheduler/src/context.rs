//! Handle passed to a task callback for the duration of one firing.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use ticktask_core::{Result, TaskId, TickTaskError};

use crate::clock::SharedClock;
use crate::task::Task;

/// What a running callback may do: inspect or restart its own task, and
/// register new tasks. New tasks are queued and join the registry after the
/// current tick, so they never fire in the tick that created them.
pub struct TaskContext<'a> {
    task: &'a Task,
    now: DateTime<Utc>,
    clock: &'a SharedClock,
    registered: &'a HashSet<TaskId>,
    /// Ids leaving the registry at the end of this tick.
    retiring: &'a HashSet<TaskId>,
    pending: &'a mut Vec<Task>,
}

impl<'a> TaskContext<'a> {
    pub(crate) fn new(
        task: &'a Task,
        now: DateTime<Utc>,
        clock: &'a SharedClock,
        registered: &'a HashSet<TaskId>,
        retiring: &'a HashSet<TaskId>,
        pending: &'a mut Vec<Task>,
    ) -> Self {
        Self {
            task,
            now,
            clock,
            registered,
            retiring,
            pending,
        }
    }

    /// The task being fired.
    pub fn task(&self) -> &Task {
        self.task
    }

    /// Timestamp of the tick that fired this task.
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Re-arm the running task; it stays registered after this tick.
    pub fn restart(&mut self) {
        self.task.restart();
    }

    /// Queue a task for registration after the current tick.
    ///
    /// A task retired earlier in this tick counts as unregistered and may be
    /// queued again.
    pub fn add(&mut self, task: Task) -> Result<TaskId> {
        let id = task.id();
        let live = self.registered.contains(&id) && !self.retiring.contains(&id);
        if live || self.pending.iter().any(|t| t.id() == id) {
            return Err(TickTaskError::AlreadyRegistered(id));
        }
        tracing::debug!("📥 Task '{}' queued by '{}'", task.name(), self.task.name());
        self.pending.push(task);
        Ok(id)
    }

    /// Build a task on the manager's clock and queue it.
    pub fn spawn<F>(&mut self, name: impl Into<String>, interval: Duration, callback: F) -> Result<Task>
    where
        F: FnMut(&mut TaskContext<'_>) -> anyhow::Result<()> + Send + 'static,
    {
        let task = Task::with_clock(self.clock.clone(), name, interval, callback)?;
        self.add(task.clone())?;
        Ok(task)
    }
}
