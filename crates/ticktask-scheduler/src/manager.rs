//! TaskManager — the registry of scheduled tasks and the `on_work` tick.
//!
//! The host owns a manager and calls [`TaskManager::on_work`] at its own
//! cadence. Each tick runs in three phases:
//!
//! ```text
//! on_work(now)
//!   ├── drop tasks cancelled since the last tick
//!   ├── snapshot due tasks, ordered by (deadline, registration order)
//!   │     └── beyond max_fires_per_tick → deferred to a later tick
//!   ├── fire each snapshot entry (callback failures and panics contained)
//!   │     ├── restarted   → stays registered
//!   │     └── otherwise   → retired
//!   └── apply removals, then merge tasks queued by callbacks
//! ```
//!
//! Callbacks never see the live registry, only a [`TaskContext`], so a
//! callback can neither invalidate the snapshot nor make a new task fire
//! in the tick that created it.

use std::any::Any;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};

use chrono::{DateTime, Duration, Utc};
use ticktask_core::{Result, SchedulerConfig, TaskId, TickTaskError};

use crate::clock::{SharedClock, SystemClock};
use crate::context::TaskContext;
use crate::report::TickReport;
use crate::task::{Task, TaskSnapshot};

/// Registry of tasks driven by an external tick.
pub struct TaskManager {
    clock: SharedClock,
    /// Registration order; the index doubles as the tie-break sequence.
    tasks: Vec<Task>,
    registered: HashSet<TaskId>,
    fire_cap: Option<usize>,
    ticks: u64,
    total_fired: u64,
}

impl TaskManager {
    /// Create a manager on the system clock with no fire cap.
    pub fn new() -> Self {
        Self::with_clock(SystemClock::shared())
    }

    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            clock,
            tasks: Vec::new(),
            registered: HashSet::new(),
            fire_cap: None,
            ticks: 0,
            total_fired: 0,
        }
    }

    pub fn with_config(config: &SchedulerConfig, clock: SharedClock) -> Self {
        let mut manager = Self::with_clock(clock);
        manager.fire_cap = config.fire_cap();
        manager
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// Limit how many due tasks fire per tick. `None` removes the limit.
    pub fn set_fire_cap(&mut self, cap: Option<usize>) {
        self.fire_cap = cap.filter(|c| *c > 0);
    }

    pub fn fire_cap(&self) -> Option<usize> {
        self.fire_cap
    }

    /// Build a task on this manager's clock without registering it.
    pub fn task<F>(&self, name: impl Into<String>, interval: Duration, callback: F) -> Result<Task>
    where
        F: FnMut(&mut TaskContext<'_>) -> anyhow::Result<()> + Send + 'static,
    {
        Task::with_clock(self.clock.clone(), name, interval, callback)
    }

    /// Build a task on this manager's clock and register it.
    pub fn schedule<F>(&mut self, name: impl Into<String>, interval: Duration, callback: F) -> Result<Task>
    where
        F: FnMut(&mut TaskContext<'_>) -> anyhow::Result<()> + Send + 'static,
    {
        let task = self.task(name, interval, callback)?;
        self.add(task.clone())?;
        Ok(task)
    }

    /// Register a task. It becomes eligible from the next `on_work` call.
    pub fn add(&mut self, task: Task) -> Result<TaskId> {
        let id = task.id();
        if !self.registered.insert(id) {
            return Err(TickTaskError::AlreadyRegistered(id));
        }
        tracing::info!(
            "📅 Task added: '{}' ({}) every {}ms",
            task.name(),
            id,
            task.interval().num_milliseconds()
        );
        self.tasks.push(task);
        Ok(id)
    }

    /// Unregister a task, returning the handle.
    pub fn remove(&mut self, id: TaskId) -> Result<Task> {
        let pos = self
            .tasks
            .iter()
            .position(|t| t.id() == id)
            .ok_or(TickTaskError::NotRegistered(id))?;
        self.registered.remove(&id);
        let task = self.tasks.remove(pos);
        tracing::info!("🗑️ Task removed: '{}' ({})", task.name(), id);
        Ok(task)
    }

    /// Re-arm a registered task from outside its callback.
    pub fn restart(&self, id: TaskId) -> Result<()> {
        let task = self.get(id).ok_or(TickTaskError::NotRegistered(id))?;
        task.restart();
        Ok(())
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.registered.contains(&id)
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id() == id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// All registered tasks in registration order.
    pub fn snapshot(&self) -> Vec<TaskSnapshot> {
        self.tasks.iter().map(Task::snapshot).collect()
    }

    /// Number of `on_work` calls so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Callbacks invoked over the manager's lifetime.
    pub fn total_fired(&self) -> u64 {
        self.total_fired
    }

    /// One scheduling step: fire due tasks and reconcile the registry.
    pub fn on_work(&mut self) -> TickReport {
        let now = self.clock.now();
        self.ticks += 1;
        let mut report = TickReport::new(self.ticks, now);

        self.drop_cancelled(&mut report);

        let mut due = self.due_snapshot(now);
        if let Some(cap) = self.fire_cap.filter(|cap| due.len() > *cap) {
            report.deferred = due.split_off(cap).iter().map(Task::id).collect();
            tracing::debug!(
                "⏳ Tick {}: {} due task(s) deferred by fire cap {}",
                self.ticks,
                report.deferred.len(),
                cap
            );
        }

        let mut pending = Vec::new();
        let mut retire = HashSet::new();

        for task in due {
            let id = task.id();
            // Cancelled by a callback that ran earlier in this tick.
            if task.is_cancelled() {
                report.cancelled.push(id);
                retire.insert(id);
                continue;
            }

            let generation = task.generation();
            let outcome = {
                let mut ctx = TaskContext::new(
                    &task,
                    now,
                    &self.clock,
                    &self.registered,
                    &retire,
                    &mut pending,
                );
                panic::catch_unwind(AssertUnwindSafe(|| task.run(&mut ctx)))
            };
            self.total_fired += 1;
            report.fired.push(id);
            tracing::debug!("🔔 Task fired: '{}' ({})", task.name(), id);

            let failure = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(format!("{e:#}")),
                Err(payload) => Some(panic_message(payload.as_ref())),
            };

            match failure {
                Some(message) => {
                    tracing::warn!("⚠️ Task '{}' failed: {}", task.name(), message);
                    report.failures.push((
                        id,
                        TickTaskError::TaskExecution {
                            task: task.name().to_string(),
                            message,
                        },
                    ));
                    report.retired.push(id);
                    retire.insert(id);
                }
                None if task.generation() != generation && !task.is_cancelled() => {
                    report.rearmed.push(id);
                }
                None => {
                    report.retired.push(id);
                    retire.insert(id);
                }
            }
        }

        if !retire.is_empty() {
            self.tasks.retain(|t| !retire.contains(&t.id()));
            for id in &retire {
                self.registered.remove(id);
            }
        }

        for task in pending {
            let id = task.id();
            if self.registered.insert(id) {
                tracing::info!("📅 Task added: '{}' ({}) from callback", task.name(), id);
                report.added.push(id);
                self.tasks.push(task);
            }
        }

        if !report.is_idle() {
            tracing::debug!(
                "🕐 Tick {}: fired {}, rearmed {}, retired {}, failed {}, {} registered",
                report.tick,
                report.fired.len(),
                report.rearmed.len(),
                report.retired.len(),
                report.failures.len(),
                self.tasks.len()
            );
        }

        report
    }

    fn drop_cancelled(&mut self, report: &mut TickReport) {
        if !self.tasks.iter().any(Task::is_cancelled) {
            return;
        }
        let (cancelled, kept): (Vec<Task>, Vec<Task>) =
            std::mem::take(&mut self.tasks).into_iter().partition(Task::is_cancelled);
        self.tasks = kept;
        for task in cancelled {
            let id = task.id();
            self.registered.remove(&id);
            tracing::info!("🚫 Task cancelled: '{}' ({})", task.name(), id);
            report.cancelled.push(id);
        }
    }

    /// Due tasks, earliest deadline first, ties in registration order.
    fn due_snapshot(&self, now: DateTime<Utc>) -> Vec<Task> {
        let mut due: Vec<(DateTime<Utc>, usize, Task)> = self
            .tasks
            .iter()
            .enumerate()
            .filter(|(_, t)| t.is_due(now))
            .map(|(seq, t)| (t.next_deadline(), seq, t.clone()))
            .collect();
        due.sort_by_key(|(deadline, seq, _)| (*deadline, *seq));
        due.into_iter().map(|(_, _, t)| t).collect()
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    fn at(ms: i64) -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH + Duration::milliseconds(ms)
    }

    fn ms(n: i64) -> Duration {
        Duration::milliseconds(n)
    }

    fn setup() -> (ManualClock, TaskManager) {
        let clock = ManualClock::at_epoch();
        let manager = TaskManager::with_clock(clock.shared());
        (clock, manager)
    }

    fn counter() -> Arc<AtomicU32> {
        Arc::new(AtomicU32::new(0))
    }

    #[test]
    fn test_restarting_task_rearms() {
        let (clock, mut manager) = setup();
        let hits = counter();
        let h = hits.clone();
        let task = manager
            .schedule("every-second", ms(1000), move |ctx| {
                h.fetch_add(1, Ordering::SeqCst);
                ctx.restart();
                Ok(())
            })
            .unwrap();

        clock.set(at(500));
        assert!(manager.on_work().fired.is_empty());

        clock.set(at(1000));
        let report = manager.on_work();
        assert_eq!(report.fired, vec![task.id()]);
        assert_eq!(report.rearmed, vec![task.id()]);
        assert!(manager.contains(task.id()));
        assert_eq!(task.next_deadline(), at(2000));

        clock.set(at(1500));
        assert!(manager.on_work().fired.is_empty());

        clock.set(at(2000));
        assert_eq!(manager.on_work().fired_count(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(task.fire_count(), 2);
    }

    #[test]
    fn test_late_tick_rearms_from_fire_time() {
        let (clock, mut manager) = setup();
        let task = manager
            .schedule("drift", ms(1000), |ctx| {
                ctx.restart();
                Ok(())
            })
            .unwrap();

        clock.set(at(1040));
        manager.on_work();
        assert_eq!(task.next_deadline(), at(2040));
        assert_eq!(task.last_fired(), Some(at(1040)));
    }

    #[test]
    fn test_one_shot_task_retired() {
        let (clock, mut manager) = setup();
        let hits = counter();
        let h = hits.clone();
        let task = manager
            .schedule("once", ms(500), move |_| {
                h.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();

        clock.set(at(500));
        let report = manager.on_work();
        assert_eq!(report.retired, vec![task.id()]);
        assert!(!manager.contains(task.id()));
        assert!(manager.is_empty());

        for _ in 0..5 {
            clock.advance_millis(500);
            manager.on_work();
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_duplicate_add_rejected() {
        let (clock, mut manager) = setup();
        let hits = counter();
        let h = hits.clone();
        let task = manager
            .task("dup", ms(100), move |_| {
                h.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();

        manager.add(task.clone()).unwrap();
        let err = manager.add(task.clone()).unwrap_err();
        assert!(matches!(err, TickTaskError::AlreadyRegistered(id) if id == task.id()));
        assert_eq!(manager.len(), 1);

        clock.set(at(100));
        assert_eq!(manager.on_work().fired_count(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_task_added_in_callback_waits_for_next_tick() {
        let (clock, mut manager) = setup();
        let child_hits = counter();
        let c = child_hits.clone();
        let parent = manager
            .schedule("parent", ms(100), move |ctx| {
                let c = c.clone();
                // Zero interval: already due when queued.
                ctx.spawn("child", Duration::zero(), move |_| {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })?;
                Ok(())
            })
            .unwrap();

        clock.set(at(100));
        let report = manager.on_work();
        assert_eq!(report.fired, vec![parent.id()]);
        assert_eq!(report.added.len(), 1);
        assert_eq!(child_hits.load(Ordering::SeqCst), 0);
        assert!(!manager.contains(parent.id()));
        assert_eq!(manager.len(), 1);

        let child_ids = report.added.clone();

        let report = manager.on_work();
        assert_eq!(report.fired, child_ids);
        assert_eq!(child_hits.load(Ordering::SeqCst), 1);
        assert!(manager.is_empty());
    }

    #[test]
    fn test_callback_cannot_add_registered_task() {
        let (clock, mut manager) = setup();
        let other = manager.schedule("other", ms(10_000), |_| Ok(())).unwrap();
        let seen = Arc::new(Mutex::new(None));
        let s = seen.clone();
        let o = other.clone();
        manager
            .schedule("adder", ms(10), move |ctx| {
                *s.lock().unwrap() = Some(ctx.add(o.clone()).is_err());
                Ok(())
            })
            .unwrap();

        clock.set(at(10));
        manager.on_work();
        assert_eq!(*seen.lock().unwrap(), Some(true));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_callback_can_readd_task_retired_this_tick() {
        let (clock, mut manager) = setup();
        let hits = counter();
        let h = hits.clone();
        let once = manager
            .schedule("once", ms(100), move |_| {
                h.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        let readded = Arc::new(Mutex::new(None));
        let r = readded.clone();
        let target = once.clone();
        manager
            .schedule("readder", ms(200), move |ctx| {
                *r.lock().unwrap() = Some(ctx.add(target.clone()).is_ok());
                Ok(())
            })
            .unwrap();

        clock.set(at(300));
        let report = manager.on_work();
        assert_eq!(*readded.lock().unwrap(), Some(true));
        assert!(report.retired.contains(&once.id()));
        assert_eq!(report.added, vec![once.id()]);
        assert!(manager.contains(once.id()));
        assert_eq!(manager.len(), 1);

        // Deadline is unchanged (100ms), so it fires again on the next tick.
        manager.on_work();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert!(manager.is_empty());
    }

    #[test]
    fn test_zero_interval_fires_every_tick() {
        let (clock, mut manager) = setup();
        let hits = counter();
        let h = hits.clone();
        let task = manager
            .schedule("busy", Duration::zero(), move |ctx| {
                h.fetch_add(1, Ordering::SeqCst);
                ctx.restart();
                Ok(())
            })
            .unwrap();

        for _ in 0..10 {
            manager.on_work();
            clock.advance_millis(10);
        }
        assert_eq!(hits.load(Ordering::SeqCst), 10);
        assert!(manager.contains(task.id()));
    }

    #[test]
    fn test_failures_are_contained() {
        let (clock, mut manager) = setup();
        let hits = counter();

        let erroring = manager
            .schedule("erroring", ms(100), |ctx| {
                ctx.restart();
                anyhow::bail!("disk full")
            })
            .unwrap();
        let panicking = manager
            .schedule("panicking", ms(100), |_| panic!("kaboom"))
            .unwrap();
        let h = hits.clone();
        let healthy = manager
            .schedule("healthy", ms(100), move |ctx| {
                h.fetch_add(1, Ordering::SeqCst);
                ctx.restart();
                Ok(())
            })
            .unwrap();

        clock.set(at(100));
        let report = manager.on_work();
        assert_eq!(report.fired, vec![erroring.id(), panicking.id(), healthy.id()]);
        assert_eq!(report.failures.len(), 2);
        assert!(report.failures.iter().all(|(_, e)| e.is_task_failure()));
        assert!(report.failures[0].1.to_string().contains("disk full"));
        assert!(report.failures[1].1.to_string().contains("kaboom"));
        assert_eq!(report.retired, vec![erroring.id(), panicking.id()]);
        assert_eq!(report.rearmed, vec![healthy.id()]);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(manager.len(), 1);
        assert!(manager.contains(healthy.id()));
    }

    #[test]
    fn test_firing_order_by_deadline_then_registration() {
        let (clock, mut manager) = setup();
        let order = Arc::new(Mutex::new(Vec::new()));
        for (name, interval) in [("late", 300), ("tie-a", 200), ("early", 100), ("tie-b", 200)] {
            let o = order.clone();
            manager
                .schedule(name, ms(interval), move |ctx| {
                    o.lock().unwrap().push(ctx.task().name().to_string());
                    Ok(())
                })
                .unwrap();
        }

        clock.set(at(1000));
        manager.on_work();
        assert_eq!(*order.lock().unwrap(), vec!["early", "tie-a", "tie-b", "late"]);
    }

    #[test]
    fn test_fire_cap_defers_remaining() {
        let (clock, mut manager) = setup();
        manager.set_fire_cap(Some(2));
        let ids: Vec<TaskId> = (0..5)
            .map(|i| manager.schedule(format!("t{i}"), ms(10 * (i + 1)), |_| Ok(())).unwrap().id())
            .collect();

        clock.set(at(1000));
        let report = manager.on_work();
        assert_eq!(report.fired, ids[..2].to_vec());
        assert_eq!(report.deferred, ids[2..].to_vec());
        assert_eq!(manager.len(), 3);

        let report = manager.on_work();
        assert_eq!(report.fired, ids[2..4].to_vec());
        let report = manager.on_work();
        assert_eq!(report.fired, ids[4..].to_vec());
        assert!(report.deferred.is_empty());
        assert!(manager.is_empty());
    }

    #[test]
    fn test_with_config_applies_fire_cap() {
        let clock = ManualClock::at_epoch();
        let config = SchedulerConfig {
            tick_interval_ms: 10,
            max_fires_per_tick: 4,
        };
        let manager = TaskManager::with_config(&config, clock.shared());
        assert_eq!(manager.fire_cap(), Some(4));
    }

    #[test]
    fn test_cancel_from_host() {
        let (clock, mut manager) = setup();
        let hits = counter();
        let h = hits.clone();
        let task = manager
            .schedule("cancel-me", ms(100), move |ctx| {
                h.fetch_add(1, Ordering::SeqCst);
                ctx.restart();
                Ok(())
            })
            .unwrap();

        task.cancel();
        clock.set(at(100));
        let report = manager.on_work();
        assert_eq!(report.cancelled, vec![task.id()]);
        assert!(report.fired.is_empty());
        assert!(!manager.contains(task.id()));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_cancel_by_earlier_callback_in_same_tick() {
        let (clock, mut manager) = setup();
        let victim_hits = counter();
        let v = victim_hits.clone();
        let victim = manager
            .task("victim", ms(200), move |_| {
                v.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        let target = victim.clone();
        manager
            .schedule("killer", ms(100), move |_| {
                target.cancel();
                Ok(())
            })
            .unwrap();
        manager.add(victim.clone()).unwrap();

        clock.set(at(300));
        let report = manager.on_work();
        assert_eq!(report.fired.len(), 1);
        assert_eq!(report.cancelled, vec![victim.id()]);
        assert_eq!(victim_hits.load(Ordering::SeqCst), 0);
        assert!(manager.is_empty());
    }

    #[test]
    fn test_self_cancel_after_restart_retires() {
        let (clock, mut manager) = setup();
        let task = manager
            .schedule("quitter", ms(100), |ctx| {
                ctx.restart();
                ctx.task().cancel();
                Ok(())
            })
            .unwrap();

        clock.set(at(100));
        let report = manager.on_work();
        assert_eq!(report.retired, vec![task.id()]);
        assert!(manager.is_empty());
    }

    #[test]
    fn test_remove_and_restart_by_id() {
        let (clock, mut manager) = setup();
        let task = manager.schedule("t", ms(1000), |_| Ok(())).unwrap();

        clock.set(at(800));
        manager.restart(task.id()).unwrap();
        assert_eq!(task.next_deadline(), at(1800));

        clock.set(at(1000));
        assert!(manager.on_work().fired.is_empty());

        let removed = manager.remove(task.id()).unwrap();
        assert_eq!(removed, task);
        assert!(matches!(
            manager.remove(task.id()),
            Err(TickTaskError::NotRegistered(_))
        ));
        assert!(matches!(
            manager.restart(task.id()),
            Err(TickTaskError::NotRegistered(_))
        ));
    }

    #[test]
    fn test_snapshot_in_registration_order() {
        let (_clock, mut manager) = setup();
        manager.schedule("b", ms(200), |_| Ok(())).unwrap();
        manager.schedule("a", ms(100), |_| Ok(())).unwrap();
        let names: Vec<String> = manager.snapshot().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn test_demo_schedule_over_100_ticks() {
        let (clock, mut manager) = setup();
        let counts: Vec<Arc<AtomicU32>> = (0..4).map(|_| counter()).collect();

        let c = counts[0].clone();
        let one_shot = manager
            .schedule("one-shot", ms(1000), move |_| {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        for (i, interval) in [(1, 1000), (2, 500), (3, 30_000)] {
            let c = counts[i].clone();
            manager
                .schedule(format!("recurring-{interval}"), ms(interval), move |ctx| {
                    c.fetch_add(1, Ordering::SeqCst);
                    ctx.restart();
                    Ok(())
                })
                .unwrap();
        }

        for _ in 0..100 {
            manager.on_work();
            clock.advance_millis(50);
        }

        let fired: Vec<u32> = counts.iter().map(|c| c.load(Ordering::SeqCst)).collect();
        assert_eq!(fired, vec![1, 4, 9, 0]);
        assert!(!manager.contains(one_shot.id()));
        assert_eq!(manager.len(), 3);
        assert_eq!(manager.ticks(), 100);
        assert_eq!(manager.total_fired(), 14);
    }
}
