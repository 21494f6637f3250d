//! # ticktask scheduler
//!
//! Cooperative, polling-based interval task scheduler. The host owns a
//! [`TaskManager`] and calls [`TaskManager::on_work`] on its own cadence;
//! each call fires the tasks whose deadline has passed.
//!
//! ## Architecture
//! ```text
//! host loop (every N ms, or spawn_ticker)
//!   └── TaskManager::on_work()
//!         ├── Task "heartbeat"  every 1000ms  → ctx.restart()  → re-armed
//!         ├── Task "warmup"     after 500ms   → no restart     → retired
//!         └── Task "poller"     every 0ms     → ctx.restart()  → fires every tick
//! ```
//!
//! A task that does not call `restart()` from its callback is one-shot and
//! leaves the registry after it fires. Callback errors and panics are
//! reported in the [`TickReport`] and retire the failing task.

pub mod clock;
pub mod context;
pub mod manager;
pub mod report;
pub mod task;
pub mod ticker;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use context::TaskContext;
pub use manager::TaskManager;
pub use report::TickReport;
pub use task::{Task, TaskCallback, TaskSnapshot};
pub use ticker::spawn_ticker;
pub use ticktask_core::{TaskId, TickTaskError};
