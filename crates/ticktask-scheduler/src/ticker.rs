//! Async host loop — drives `on_work` from a tokio interval.
//! The manager stays single-threaded: every tick takes the lock, runs one
//! full pass, and releases it before sleeping.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use ticktask_core::{Result, TickTaskError};

use crate::manager::TaskManager;

/// Spawn a background loop calling `on_work` every `every` until `shutdown`
/// turns true or its sender is dropped.
pub fn spawn_ticker(
    manager: Arc<Mutex<TaskManager>>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> Result<JoinHandle<()>> {
    if every.is_zero() {
        return Err(TickTaskError::InvalidArgument(
            "ticker period must be greater than 0".into(),
        ));
    }

    Ok(tokio::spawn(async move {
        tracing::info!("⏰ Ticker started (every {}ms)", every.as_millis());

        let mut interval = tokio::time::interval(every);
        // A slow tick delays the next one instead of bursting to catch up.
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    manager.lock().await.on_work();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("⏹️ Ticker stopped");
    }))
}
