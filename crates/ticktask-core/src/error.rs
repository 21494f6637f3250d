//! Error types shared by every ticktask crate.

use crate::id::TaskId;

/// Errors produced by ticktask.
#[derive(Debug, thiserror::Error)]
pub enum TickTaskError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Task already registered: {0}")]
    AlreadyRegistered(TaskId),

    #[error("Task not registered: {0}")]
    NotRegistered(TaskId),

    #[error("Task '{task}' failed: {message}")]
    TaskExecution { task: String, message: String },

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TickTaskError {
    /// True for failures raised by a task callback rather than by the scheduler.
    pub fn is_task_failure(&self) -> bool {
        matches!(self, TickTaskError::TaskExecution { .. })
    }
}

pub type Result<T> = std::result::Result<T, TickTaskError>;
