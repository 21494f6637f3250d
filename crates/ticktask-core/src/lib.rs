//! # ticktask core
//!
//! Shared building blocks for the ticktask workspace:
//! - [`error`] — the crate-wide error type
//! - [`id`] — task identity
//! - [`config`] — TOML configuration (`~/.ticktask/config.toml`)
//! - [`strings`] — prefix/suffix tests, path components, splitting

pub mod config;
pub mod error;
pub mod id;
pub mod strings;

pub use config::{LoggingConfig, SchedulerConfig, TickTaskConfig};
pub use error::{Result, TickTaskError};
pub use id::TaskId;
