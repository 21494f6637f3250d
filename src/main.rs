//! # ticktask — CLI host
//!
//! Embeds a [`TaskManager`] and drives it with the async ticker.
//!
//! Usage:
//!   ticktask run                          # Demo schedule, 100 ticks of 50ms
//!   ticktask run --ticks 40 --json        # Print the final registry as JSON
//!   ticktask split "a,,b" , --drop-empty  # Split a string
//!   ticktask path /home/user/file.txt     # Path components

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::sync::{Mutex, watch};
use tracing_subscriber::EnvFilter;

use ticktask_core::{TickTaskConfig, strings};
use ticktask_scheduler::{SystemClock, TaskManager, spawn_ticker};

#[derive(Parser)]
#[command(
    name = "ticktask",
    version,
    about = "⏱️ ticktask — cooperative interval task scheduler"
)]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "~/.ticktask/config.toml")]
    config: String,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the demonstration schedule
    Run {
        /// Number of ticks to drive before stopping
        #[arg(long, default_value = "100")]
        ticks: u32,

        /// Override the configured tick interval (ms)
        #[arg(long)]
        tick_ms: Option<u64>,

        /// Print the remaining tasks as JSON when done
        #[arg(long)]
        json: bool,
    },
    /// Split a string into fields
    Split {
        input: String,
        separator: String,

        /// Drop empty fields (separator must be a single character)
        #[arg(long)]
        drop_empty: bool,
    },
    /// Show directory, file name, stem and extension of a path
    Path { input: String },
}

fn load_config(path: &str) -> Result<TickTaskConfig> {
    let expanded = shellexpand::tilde(path).to_string();
    let path = Path::new(&expanded);
    if path.exists() {
        Ok(TickTaskConfig::load_from(path)?)
    } else {
        Ok(TickTaskConfig::default())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(&cli.config)?;

    let filter = if cli.verbose {
        "ticktask=debug,ticktask_scheduler=debug".to_string()
    } else {
        config.logging.level.clone()
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    match cli.command {
        Command::Run { ticks, tick_ms, json } => {
            if let Some(ms) = tick_ms {
                config.scheduler.tick_interval_ms = ms;
            }
            config.validate()?;
            run_demo(&config, ticks, json).await
        }
        Command::Split {
            input,
            separator,
            drop_empty,
        } => {
            let fields = if drop_empty {
                let mut chars = separator.chars();
                let (Some(ch), None) = (chars.next(), chars.next()) else {
                    anyhow::bail!("--drop-empty needs a single-character separator, got '{separator}'");
                };
                strings::split_string_fsm(&input, ch)
            } else {
                strings::split_string(&input, &separator)
            };
            for field in fields {
                println!("{field}");
            }
            Ok(())
        }
        Command::Path { input } => {
            println!("dir:       {}", strings::file_path(&input));
            println!("file:      {}", strings::file_name_ext(&input));
            println!("name:      {}", strings::file_name(&input));
            println!("extension: {}", strings::extension(&input));
            Ok(())
        }
    }
}

/// How long `run` drives the ticker; saturates instead of overflowing.
fn run_window(every: Duration, ticks: u32) -> Duration {
    every.saturating_mul(ticks)
}

async fn run_demo(config: &TickTaskConfig, ticks: u32, json: bool) -> Result<()> {
    let every = config.scheduler.tick_interval();
    let mut manager = TaskManager::with_config(&config.scheduler, SystemClock::shared());

    manager.schedule("one-shot", chrono::Duration::milliseconds(1000), |ctx| {
        tracing::info!("🔔 {} fired at {}", ctx.task().name(), ctx.now().to_rfc3339());
        Ok(())
    })?;
    for interval in [1000, 500, 30_000] {
        manager.schedule(
            format!("every-{interval}ms"),
            chrono::Duration::milliseconds(interval),
            |ctx| {
                tracing::info!("🔔 {} fired at {}", ctx.task().name(), ctx.now().to_rfc3339());
                ctx.restart();
                Ok(())
            },
        )?;
    }

    let manager = Arc::new(Mutex::new(manager));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let ticker = spawn_ticker(manager.clone(), every, shutdown_rx)?;

    tokio::select! {
        _ = tokio::time::sleep(run_window(every, ticks)) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("🛑 Interrupted");
        }
    }
    shutdown_tx.send(true).ok();
    ticker.await?;

    let manager = manager.lock().await;
    tracing::info!(
        "✅ {} ticks, {} task firings, {} task(s) still registered",
        manager.ticks(),
        manager.total_fired(),
        manager.len()
    );
    if json {
        println!("{}", serde_json::to_string_pretty(&manager.snapshot())?);
    }
    Ok(())
}
