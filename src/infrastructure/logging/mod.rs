//! Logging setup using tracing.
//!
//! Stdout in the configured format; when a log directory is set, a
//! daily-rolled JSON file is written through a non-blocking appender
//! whose guard must outlive the daemon.

use anyhow::{anyhow, Result};
use std::io;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::domain::models::LoggingConfig;

/// Holds the file appender guard so buffered lines flush on drop.
pub struct LogGuard {
    _guard: Option<WorkerGuard>,
}

/// Initialize the global subscriber from config. `RUST_LOG` overrides the
/// configured level.
pub fn init(config: &LoggingConfig) -> Result<LogGuard> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(
            config
                .level
                .parse()
                .map_err(|_| anyhow!("invalid log level: {}", config.level))?,
        )
        .from_env_lossy();

    let guard = if let Some(ref dir) = config.dir {
        let file_appender = rolling::daily(dir, "taskmill.log");
        let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

        let file_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(non_blocking_file)
            .with_ansi(false)
            .with_target(true);

        match config.format.as_str() {
            "json" => {
                let stdout_layer =
                    tracing_subscriber::fmt::layer().json().with_writer(io::stdout).with_target(true);
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(file_layer)
                    .with(stdout_layer)
                    .init();
            }
            _ => {
                let stdout_layer =
                    tracing_subscriber::fmt::layer().with_writer(io::stdout).with_target(true);
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(file_layer)
                    .with(stdout_layer)
                    .init();
            }
        }
        Some(guard)
    } else {
        match config.format.as_str() {
            "json" => {
                let stdout_layer =
                    tracing_subscriber::fmt::layer().json().with_writer(io::stdout).with_target(true);
                tracing_subscriber::registry().with(env_filter).with(stdout_layer).init();
            }
            _ => {
                let stdout_layer =
                    tracing_subscriber::fmt::layer().with_writer(io::stdout).with_target(true);
                tracing_subscriber::registry().with(env_filter).with(stdout_layer).init();
            }
        }
        None
    };

    Ok(LogGuard { _guard: guard })
}
