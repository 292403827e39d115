//! Logging setup for the command line
//!
//! Console output goes to stderr so stdout carries only command results.
//! When a log directory is configured, a daily-rolling `cfgship.log` is
//! written there as well.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

const LOG_FILE_NAME: &str = "cfgship.log";

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub log_dir: Option<PathBuf>,
}

/// Keeps the non-blocking file writer flushing until dropped
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

fn filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<LoggingGuard> {
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_filter(filter(&config.level));
    layers.push(Box::new(console_layer));

    let mut file_guard = None;
    if let Some(log_dir) = &config.log_dir {
        std::fs::create_dir_all(log_dir)?;

        let appender = RollingFileAppender::new(Rotation::DAILY, log_dir, LOG_FILE_NAME);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        file_guard = Some(guard);

        let file_layer = fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false)
            .with_filter(filter(&config.level));
        layers.push(Box::new(file_layer));
    }

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}
