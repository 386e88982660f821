//! Tracing subscriber setup
//!
//! Installs a global subscriber writing to the console or to a log file. File
//! output goes through a non-blocking writer whose [`WorkerGuard`] must be kept
//! alive for as long as logs should be flushed.

use anyhow::{Context, Result};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{LogFileConfig, LogFormat, LogRotation, LoggingConfig};

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Logs go to the
/// console unless a file section is configured. Fails when a global subscriber
/// is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let subscriber = tracing_subscriber::registry().with(env_filter);

    match config.file {
        None => {
            init_console_logging(subscriber, config.format)?;
            Ok(None)
        }
        Some(ref file) => {
            let (writer, guard) = create_file_writer(file)?;
            init_file_logging(subscriber, config.format, writer)?;
            Ok(Some(guard))
        }
    }
}

/// Create a non-blocking rolling file writer
fn create_file_writer(config: &LogFileConfig) -> Result<(NonBlocking, WorkerGuard)> {
    std::fs::create_dir_all(&config.dir)
        .with_context(|| format!("Failed to create log directory {:?}", config.dir))?;

    let rotation = match config.rotation {
        LogRotation::Daily => Rotation::DAILY,
        LogRotation::Hourly => Rotation::HOURLY,
        LogRotation::Never => Rotation::NEVER,
    };

    let appender = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(&config.prefix)
        .filename_suffix("log")
        .build(&config.dir)
        .context("Failed to create log file appender")?;

    Ok(tracing_appender::non_blocking(appender))
}

fn init_console_logging<S>(subscriber: S, format: LogFormat) -> Result<()>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a> + Send + Sync,
{
    match format {
        LogFormat::Json => subscriber
            .with(fmt::layer().json().with_target(true))
            .try_init(),
        LogFormat::Compact => subscriber
            .with(fmt::layer().compact().with_target(false))
            .try_init(),
        LogFormat::Pretty => subscriber
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .try_init(),
    }
    .context("Failed to install tracing subscriber")
}

fn init_file_logging<S>(subscriber: S, format: LogFormat, writer: NonBlocking) -> Result<()>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a> + Send + Sync,
{
    // No colour codes in files
    match format {
        LogFormat::Json => subscriber
            .with(fmt::layer().json().with_target(true).with_writer(writer))
            .try_init(),
        LogFormat::Compact => subscriber
            .with(
                fmt::layer()
                    .compact()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(writer),
            )
            .try_init(),
        LogFormat::Pretty => subscriber
            .with(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(true)
                    .with_writer(writer),
            )
            .try_init(),
    }
    .context("Failed to install tracing subscriber")
}
