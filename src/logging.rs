// src/logging.rs
use crate::errors::{Result, TraderError};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const LOG_FILE_PREFIX: &str = "swing_trader.log";

/// Installs the global subscriber. `RUST_LOG` wins over `level`.
///
/// Keep the returned guard alive for the whole process, dropping it flushes
/// the file sink.
pub fn init(level: &str, directory: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| TraderError::Validation(format!("invalid log level '{}': {}", level, e)))?;

    let (file_layer, guard) = match directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .try_init()
        .map_err(|e| TraderError::Validation(format!("failed to set logger: {}", e)))?;

    Ok(guard)
}
