use anyhow::{anyhow, Result};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LoggingConfig;

/// Installs the global subscriber. The returned guard flushes the file sink and
/// must be held for the life of the process.
pub fn setup_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_new(&config.level)
        .map_err(|e| anyhow!("Invalid log level {:?}: {}", config.level, e))?;

    let fmt_layer = if config.json_format {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_file(config.include_file_line)
            .with_line_number(config.include_file_line)
            .with_thread_ids(config.include_thread_id)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_timer(fmt::time::ChronoLocal::rfc_3339())
            .with_file(config.include_file_line)
            .with_line_number(config.include_file_line)
            .with_thread_ids(config.include_thread_id)
            .boxed()
    };

    let subscriber = tracing_subscriber::registry().with(filter).with(fmt_layer);

    let guard = if let Some(log_file) = &config.log_to_file {
        let file_appender = tracing_appender::rolling::daily("./logs", log_file);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let file_layer = fmt::layer()
            .json()
            .with_writer(non_blocking)
            .with_current_span(true);

        subscriber
            .with(file_layer)
            .try_init()
            .map_err(|e| anyhow!("Failed to install subscriber: {}", e))?;
        Some(guard)
    } else {
        subscriber
            .try_init()
            .map_err(|e| anyhow!("Failed to install subscriber: {}", e))?;
        None
    };

    info!(level = %config.level, json = config.json_format, "logging initialized");
    Ok(guard)
}
