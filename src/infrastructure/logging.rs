//! Logging system configuration and initialization
//!
//! Console output is always on; file output (daily rotation via
//! tracing-appender) is enabled from configuration. RUST_LOG overrides the
//! configured level.

use anyhow::Result;
use lazy_static::lazy_static;
use std::sync::Mutex;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry,
};

use crate::infrastructure::config::LoggingConfig;

// Keep non-blocking writer guards alive for the lifetime of the process;
// dropping them silently stops file logging.
lazy_static! {
    static ref LOG_GUARDS: Mutex<Vec<tracing_appender::non_blocking::WorkerGuard>> =
        Mutex::new(Vec::new());
}

/// Initialize the logging system. Call once at process start.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let console_layer = fmt::layer().with_target(true);

    if config.file_output {
        let appender = tracing_appender::rolling::daily(&config.log_dir, "batch-worker.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        LOG_GUARDS.lock().unwrap().push(guard);

        let file_layer = fmt::layer().with_writer(writer).with_ansi(false);

        Registry::default()
            .with(filter)
            .with(console_layer)
            .with(file_layer)
            .init();
    } else {
        Registry::default()
            .with(filter)
            .with(console_layer)
            .init();
    }

    Ok(())
}
