//! Tracing subscriber setup.

use anyhow::Result;
use tracing_appender::rolling;
use tracing_subscriber::{fmt, EnvFilter};

use crate::infrastructure::config::LoggingConfig;

/// Initialize the global tracing subscriber from configuration.
///
/// `RUST_LOG` overrides the configured level when set. When a log
/// directory is configured, output goes to a daily-rolled file there
/// instead of stderr. Safe to call once per process.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    let json = config.format == "json";

    let result = match (&config.directory, json) {
        (Some(dir), true) => fmt()
            .json()
            .with_writer(rolling::daily(dir, "vigia.log"))
            .with_env_filter(filter)
            .try_init(),
        (Some(dir), false) => fmt()
            .with_writer(rolling::daily(dir, "vigia.log"))
            .with_ansi(false)
            .with_env_filter(filter)
            .try_init(),
        (None, true) => fmt().json().with_env_filter(filter).try_init(),
        (None, false) => fmt().with_env_filter(filter).try_init(),
    };

    result.map_err(|e| anyhow::anyhow!("failed to init logging: {e}"))
}
