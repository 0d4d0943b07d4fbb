//! Hierarchical configuration loading.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use super::model::Config;

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid max_concurrent: {0}. Must be between 1 and 100")]
    InvalidMaxConcurrent(usize),

    #[error("Invalid max_workers: {0}. Must be between 1 and 100")]
    InvalidMaxWorkers(usize),

    #[error("Invalid rate limit: {0}. Must be positive")]
    InvalidRateLimit(u32),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid value_threshold: {0}. Must be positive")]
    InvalidValueThreshold(f64),

    #[error(
        "Invalid time limits: task_soft_time_limit ({0}) must not exceed task_hard_time_limit ({1})"
    )]
    InvalidTimeLimits(u64, u64),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults
    /// 2. `.vigia/config.yaml` (project config)
    /// 3. `.vigia/local.yaml` (local overrides, optional)
    /// 4. Environment variables (`VIGIA_*` prefix, `__` nesting separator)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".vigia/config.yaml"))
            .merge(Yaml::file(".vigia/local.yaml"))
            .merge(Env::prefixed("VIGIA_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading.
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.executor.max_concurrent == 0 || config.executor.max_concurrent > 100 {
            return Err(ConfigError::InvalidMaxConcurrent(
                config.executor.max_concurrent,
            ));
        }

        if config.queue.max_workers == 0 || config.queue.max_workers > 100 {
            return Err(ConfigError::InvalidMaxWorkers(config.queue.max_workers));
        }

        if config.queue.task_soft_time_limit > config.queue.task_hard_time_limit {
            return Err(ConfigError::InvalidTimeLimits(
                config.queue.task_soft_time_limit,
                config.queue.task_hard_time_limit,
            ));
        }

        // Task payloads are JSON throughout the engine.
        if !config.queue.accept_content_types.iter().any(|t| t == "json") {
            return Err(ConfigError::ValidationFailed(
                "accept_content_types must include 'json'".to_string(),
            ));
        }

        if config.rate_limits.transparency_requests_per_minute == 0 {
            return Err(ConfigError::InvalidRateLimit(
                config.rate_limits.transparency_requests_per_minute,
            ));
        }

        if config.monitor.value_threshold <= 0.0 {
            return Err(ConfigError::InvalidValueThreshold(
                config.monitor.value_threshold,
            ));
        }

        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        for url in &config.alerting.webhook_urls {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::ValidationFailed(format!(
                    "webhook URL '{url}' must be http(s)"
                )));
            }
        }

        Ok(())
    }
}
