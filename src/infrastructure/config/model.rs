//! Top-level configuration model.
//!
//! Component configs (executor, queue, scheduler, monitor, alerting) are
//! owned by their services; this model composes them into one tree the
//! loader can merge from files and environment.

use serde::{Deserialize, Serialize};

use crate::services::alerts::AlertingConfig;
use crate::services::monitor::MonitorConfig;
use crate::services::parallel::ExecutorConfig;
use crate::services::queue::QueueConfig;
use crate::services::scheduler::SchedulerConfig;

/// Rate limits for external collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitsConfig {
    /// Requests per minute against the transparency data provider.
    pub transparency_requests_per_minute: u32,
}

impl Default for RateLimitsConfig {
    fn default() -> Self {
        Self {
            transparency_requests_per_minute: 90,
        }
    }
}

/// Endpoints and credentials of external collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalConfig {
    pub transparency_base_url: String,
    pub transparency_api_key: Option<String>,
    pub dispensa_base_url: Option<String>,
    pub dispensa_auth_token: Option<String>,
    pub store_base_url: Option<String>,
    pub store_api_key: Option<String>,
}

impl Default for ExternalConfig {
    fn default() -> Self {
        Self {
            transparency_base_url: "https://api.portaldatransparencia.gov.br/api-de-dados"
                .to_string(),
            transparency_api_key: None,
            dispensa_base_url: None,
            dispensa_auth_token: None,
            store_base_url: None,
            store_api_key: None,
        }
    }
}

/// Local database used for durable queue state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    /// Whether queued tasks persist across restarts.
    pub persist_queue: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: ".vigia/vigia.db".to_string(),
            persist_queue: false,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// One of: trace, debug, info, warn, error.
    pub level: String,
    /// One of: json, pretty.
    pub format: String,
    /// Directory for daily-rolled log files; stderr-only when unset.
    pub directory: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            directory: None,
        }
    }
}

/// Full engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub executor: ExecutorConfig,
    pub queue: QueueConfig,
    pub scheduler: SchedulerConfig,
    pub monitor: MonitorConfig,
    pub alerting: AlertingConfig,
    pub rate_limits: RateLimitsConfig,
    pub external: ExternalConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}
