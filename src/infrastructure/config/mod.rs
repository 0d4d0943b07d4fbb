//! Configuration model and loader.

pub mod loader;
pub mod model;

pub use loader::{ConfigError, ConfigLoader};
pub use model::{Config, DatabaseConfig, ExternalConfig, LoggingConfig, RateLimitsConfig};
