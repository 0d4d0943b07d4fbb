//! Specialist agents behind the [`Agent`](crate::domain::ports::Agent) port.
//!
//! Each specialist is a thin, deterministic analyst: the engine invokes
//! them through the capability contract, and plan steps address them by
//! the names in [`names`].

pub mod aggregator;
pub mod detector;
pub mod patterns;
pub mod policy;
pub mod regional;
pub mod reporter;

pub use aggregator::DataAggregator;
pub use detector::AnomalyDetector;
pub use patterns::PatternAnalyst;
pub use policy::PolicyAnalyst;
pub use regional::RegionalAnalyst;
pub use reporter::Reporter;

/// Registry names of the built-in specialists.
pub mod names {
    pub const ANOMALY_DETECTOR: &str = "anomaly_detector";
    pub const PATTERN_ANALYST: &str = "pattern_analyst";
    pub const REGIONAL_ANALYST: &str = "regional_analyst";
    pub const POLICY_ANALYST: &str = "policy_analyst";
    pub const DATA_AGGREGATOR: &str = "data_aggregator";
    pub const REPORTER: &str = "reporter";
}

use std::sync::Arc;

use crate::services::registry::AgentRegistry;

/// Register every built-in specialist on the registry.
pub async fn register_builtin_agents(registry: &AgentRegistry, detector: AnomalyDetector) {
    registry.register(Arc::new(detector)).await;
    registry.register(Arc::new(PatternAnalyst::new())).await;
    registry.register(Arc::new(RegionalAnalyst::new())).await;
    registry.register(Arc::new(PolicyAnalyst::new())).await;
    registry.register(Arc::new(DataAggregator::new())).await;
    registry.register(Arc::new(Reporter::new())).await;
}
