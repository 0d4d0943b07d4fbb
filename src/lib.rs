//! Vigia - Multi-Agent Investigation Engine
//!
//! Investigates Brazilian public-sector transparency data (contracts,
//! waivers of bidding, expenses) by orchestrating a population of
//! specialized agents:
//! - Master orchestrator: query -> plan -> dispatch -> reflect -> adapt
//! - Parallel executor with bounded concurrency and execution strategies
//! - Priority task queue with worker pool, retries and callbacks
//! - Auto-investigation monitor with pre-screening and anomaly persistence

pub mod adapters;
pub mod agents;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export key types for convenience
pub use domain::models::{
    AgentMessage, AgentResponse, Anomaly, InvestigationContext, InvestigationPlan,
    InvestigationResult, Severity, TaskPriority,
};
pub use infrastructure::config::Config;
