//! Agent capability contract.
//!
//! Polymorphism is by named capability, not by concrete type: the
//! orchestrator resolves agents through the registry and only assumes this
//! contract. Reflection is an optional capability discovered at
//! registration, never required.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::errors::DomainResult;
use crate::domain::models::{AgentMessage, AgentResponse, InvestigationContext};

/// Capability contract every specialist agent satisfies.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Unique agent name (the registry key plan steps address).
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// Named capabilities (actions) the agent accepts.
    fn capabilities(&self) -> &[String];

    /// One-time initialisation before the agent serves requests.
    async fn initialize(&self) -> DomainResult<()> {
        Ok(())
    }

    /// Release resources. Called once during shutdown.
    async fn shutdown(&self) -> DomainResult<()> {
        Ok(())
    }

    /// Process a message within an investigation context.
    ///
    /// Failures are reported in-band as responses with error status; an
    /// `Err` is reserved for infrastructure-level breakage.
    async fn process(
        &self,
        message: &AgentMessage,
        context: &InvestigationContext,
    ) -> DomainResult<AgentResponse>;
}

/// Quality assessment produced by a reflective agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reflection {
    /// Quality score in [0, 1].
    pub quality_score: f64,
    /// Detected issues.
    pub issues: Vec<String>,
    /// Suggested follow-ups.
    pub suggestions: Vec<String>,
    /// Supporting metrics.
    #[serde(default)]
    pub metrics: serde_json::Value,
}

/// Optional self-assessment capability.
#[async_trait]
pub trait Reflective: Send + Sync {
    /// Assess the completeness/quality of a result.
    async fn reflect(
        &self,
        result: &serde_json::Value,
        context: &InvestigationContext,
    ) -> DomainResult<Reflection>;
}
