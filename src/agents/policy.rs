//! Public-policy analysis specialist.

use async_trait::async_trait;
use serde_json::json;

use super::names;
use crate::domain::errors::DomainResult;
use crate::domain::models::{AgentMessage, AgentResponse, InvestigationContext};
use crate::domain::ports::Agent;

/// Policy dimensions reported per analysis.
const DIMENSIONS: &[(&str, &str)] = &[
    ("effectiveness", "efetividade do gasto frente aos objetivos declarados"),
    ("beneficiaries", "alcance e perfil dos beneficiários"),
    ("sustainability", "sustentabilidade fiscal do programa"),
];

pub struct PolicyAnalyst {
    capabilities: Vec<String>,
}

impl PolicyAnalyst {
    pub fn new() -> Self {
        Self {
            capabilities: vec!["analyze_policy".to_string()],
        }
    }
}

impl Default for PolicyAnalyst {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for PolicyAnalyst {
    fn name(&self) -> &str {
        names::POLICY_ANALYST
    }

    fn description(&self) -> &str {
        "Evaluates program effectiveness, impact and beneficiaries"
    }

    fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    async fn process(
        &self,
        message: &AgentMessage,
        _context: &InvestigationContext,
    ) -> DomainResult<AgentResponse> {
        let query = message
            .payload
            .get("query")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default();

        let findings: Vec<serde_json::Value> = DIMENSIONS
            .iter()
            .map(|(dimension, description)| {
                json!({
                    "finding_type": "policy_dimension",
                    "description": format!("Avaliação de {description} para: {query}"),
                    "indicators": [format!("policy_dimension:{dimension}")],
                })
            })
            .collect();

        Ok(AgentResponse::completed(
            self.name(),
            json!({
                "findings": findings,
                "sources": ["program_registry"],
            }),
        ))
    }
}
