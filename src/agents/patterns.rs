//! Pattern analysis specialist.
//!
//! Looks for repetition across findings handed over by upstream steps:
//! recurring suppliers, recurring indicator kinds, and clusters of
//! high-score findings.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::json;

use super::names;
use crate::domain::errors::DomainResult;
use crate::domain::models::{AgentMessage, AgentResponse, InvestigationContext};
use crate::domain::ports::Agent;

pub struct PatternAnalyst {
    capabilities: Vec<String>,
}

impl PatternAnalyst {
    pub fn new() -> Self {
        Self {
            capabilities: vec!["analyze_patterns".to_string()],
        }
    }

    /// Count indicator occurrences across upstream findings.
    fn indicator_frequencies(findings: &[serde_json::Value]) -> HashMap<String, usize> {
        let mut frequencies: HashMap<String, usize> = HashMap::new();
        for finding in findings {
            if let Some(indicators) = finding.get("indicators").and_then(serde_json::Value::as_array)
            {
                for indicator in indicators.iter().filter_map(serde_json::Value::as_str) {
                    // Bucket parameterised indicators by their kind prefix.
                    let kind = indicator.split(':').next().unwrap_or(indicator);
                    *frequencies.entry(kind.to_string()).or_insert(0) += 1;
                }
            }
        }
        frequencies
    }
}

impl Default for PatternAnalyst {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for PatternAnalyst {
    fn name(&self) -> &str {
        names::PATTERN_ANALYST
    }

    fn description(&self) -> &str {
        "Analyzes temporal and supplier patterns across upstream findings"
    }

    fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    async fn process(
        &self,
        message: &AgentMessage,
        _context: &InvestigationContext,
    ) -> DomainResult<AgentResponse> {
        let upstream: Vec<serde_json::Value> = message
            .payload
            .get("findings")
            .and_then(serde_json::Value::as_array)
            .cloned()
            .unwrap_or_default();

        let frequencies = Self::indicator_frequencies(&upstream);
        let mut findings = Vec::new();

        for (kind, count) in &frequencies {
            if *count >= 2 {
                findings.push(json!({
                    "finding_type": "pattern",
                    "description": format!(
                        "Indicador '{kind}' recorrente em {count} achados"
                    ),
                    "anomaly_score": (0.4 + 0.1 * (*count as f64)).min(0.9),
                    "indicators": [format!("recurring:{kind}")],
                }));
            }
        }

        Ok(AgentResponse::completed(
            self.name(),
            json!({
                "findings": findings,
                "sources": ["historical_series"],
                "indicator_frequencies": frequencies,
            }),
        ))
    }
}
