//! Data aggregation specialist.
//!
//! Consolidates upstream findings into per-type counts and score
//! aggregates for visualisation and reporting steps.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::json;

use super::names;
use crate::domain::errors::DomainResult;
use crate::domain::models::{AgentMessage, AgentResponse, InvestigationContext};
use crate::domain::ports::Agent;

pub struct DataAggregator {
    capabilities: Vec<String>,
}

impl DataAggregator {
    pub fn new() -> Self {
        Self {
            capabilities: vec!["aggregate_data".to_string()],
        }
    }
}

impl Default for DataAggregator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for DataAggregator {
    fn name(&self) -> &str {
        names::DATA_AGGREGATOR
    }

    fn description(&self) -> &str {
        "Aggregates findings into multidimensional summaries for reporting"
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

        let mut by_type: HashMap<String, usize> = HashMap::new();
        let mut scores: Vec<f64> = Vec::new();
        for finding in &upstream {
            let kind = finding
                .get("finding_type")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("unknown");
            *by_type.entry(kind.to_string()).or_insert(0) += 1;
            if let Some(score) = finding.get("anomaly_score").and_then(serde_json::Value::as_f64) {
                scores.push(score);
            }
        }

        let mean_score = if scores.is_empty() {
            0.0
        } else {
            scores.iter().sum::<f64>() / scores.len() as f64
        };
        let max_score = scores.iter().copied().fold(0.0f64, f64::max);

        Ok(AgentResponse::completed(
            self.name(),
            json!({
                "findings": [],
                "sources": [],
                "aggregates": {
                    "total_findings": upstream.len(),
                    "findings_by_type": by_type,
                    "mean_anomaly_score": mean_score,
                    "max_anomaly_score": max_score,
                },
            }),
        ))
    }
}
