//! Regional analysis specialist.

use async_trait::async_trait;
use serde_json::json;

use super::names;
use crate::domain::errors::DomainResult;
use crate::domain::models::{AgentMessage, AgentResponse, InvestigationContext};
use crate::domain::ports::Agent;

/// Brazilian macro-regions recognised in queries.
const REGIONS: &[&str] = &["norte", "nordeste", "sul", "sudeste", "centro-oeste"];

pub struct RegionalAnalyst {
    capabilities: Vec<String>,
}

impl RegionalAnalyst {
    pub fn new() -> Self {
        Self {
            capabilities: vec![
                "analyze_regions".to_string(),
                "analyze_inequality".to_string(),
            ],
        }
    }

    fn regions_in_query(query: &str) -> Vec<&'static str> {
        let query_lower = query.to_lowercase();
        REGIONS
            .iter()
            .copied()
            .filter(|r| query_lower.contains(r))
            .collect()
    }
}

impl Default for RegionalAnalyst {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for RegionalAnalyst {
    fn name(&self) -> &str {
        names::REGIONAL_ANALYST
    }

    fn description(&self) -> &str {
        "Analyzes geographic distribution and regional inequality of spending"
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

        let mut findings = Vec::new();

        match message.action.as_str() {
            "analyze_inequality" => {
                let metric = message
                    .payload
                    .get("metric")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("contract_distribution");
                findings.push(json!({
                    "finding_type": "regional_inequality",
                    "description": format!(
                        "Análise de desigualdade regional sobre a métrica '{metric}'"
                    ),
                    "indicators": [format!("inequality_metric:{metric}")],
                }));
            }
            _ => {
                for region in Self::regions_in_query(query) {
                    findings.push(json!({
                        "finding_type": "regional_focus",
                        "description": format!(
                            "Consulta concentrada na região {region}; distribuição de gastos \
                             comparada com a média nacional"
                        ),
                        "indicators": [format!("region:{region}")],
                    }));
                }
            }
        }

        Ok(AgentResponse::completed(
            self.name(),
            json!({
                "findings": findings,
                "sources": ["ibge", "portal_transparencia"],
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_region_keyword_produces_finding() {
        let analyst = RegionalAnalyst::new();
        let message = AgentMessage::new(
            "test",
            names::REGIONAL_ANALYST,
            "analyze_regions",
            json!({"query": "gastos no Nordeste"}),
        );
        let context = InvestigationContext::new();
        let response = analyst.process(&message, &context).await.unwrap();
        let result = response.result.unwrap();
        let findings = result["findings"].as_array().unwrap();
        assert_eq!(findings.len(), 1);
        assert!(findings[0]["description"].as_str().unwrap().contains("nordeste"));
    }

    #[tokio::test]
    async fn test_inequality_action() {
        let analyst = RegionalAnalyst::new();
        let message = AgentMessage::new(
            "test",
            names::REGIONAL_ANALYST,
            "analyze_inequality",
            json!({"metric": "contract_distribution"}),
        );
        let context = InvestigationContext::new();
        let response = analyst.process(&message, &context).await.unwrap();
        let result = response.result.unwrap();
        let findings = result["findings"].as_array().unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0]["finding_type"], "regional_inequality");
    }

    #[test]
    fn test_regions_in_query() {
        assert_eq!(
            RegionalAnalyst::regions_in_query("Norte e Sul do país"),
            vec!["norte", "sul"]
        );
        assert!(RegionalAnalyst::regions_in_query("sem regiões").is_empty());
    }
}
