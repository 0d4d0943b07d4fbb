//! Report generation specialist.

use async_trait::async_trait;
use serde_json::json;

use super::names;
use crate::domain::errors::DomainResult;
use crate::domain::models::{AgentMessage, AgentResponse, InvestigationContext};
use crate::domain::ports::Agent;

pub struct Reporter {
    capabilities: Vec<String>,
}

impl Reporter {
    pub fn new() -> Self {
        Self {
            capabilities: vec!["generate_report".to_string()],
        }
    }

    fn render(query: &str, findings: &[serde_json::Value]) -> String {
        let high = findings
            .iter()
            .filter(|f| {
                f.get("anomaly_score")
                    .and_then(serde_json::Value::as_f64)
                    .unwrap_or(0.0)
                    > 0.7
            })
            .count();

        let mut report = String::new();
        report.push_str(&format!("# Relatório de investigação\n\nConsulta: {query}\n\n"));
        report.push_str(&format!(
            "## Resumo executivo\n\n{} achado(s) no total, {high} com alta suspeita.\n\n",
            findings.len()
        ));

        if !findings.is_empty() {
            report.push_str("## Achados principais\n\n");
            for finding in findings.iter().take(10) {
                if let Some(description) = finding.get("description").and_then(serde_json::Value::as_str) {
                    report.push_str(&format!("- {description}\n"));
                }
            }
            report.push('\n');
        }

        report.push_str("## Próximos passos\n\n");
        if high > 0 {
            report.push_str("- Encaminhar achados de alta suspeita aos órgãos de controle.\n");
        }
        report.push_str("- Aprofundar a coleta de dados nas fontes citadas.\n");

        report
    }
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for Reporter {
    fn name(&self) -> &str {
        names::REPORTER
    }

    fn description(&self) -> &str {
        "Generates executive reports from investigation findings"
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
        let findings: Vec<serde_json::Value> = message
            .payload
            .get("findings")
            .and_then(serde_json::Value::as_array)
            .cloned()
            .unwrap_or_default();

        let report = Self::render(query, &findings);

        Ok(AgentResponse::completed(
            self.name(),
            json!({
                "findings": [],
                "sources": [],
                "report": report,
            }),
        ))
    }
}
