//! Rule-based investigation planning.
//!
//! Planning is keyword-driven over the lowercased query text. Keyword
//! classes decide which specialists appear; pattern analysis always follows
//! anomaly detection, and aggregation/reporting steps close larger plans.

use serde_json::json;

use crate::agents::names;
use crate::domain::models::{InvestigationPlan, PlanStep, QualityCriteria};

/// Query terms that request anomaly/irregularity analysis.
const ANOMALY_KEYWORDS: &[&str] = &[
    "suspeito",
    "anomalia",
    "fraud",
    "irregularidade",
    "contrato",
    "licitação",
    "superfaturamento",
    "emergencial",
];

/// Query terms that request public-policy analysis.
const POLICY_KEYWORDS: &[&str] = &[
    "política",
    "efetividade",
    "impacto",
    "resultado",
    "beneficiário",
    "programa",
    "projeto",
    "investimento",
];

/// Query terms that request regional/geographic analysis.
const REGIONAL_KEYWORDS: &[&str] = &[
    "região",
    "estado",
    "município",
    "geográfico",
    "territorial",
    "norte",
    "nordeste",
    "sul",
    "sudeste",
    "centro-oeste",
];

/// Query terms that request report generation.
const REPORTING_KEYWORDS: &[&str] = &[
    "relatório",
    "resumo",
    "análise",
    "explicação",
    "documento",
];

/// Builds investigation plans from free-text queries.
#[derive(Debug, Clone, Default)]
pub struct InvestigationPlanner;

impl InvestigationPlanner {
    pub fn new() -> Self {
        Self
    }

    /// Build a plan for the query.
    ///
    /// Falls back to a single anomaly-detection step when no keyword class
    /// matches. Estimated time is `30 + 15·steps` seconds; quality criteria
    /// tighten when the anomaly path is active.
    pub fn plan(&self, query: &str) -> InvestigationPlan {
        let query_lower = query.to_lowercase();
        let contains_any = |keywords: &[&str]| keywords.iter().any(|k| query_lower.contains(k));

        let needs_anomaly_detection = contains_any(ANOMALY_KEYWORDS);
        let needs_policy_analysis = contains_any(POLICY_KEYWORDS);
        let needs_regional_analysis = contains_any(REGIONAL_KEYWORDS);
        let needs_reporting = contains_any(REPORTING_KEYWORDS);

        let mut steps: Vec<PlanStep> = Vec::new();
        let mut required_agents: Vec<String> = Vec::new();
        let params = json!({ "query": query });

        if needs_anomaly_detection {
            steps.push(
                PlanStep::new(names::ANOMALY_DETECTOR, "detect_anomalies")
                    .with_parameters(params.clone()),
            );
            required_agents.push(names::ANOMALY_DETECTOR.to_string());
        }

        if needs_policy_analysis {
            steps.push(
                PlanStep::new(names::POLICY_ANALYST, "analyze_policy")
                    .with_parameters(params.clone()),
            );
            required_agents.push(names::POLICY_ANALYST.to_string());
        }

        if needs_regional_analysis {
            steps.push(
                PlanStep::new(names::REGIONAL_ANALYST, "analyze_regions")
                    .with_parameters(params.clone()),
            );
            required_agents.push(names::REGIONAL_ANALYST.to_string());
        }

        // Pattern analysis always follows anomaly detection.
        if needs_anomaly_detection {
            steps.push(
                PlanStep::new(names::PATTERN_ANALYST, "analyze_patterns")
                    .with_parameters(params.clone())
                    .with_dependencies(vec![names::ANOMALY_DETECTOR.to_string()]),
            );
            required_agents.push(names::PATTERN_ANALYST.to_string());
        }

        // Aggregation for visualisations once the plan is regional or wide.
        if needs_regional_analysis || steps.len() > 2 {
            steps.push(
                PlanStep::new(names::DATA_AGGREGATOR, "aggregate_data")
                    .with_parameters(params.clone())
                    .with_dependencies(required_agents.clone()),
            );
            required_agents.push(names::DATA_AGGREGATOR.to_string());
        }

        // Reporting closes multi-step plans or explicit requests.
        if needs_reporting || steps.len() > 1 {
            steps.push(
                PlanStep::new(names::REPORTER, "generate_report")
                    .with_parameters(params.clone())
                    .with_dependencies(required_agents.clone()),
            );
            required_agents.push(names::REPORTER.to_string());
        }

        // Fallback: basic anomaly detection.
        if steps.is_empty() {
            steps.push(
                PlanStep::new(names::ANOMALY_DETECTOR, "detect_anomalies")
                    .with_parameters(params),
            );
            required_agents.push(names::ANOMALY_DETECTOR.to_string());
        }

        let estimated_time_seconds = 30 + (steps.len() as u64) * 15;

        let quality_criteria = QualityCriteria {
            min_confidence: if needs_anomaly_detection { 0.75 } else { 0.70 },
            min_findings: 1,
            min_sources: if required_agents.len() > 1 { 2 } else { 1 },
        };

        InvestigationPlan {
            objective: format!("Investigar transparência pública: {query}"),
            steps,
            required_agents,
            estimated_time_seconds,
            quality_criteria,
            fallback_strategies: vec![
                "Reduzir threshold de anomalias se poucos resultados".to_string(),
                "Expandir período de análise".to_string(),
                "Incluir dados de fontes secundárias".to_string(),
            ],
        }
    }
}
