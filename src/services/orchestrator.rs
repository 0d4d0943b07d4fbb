//! Master orchestrator.
//!
//! Turns a free-text query into a plan over named specialists, runs the
//! plan group-by-group through the parallel executor, aggregates partial
//! results, reflects on quality, and can adapt the live plan from
//! intermediate metrics. Individual step failures never abort an
//! investigation; the surfaced result reflects whatever was obtained.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::agents::names;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    AgentMessage, AgentResponse, Finding, InvestigationContext, InvestigationPlan,
    InvestigationResult, PlanStep,
};
use crate::domain::models::investigation::ResultMetadata;
use crate::domain::ports::{AnomalyStore, Reflection, Reflective};
use crate::services::planner::InvestigationPlanner;
use crate::services::parallel::{ParallelExecutor, ParallelStrategy, ParallelTask};
use crate::services::registry::AgentRegistry;

/// Master agent orchestrating investigations over the registry.
pub struct MasterOrchestrator {
    name: String,
    capabilities: Vec<String>,
    registry: Arc<AgentRegistry>,
    executor: Arc<ParallelExecutor>,
    planner: InvestigationPlanner,
    store: Option<Arc<dyn AnomalyStore>>,
    active_investigations: RwLock<HashMap<Uuid, InvestigationPlan>>,
}

impl MasterOrchestrator {
    pub fn new(registry: Arc<AgentRegistry>, executor: Arc<ParallelExecutor>) -> Self {
        Self {
            name: "master_orchestrator".to_string(),
            capabilities: vec![
                "investigate".to_string(),
                "plan_investigation".to_string(),
                "monitor_progress".to_string(),
                "adapt_strategy".to_string(),
            ],
            registry,
            executor,
            planner: InvestigationPlanner::new(),
            store: None,
            active_investigations: RwLock::new(HashMap::new()),
        }
    }

    /// Attach a store so investigations are persisted.
    pub fn with_store(mut self, store: Arc<dyn AnomalyStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    /// Dispatch a message to one of the orchestrator operations.
    ///
    /// Failures surface as error responses, never as panics or raised
    /// errors; the caller always receives an [`AgentResponse`].
    pub async fn process(
        &self,
        message: &AgentMessage,
        context: &InvestigationContext,
    ) -> AgentResponse {
        let action = message.action.as_str();
        info!(action, investigation_id = %context.investigation_id, "orchestrator processing");

        let outcome: DomainResult<serde_json::Value> = match action {
            "investigate" => {
                let query = message
                    .payload
                    .get("query")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                match self.investigate(&query, context).await {
                    Ok(result) => serde_json::to_value(result).map_err(Into::into),
                    Err(e) => Err(e),
                }
            }
            "plan_investigation" => {
                let query = message
                    .payload
                    .get("query")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                match self.plan_investigation(&query, context).await {
                    Ok(plan) => serde_json::to_value(plan).map_err(Into::into),
                    Err(e) => Err(e),
                }
            }
            "monitor_progress" => Ok(self.monitor_progress(context).await),
            "adapt_strategy" => Ok(self.adapt_strategy(&message.payload, context).await),
            other => Err(DomainError::ExecutionFailed(format!(
                "Unknown action: {other}, available: {:?}",
                self.capabilities
            ))),
        };

        match outcome {
            Ok(result) => AgentResponse::completed(&self.name, result)
                .with_metadata("action", json!(action))
                .with_metadata("investigation_id", json!(context.investigation_id)),
            Err(e) => {
                warn!(action, error = %e, "orchestrator processing failed");
                AgentResponse::error(&self.name, e.to_string())
                    .with_metadata("action", json!(action))
                    .with_metadata("investigation_id", json!(context.investigation_id))
            }
        }
    }

    /// Conduct a full investigation for the query.
    #[instrument(skip(self, context), fields(investigation_id = %context.investigation_id), err)]
    pub async fn investigate(
        &self,
        query: &str,
        context: &InvestigationContext,
    ) -> DomainResult<InvestigationResult> {
        if query.trim().is_empty() {
            return Err(DomainError::MissingInput(
                "No query provided for investigation".to_string(),
            ));
        }

        let start = Instant::now();
        let investigation_id = context.investigation_id;

        let stored = if let Some(ref store) = self.store {
            Some(
                store
                    .create_investigation(
                        query,
                        serde_json::to_value(context)?,
                        context.user_id.as_deref().unwrap_or("api"),
                    )
                    .await?,
            )
        } else {
            None
        };

        // Step 1: plan.
        let plan = self.plan_investigation(query, context).await?;

        // Step 2: execute dependency groups sequentially, steps within a
        // group in parallel under best-effort.
        let mut findings: Vec<Finding> = Vec::new();
        let mut sources: Vec<String> = Vec::new();
        let mut steps_executed = 0usize;

        for (group_idx, group) in plan.parallel_groups().into_iter().enumerate() {
            info!(group = group_idx, steps = group.len(), "executing plan group");

            let mut tasks = Vec::new();
            for step in &group {
                match self.registry.get(&step.agent).await {
                    Some(agent) => {
                        tasks.push(ParallelTask::new(
                            agent,
                            AgentMessage::new(
                                self.name.clone(),
                                step.agent.clone(),
                                step.action.clone(),
                                step.parameters.clone(),
                            ),
                        ));
                        steps_executed += 1;
                    }
                    None => {
                        // Reject the step, continue the others.
                        warn!(agent = %step.agent, "plan step skipped: agent not registered");
                    }
                }
            }

            if tasks.is_empty() {
                continue;
            }

            let results = self
                .executor
                .execute_parallel(tasks, context, ParallelStrategy::BestEffort)
                .await;

            for result in &results {
                if !result.success {
                    warn!(
                        task_id = %result.task_id,
                        error = result.error.as_deref().unwrap_or("unknown"),
                        "investigation step failed"
                    );
                }
            }

            let aggregated = self.executor.aggregate_results(&results, "findings");
            for item in aggregated.items {
                match serde_json::from_value::<Finding>(item) {
                    Ok(finding) => findings.push(finding),
                    Err(e) => warn!(error = %e, "discarding malformed finding"),
                }
            }

            for result in results {
                let success = result.success;
                let Some(response) = result.result.filter(|_| success) else {
                    continue;
                };
                if let Some(step_sources) = response
                    .result
                    .as_ref()
                    .and_then(|v| v.get("sources"))
                    .and_then(serde_json::Value::as_array)
                {
                    sources.extend(
                        step_sources
                            .iter()
                            .filter_map(serde_json::Value::as_str)
                            .map(String::from),
                    );
                }
            }
        }

        // Step 3: explanation and confidence.
        let distinct_sources = dedup_preserving_order(sources);
        let explanation = build_explanation(query, &findings, &distinct_sources);
        let confidence_score = confidence_score(&findings, distinct_sources.len());

        let processing_time_ms = start.elapsed().as_millis() as u64;
        let result = InvestigationResult {
            investigation_id,
            query: query.to_string(),
            findings,
            sources: distinct_sources,
            confidence_score,
            explanation,
            metadata: ResultMetadata {
                agents_used: plan.required_agents.clone(),
                steps_executed,
                plan: plan.clone(),
            },
            processing_time_ms,
            timestamp: Utc::now(),
        };

        self.active_investigations
            .write()
            .await
            .insert(investigation_id, plan);

        if let (Some(store), Some(row)) = (self.store.as_ref(), stored) {
            use crate::domain::models::InvestigationRef;
            store
                .update_investigation_status(
                    InvestigationRef::Investigation(row.id),
                    "completed",
                    1.0,
                    serde_json::to_value(&result.findings)?,
                    result.findings.len(),
                )
                .await?;
        }

        info!(
            investigation_id = %investigation_id,
            findings = result.findings.len(),
            confidence = result.confidence_score,
            processing_time_ms,
            "investigation completed"
        );

        Ok(result)
    }

    /// Build (and remember) a plan for the query.
    pub async fn plan_investigation(
        &self,
        query: &str,
        context: &InvestigationContext,
    ) -> DomainResult<InvestigationPlan> {
        let plan = self.planner.plan(query);
        plan.validate()?;

        info!(
            investigation_id = %context.investigation_id,
            steps = plan.steps.len(),
            agents = ?plan.required_agents,
            "investigation plan created"
        );

        self.active_investigations
            .write()
            .await
            .insert(context.investigation_id, plan.clone());

        Ok(plan)
    }

    /// Report progress of an active investigation.
    pub async fn monitor_progress(&self, context: &InvestigationContext) -> serde_json::Value {
        let active = self.active_investigations.read().await;
        match active.get(&context.investigation_id) {
            Some(plan) => json!({
                "status": "active",
                "plan": plan,
                "progress": {
                    "total_steps": plan.steps.len(),
                    "completed_steps": 0,
                },
            }),
            None => json!({
                "status": "not_found",
                "message": "Investigation not found",
            }),
        }
    }

    /// Adapt the live plan from aggregated intermediate results.
    ///
    /// Low findings loosen the detection threshold; low confidence adds
    /// pattern analysis; few sources diversify regionally; a high anomaly
    /// rate deepens with policy analysis; geographic concentration adds an
    /// inequality step. New steps are union-merged into the plan.
    pub async fn adapt_strategy(
        &self,
        payload: &serde_json::Value,
        context: &InvestigationContext,
    ) -> serde_json::Value {
        let mut active = self.active_investigations.write().await;
        let Some(plan) = active.get_mut(&context.investigation_id) else {
            return json!({
                "status": "error",
                "message": "No active investigation found",
            });
        };

        let current = payload.get("current_results").cloned().unwrap_or_default();
        let query = payload
            .get("query")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default();

        let findings_count = current
            .get("findings")
            .and_then(serde_json::Value::as_array)
            .map_or(0, Vec::len);
        let confidence_score = current
            .get("confidence_score")
            .and_then(serde_json::Value::as_f64)
            .unwrap_or(0.0);
        let sources_count = current
            .get("sources")
            .and_then(serde_json::Value::as_array)
            .map_or(0, Vec::len);
        let anomaly_rate = current
            .get("anomaly_rate")
            .and_then(serde_json::Value::as_f64)
            .unwrap_or(0.0);
        let geographic_concentration = current
            .get("geographic_concentration")
            .and_then(serde_json::Value::as_f64)
            .unwrap_or(0.0);

        let mut changes: Vec<String> = Vec::new();
        let mut new_steps: Vec<PlanStep> = Vec::new();
        let params = json!({ "query": query });

        if findings_count < plan.quality_criteria.min_findings {
            changes.push("Expandir critérios de busca".to_string());
            changes.push("Reduzir threshold de anomalias de 2.5σ para 2.0σ".to_string());
            new_steps.push(
                PlanStep::new(names::ANOMALY_DETECTOR, "detect_anomalies").with_parameters(json!({
                    "query": query,
                    "sensitivity": "high",
                    "threshold": 2.0,
                })),
            );
        }

        if confidence_score < plan.quality_criteria.min_confidence {
            changes.push("Adicionar fontes de dados adicionais".to_string());
            changes.push("Incluir análise de padrões históricos".to_string());
            if !plan.required_agents.iter().any(|a| a == names::PATTERN_ANALYST) {
                new_steps.push(
                    PlanStep::new(names::PATTERN_ANALYST, "analyze_patterns")
                        .with_parameters(params.clone())
                        .with_dependencies(vec![names::ANOMALY_DETECTOR.to_string()]),
                );
                changes.push("Adicionar análise de padrões".to_string());
            }
        }

        if sources_count < plan.quality_criteria.min_sources {
            changes.push("Diversificar fontes de dados".to_string());
            if !plan.required_agents.iter().any(|a| a == names::REGIONAL_ANALYST) {
                new_steps.push(
                    PlanStep::new(names::REGIONAL_ANALYST, "analyze_regions")
                        .with_parameters(params.clone()),
                );
                changes.push("Adicionar análise regional".to_string());
            }
        }

        if anomaly_rate > 0.3 {
            changes.push("Aumentar profundidade da análise".to_string());
            changes.push("Adicionar análise de políticas públicas".to_string());
            if !plan.required_agents.iter().any(|a| a == names::POLICY_ANALYST) {
                new_steps.push(
                    PlanStep::new(names::POLICY_ANALYST, "analyze_policy")
                        .with_parameters(params.clone()),
                );
                changes.push("Adicionar analista de políticas".to_string());
            }
        }

        if geographic_concentration > 0.7 {
            changes.push("Detectada concentração geográfica".to_string());
            if !plan.required_agents.iter().any(|a| a == names::REGIONAL_ANALYST) {
                new_steps.push(
                    PlanStep::new(names::REGIONAL_ANALYST, "analyze_inequality")
                        .with_parameters(json!({ "metric": "contract_distribution" })),
                );
                changes.push("Adicionar análise de desigualdade regional".to_string());
            }
        }

        if !new_steps.is_empty() {
            plan.merge_steps(new_steps.clone());
        }

        info!(
            investigation_id = %context.investigation_id,
            changes = changes.len(),
            new_steps = new_steps.len(),
            findings = findings_count,
            confidence = confidence_score,
            "strategy adapted"
        );

        json!({
            "status": "adapted",
            "changes": changes,
            "new_steps": new_steps,
            "metrics": {
                "findings_count": findings_count,
                "confidence_score": confidence_score,
                "sources_count": sources_count,
                "anomaly_rate": anomaly_rate,
            },
        })
    }
}

#[async_trait]
impl Reflective for MasterOrchestrator {
    /// Assess completeness and quality of an investigation result.
    async fn reflect(
        &self,
        result: &serde_json::Value,
        _context: &InvestigationContext,
    ) -> DomainResult<Reflection> {
        let Ok(result) = serde_json::from_value::<InvestigationResult>(result.clone()) else {
            return Ok(Reflection {
                quality_score: 0.0,
                issues: vec!["Invalid result type".to_string()],
                suggestions: vec!["Fix result format".to_string()],
                metrics: serde_json::Value::Null,
            });
        };

        let mut issues = Vec::new();
        let mut suggestions = Vec::new();

        if result.findings.is_empty() {
            issues.push("No findings generated".to_string());
            suggestions.push("Review investigation strategy".to_string());
        }
        if result.confidence_score < 0.5 {
            issues.push("Low confidence score".to_string());
            suggestions.push("Gather more data or use additional sources".to_string());
        }
        if result.explanation.trim().len() < 50 {
            issues.push("Poor explanation quality".to_string());
            suggestions.push("Generate more detailed explanation".to_string());
        }
        if result.sources.len() < 2 {
            issues.push("Limited source diversity".to_string());
            suggestions.push("Include more data sources".to_string());
        }

        let quality_score = quality_score(&result, issues.len());

        info!(
            investigation_id = %result.investigation_id,
            quality_score,
            issues = issues.len(),
            "investigation reflection"
        );

        Ok(Reflection {
            quality_score,
            issues,
            suggestions,
            metrics: json!({
                "findings_count": result.findings.len(),
                "confidence_score": result.confidence_score,
                "sources_count": result.sources.len(),
                "explanation_length": result.explanation.len(),
            }),
        })
    }
}

/// Confidence in investigation results.
///
/// Findings count caps linearly to 1.0 at 10, distinct sources at 3; the
/// mean anomaly score carries half the weight. Zero iff there are no
/// findings.
pub fn confidence_score(findings: &[Finding], distinct_sources: usize) -> f64 {
    if findings.is_empty() {
        return 0.0;
    }

    let findings_score = (findings.len() as f64 / 10.0).min(1.0);
    let sources_score = (distinct_sources as f64 / 3.0).min(1.0);

    let anomaly_scores: Vec<f64> = findings.iter().filter_map(|f| f.anomaly_score).collect();
    let avg_anomaly = if anomaly_scores.is_empty() {
        0.0
    } else {
        anomaly_scores.iter().sum::<f64>() / anomaly_scores.len() as f64
    };

    (findings_score * 0.3 + sources_score * 0.2 + avg_anomaly * 0.5).min(1.0)
}

/// Quality score from a result and its detected issue count.
fn quality_score(result: &InvestigationResult, issue_count: usize) -> f64 {
    let mut score = 1.0 - issue_count as f64 * 0.2;
    if result.confidence_score > 0.8 {
        score += 0.1;
    }
    if result.explanation.len() > 100 {
        score += 0.1;
    }
    score.clamp(0.0, 1.0)
}

/// Deterministic explanation of the findings, in the report language of
/// the domain.
fn build_explanation(query: &str, findings: &[Finding], sources: &[String]) -> String {
    let high_suspicion = findings
        .iter()
        .filter(|f| f.anomaly_score.unwrap_or(0.0) > 0.7)
        .count();

    let mut explanation = format!(
        "Investigação sobre \"{query}\": {} achado(s) identificado(s), \
         {high_suspicion} com alta suspeita (score acima de 0,7).",
        findings.len()
    );

    if findings.is_empty() {
        explanation.push_str(
            " Nenhuma irregularidade foi identificada com os critérios atuais; \
             considere ampliar o período de análise ou reduzir o threshold de detecção.",
        );
    } else {
        for finding in findings.iter().take(3) {
            if let Some(desc) = finding.description.as_deref() {
                explanation.push_str(&format!(" Achado: {desc}."));
            }
        }
        if high_suspicion > 0 {
            explanation.push_str(
                " Recomenda-se encaminhar os achados de alta suspeita aos órgãos de controle.",
            );
        }
    }

    if sources.is_empty() {
        explanation.push_str(" Nenhuma fonte de dados foi consultada.");
    } else {
        explanation.push_str(&format!(" Fontes consultadas: {}.", sources.join(", ")));
    }

    explanation
}

/// Deduplicate preserving first-seen order.
fn dedup_preserving_order(items: Vec<String>) -> Vec<String> {
    let mut seen = Vec::new();
    for item in items {
        if !seen.contains(&item) {
            seen.push(item);
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::QualityCriteria;
    use crate::domain::ports::Agent;
    use crate::services::parallel::ExecutorConfig;

    struct StubAgent {
        name: String,
        capabilities: Vec<String>,
        payload: serde_json::Value,
    }

    #[async_trait]
    impl Agent for StubAgent {
        fn name(&self) -> &str {
            &self.name
        }

        fn description(&self) -> &str {
            "stub"
        }

        fn capabilities(&self) -> &[String] {
            &self.capabilities
        }

        async fn process(
            &self,
            _message: &AgentMessage,
            _context: &InvestigationContext,
        ) -> DomainResult<AgentResponse> {
            Ok(AgentResponse::completed(&self.name, self.payload.clone()))
        }
    }

    fn stub(name: &str, payload: serde_json::Value) -> Arc<dyn Agent> {
        Arc::new(StubAgent {
            name: name.to_string(),
            capabilities: vec!["noop".to_string()],
            payload,
        })
    }

    async fn orchestrator_with_stubs() -> MasterOrchestrator {
        let registry = Arc::new(AgentRegistry::new());
        for name in [
            names::ANOMALY_DETECTOR,
            names::PATTERN_ANALYST,
            names::REGIONAL_ANALYST,
            names::POLICY_ANALYST,
            names::DATA_AGGREGATOR,
            names::REPORTER,
        ] {
            registry
                .register(stub(
                    name,
                    json!({
                        "findings": [{"finding_type": "signal", "description": name, "anomaly_score": 0.6}],
                        "sources": [format!("{name}_source")],
                    }),
                ))
                .await;
        }
        let executor = Arc::new(ParallelExecutor::new(ExecutorConfig::default()));
        MasterOrchestrator::new(registry, executor)
    }

    #[tokio::test]
    async fn test_investigate_requires_query() {
        let orchestrator = orchestrator_with_stubs().await;
        let context = InvestigationContext::new();
        let err = orchestrator.investigate("  ", &context).await.unwrap_err();
        assert!(matches!(err, DomainError::MissingInput(_)));
    }

    #[tokio::test]
    async fn test_investigate_merges_findings_and_sources() {
        let orchestrator = orchestrator_with_stubs().await;
        let context = InvestigationContext::new();

        let result = orchestrator
            .investigate("contratos suspeitos no nordeste com relatório", &context)
            .await
            .unwrap();

        assert!(!result.findings.is_empty());
        assert!(!result.sources.is_empty());
        assert!((0.0..=1.0).contains(&result.confidence_score));
        assert!(result.confidence_score > 0.0);
        assert_eq!(result.metadata.plan.required_agents, result.metadata.agents_used);
    }

    #[tokio::test]
    async fn test_missing_agent_skips_step_and_continues() {
        let registry = Arc::new(AgentRegistry::new());
        // Only the detector is registered; other plan steps must be skipped.
        registry
            .register(stub(
                names::ANOMALY_DETECTOR,
                json!({"findings": [{"description": "x", "anomaly_score": 0.8}], "sources": ["s"]}),
            ))
            .await;
        let executor = Arc::new(ParallelExecutor::new(ExecutorConfig::default()));
        let orchestrator = MasterOrchestrator::new(registry, executor);

        let context = InvestigationContext::new();
        let result = orchestrator
            .investigate("contratos suspeitos no nordeste com relatório", &context)
            .await
            .unwrap();

        assert_eq!(result.findings.len(), 1);
        assert_eq!(result.metadata.steps_executed, 1);
    }

    #[tokio::test]
    async fn test_monitor_progress_unknown_investigation() {
        let orchestrator = orchestrator_with_stubs().await;
        let context = InvestigationContext::new();
        let progress = orchestrator.monitor_progress(&context).await;
        assert_eq!(progress["status"], "not_found");
    }

    #[tokio::test]
    async fn test_monitor_progress_active_investigation() {
        let orchestrator = orchestrator_with_stubs().await;
        let context = InvestigationContext::new();
        orchestrator
            .plan_investigation("contratos suspeitos", &context)
            .await
            .unwrap();
        let progress = orchestrator.monitor_progress(&context).await;
        assert_eq!(progress["status"], "active");
        assert!(progress["progress"]["total_steps"].as_u64().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_adapt_strategy_unknown_investigation() {
        let orchestrator = orchestrator_with_stubs().await;
        let context = InvestigationContext::new();
        let outcome = orchestrator
            .adapt_strategy(&json!({"query": "q", "current_results": {}}), &context)
            .await;
        assert_eq!(outcome["status"], "error");
    }

    #[tokio::test]
    async fn test_adapt_strategy_low_findings_loosens_threshold() {
        let orchestrator = orchestrator_with_stubs().await;
        let context = InvestigationContext::new();
        orchestrator
            .plan_investigation("xyz", &context)
            .await
            .unwrap();

        let outcome = orchestrator
            .adapt_strategy(
                &json!({
                    "query": "xyz",
                    "current_results": {"findings": [], "confidence_score": 0.9, "sources": ["a", "b"]},
                }),
                &context,
            )
            .await;

        assert_eq!(outcome["status"], "adapted");
        let new_steps = outcome["new_steps"].as_array().unwrap();
        assert!(new_steps.iter().any(|s| {
            s["agent"] == names::ANOMALY_DETECTOR
                && s["parameters"]["sensitivity"] == "high"
                && s["parameters"]["threshold"] == 2.0
        }));
    }

    #[tokio::test]
    async fn test_adapt_strategy_high_anomaly_rate_adds_policy() {
        let orchestrator = orchestrator_with_stubs().await;
        let context = InvestigationContext::new();
        orchestrator
            .plan_investigation("contratos suspeitos", &context)
            .await
            .unwrap();

        let outcome = orchestrator
            .adapt_strategy(
                &json!({
                    "query": "contratos suspeitos",
                    "current_results": {
                        "findings": [{"anomaly_score": 0.9}],
                        "confidence_score": 0.95,
                        "sources": ["a", "b"],
                        "anomaly_rate": 0.5,
                    },
                }),
                &context,
            )
            .await;

        let new_steps = outcome["new_steps"].as_array().unwrap();
        assert!(new_steps.iter().any(|s| s["agent"] == names::POLICY_ANALYST));

        // The live plan received the merged steps without duplicate agents.
        let active = orchestrator.active_investigations.read().await;
        let plan = active.get(&context.investigation_id).unwrap();
        let policy_count = plan
            .required_agents
            .iter()
            .filter(|a| a.as_str() == names::POLICY_ANALYST)
            .count();
        assert_eq!(policy_count, 1);
    }

    #[tokio::test]
    async fn test_adapt_strategy_geographic_concentration() {
        let orchestrator = orchestrator_with_stubs().await;
        let context = InvestigationContext::new();
        orchestrator
            .plan_investigation("contratos suspeitos", &context)
            .await
            .unwrap();

        let outcome = orchestrator
            .adapt_strategy(
                &json!({
                    "query": "contratos suspeitos",
                    "current_results": {
                        "findings": [{"anomaly_score": 0.2}],
                        "confidence_score": 0.95,
                        "sources": ["a", "b"],
                        "geographic_concentration": 0.8,
                    },
                }),
                &context,
            )
            .await;

        let new_steps = outcome["new_steps"].as_array().unwrap();
        assert!(new_steps
            .iter()
            .any(|s| s["agent"] == names::REGIONAL_ANALYST && s["action"] == "analyze_inequality"));
    }

    #[tokio::test]
    async fn test_process_unknown_action_errors() {
        let orchestrator = orchestrator_with_stubs().await;
        let context = InvestigationContext::new();
        let message = AgentMessage::new("user", "master_orchestrator", "dance", json!({}));
        let response = orchestrator.process(&message, &context).await;
        assert!(!response.is_success());
        assert!(response.error.unwrap().contains("Unknown action"));
    }

    #[test]
    fn test_confidence_zero_iff_no_findings() {
        assert!(confidence_score(&[], 5).abs() < f64::EPSILON);
        let findings = vec![Finding::new("t", "d")];
        assert!(confidence_score(&findings, 0) > 0.0);
    }

    #[test]
    fn test_confidence_bounded() {
        let findings: Vec<Finding> = (0..50)
            .map(|i| Finding::new("t", format!("d{i}")).with_score(1.0))
            .collect();
        let score = confidence_score(&findings, 10);
        assert!(score <= 1.0);
        assert!((score - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_confidence_weighted_average() {
        // 5 findings (0.5 * 0.3) + 3 sources (1.0 * 0.2) + mean 0.8 (0.5).
        let findings: Vec<Finding> = (0..5)
            .map(|i| Finding::new("t", format!("d{i}")).with_score(0.8))
            .collect();
        let score = confidence_score(&findings, 3);
        assert!((score - (0.15 + 0.2 + 0.4)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_reflection_flags_issues() {
        let orchestrator = orchestrator_with_stubs().await;
        let context = InvestigationContext::new();

        let result = InvestigationResult {
            investigation_id: context.investigation_id,
            query: "q".to_string(),
            findings: vec![],
            sources: vec![],
            confidence_score: 0.1,
            explanation: "curto".to_string(),
            metadata: ResultMetadata {
                plan: InvestigationPlan {
                    objective: "o".to_string(),
                    steps: vec![],
                    required_agents: vec![],
                    estimated_time_seconds: 30,
                    quality_criteria: QualityCriteria::default(),
                    fallback_strategies: vec![],
                },
                steps_executed: 0,
                agents_used: vec![],
            },
            processing_time_ms: 0,
            timestamp: Utc::now(),
        };

        let reflection = orchestrator
            .reflect(&serde_json::to_value(&result).unwrap(), &context)
            .await
            .unwrap();

        // All four issues: no findings, low confidence, short explanation,
        // few sources. 1.0 - 4*0.2 = 0.2, no bonuses.
        assert_eq!(reflection.issues.len(), 4);
        assert!((reflection.quality_score - 0.2).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_reflection_bonuses() {
        let orchestrator = orchestrator_with_stubs().await;
        let context = InvestigationContext::new();

        let result = InvestigationResult {
            investigation_id: context.investigation_id,
            query: "q".to_string(),
            findings: vec![Finding::new("t", "d").with_score(0.9)],
            sources: vec!["a".to_string(), "b".to_string()],
            confidence_score: 0.85,
            explanation: "x".repeat(150),
            metadata: ResultMetadata {
                plan: InvestigationPlan {
                    objective: "o".to_string(),
                    steps: vec![],
                    required_agents: vec![],
                    estimated_time_seconds: 30,
                    quality_criteria: QualityCriteria::default(),
                    fallback_strategies: vec![],
                },
                steps_executed: 1,
                agents_used: vec![],
            },
            processing_time_ms: 0,
            timestamp: Utc::now(),
        };

        let reflection = orchestrator
            .reflect(&serde_json::to_value(&result).unwrap(), &context)
            .await
            .unwrap();

        // No issues, both bonuses, clamped to 1.0.
        assert!(reflection.issues.is_empty());
        assert!((reflection.quality_score - 1.0).abs() < 1e-9);
    }
}
