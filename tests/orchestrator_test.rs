//! End-to-end orchestrator tests: planning scenarios, dependency
//! grouping soundness, and full investigations over stub specialists.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use vigia::adapters::store::MemoryAnomalyStore;
use vigia::agents::names;
use vigia::domain::errors::DomainResult;
use vigia::domain::models::{AgentMessage, AgentResponse, InvestigationContext};
use vigia::domain::ports::Agent;
use vigia::services::parallel::{ExecutorConfig, ParallelExecutor};
use vigia::services::planner::InvestigationPlanner;
use vigia::services::registry::AgentRegistry;
use vigia::services::MasterOrchestrator;

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

async fn registry_with_all_specialists() -> Arc<AgentRegistry> {
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
            .register(Arc::new(StubAgent {
                name: name.to_string(),
                capabilities: vec!["any".to_string()],
                payload: json!({
                    "findings": [
                        {"finding_type": "signal", "description": format!("{name} finding"), "anomaly_score": 0.75}
                    ],
                    "sources": [format!("{name}_source")],
                }),
            }))
            .await;
    }
    registry
}

/// S1 - keyword-only planning over a query that exercises every keyword
/// class.
#[test]
fn keyword_planning_builds_full_specialist_graph() {
    let planner = InvestigationPlanner::new();
    let plan = planner.plan("Detectar contratos suspeitos no Nordeste e gerar relatório");

    let agents: Vec<&str> = plan.steps.iter().map(|s| s.agent.as_str()).collect();
    for expected in [
        names::ANOMALY_DETECTOR,
        names::PATTERN_ANALYST,
        names::REGIONAL_ANALYST,
        names::DATA_AGGREGATOR,
        names::REPORTER,
    ] {
        assert!(agents.contains(&expected), "missing {expected}");
    }

    let step = |name: &str| plan.steps.iter().find(|s| s.agent == name).unwrap();
    assert_eq!(
        step(names::PATTERN_ANALYST).depends_on,
        vec![names::ANOMALY_DETECTOR.to_string()]
    );
    for dep in [names::ANOMALY_DETECTOR, names::PATTERN_ANALYST, names::REGIONAL_ANALYST] {
        assert!(step(names::DATA_AGGREGATOR).depends_on.iter().any(|d| d == dep));
    }
    for dep in [
        names::ANOMALY_DETECTOR,
        names::PATTERN_ANALYST,
        names::REGIONAL_ANALYST,
        names::DATA_AGGREGATOR,
    ] {
        assert!(step(names::REPORTER).depends_on.iter().any(|d| d == dep));
    }
}

/// S2 - fallback plan for a query matching no keyword class.
#[test]
fn fallback_plan_is_single_detection_step() {
    let planner = InvestigationPlanner::new();
    let plan = planner.plan("xyz abc def");

    assert_eq!(plan.steps.len(), 1);
    assert_eq!(plan.steps[0].agent, names::ANOMALY_DETECTOR);
    assert!(plan.steps[0].depends_on.is_empty());
}

/// Property 1 - every generated plan is a DAG whose dependencies are
/// introduced by earlier steps, with required_agents matching the steps.
#[test]
fn generated_plans_satisfy_dag_invariants() {
    let planner = InvestigationPlanner::new();
    for query in [
        "Detectar contratos suspeitos no Nordeste e gerar relatório",
        "contratos irregulares",
        "efetividade do programa de saúde no Sul",
        "análise de licitações emergenciais com relatório",
        "xyz",
    ] {
        let plan = planner.plan(query);
        plan.validate().unwrap_or_else(|e| panic!("query '{query}': {e}"));
    }
}

/// Property 2 - grouping soundness: no two steps in a group share an
/// agent, no step depends on an earlier name in its own group, and
/// flattening preserves per-agent step order.
#[test]
fn dependency_grouping_is_sound() {
    let planner = InvestigationPlanner::new();
    let plan = planner.plan("Detectar contratos suspeitos no Nordeste e gerar relatório");
    let groups = plan.parallel_groups();

    for group in &groups {
        for (i, step) in group.iter().enumerate() {
            assert!(
                !group[..i].iter().any(|s| s.agent == step.agent),
                "duplicate agent {} within group",
                step.agent
            );
            for dep in &step.depends_on {
                assert!(
                    !group[..i].iter().any(|s| &s.agent == dep),
                    "step {} depends on {} from the same group",
                    step.agent,
                    dep
                );
            }
        }
    }

    let flattened: Vec<&str> = groups
        .iter()
        .flatten()
        .map(|s| s.agent.as_str())
        .collect();
    let original: Vec<&str> = plan.steps.iter().map(|s| s.agent.as_str()).collect();
    assert_eq!(flattened, original, "flattening must preserve step order");
}

/// Property 3 - confidence bounds over a real run.
#[tokio::test]
async fn investigation_confidence_is_bounded_and_nonzero_with_findings() {
    let registry = registry_with_all_specialists().await;
    let executor = Arc::new(ParallelExecutor::new(ExecutorConfig::default()));
    let orchestrator = MasterOrchestrator::new(registry, executor);

    let context = InvestigationContext::new();
    let result = orchestrator
        .investigate("Detectar contratos suspeitos no Nordeste e gerar relatório", &context)
        .await
        .unwrap();

    assert!((0.0..=1.0).contains(&result.confidence_score));
    assert!(!result.findings.is_empty());
    assert!(result.confidence_score > 0.0);

    // Sources deduplicate.
    let mut sorted = result.sources.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(sorted.len(), result.sources.len());
}

#[tokio::test]
async fn investigation_result_is_persisted_when_store_attached() {
    let registry = registry_with_all_specialists().await;
    let executor = Arc::new(ParallelExecutor::new(ExecutorConfig::default()));
    let store = Arc::new(MemoryAnomalyStore::new());
    let orchestrator =
        MasterOrchestrator::new(registry, executor).with_store(store.clone());

    let context = InvestigationContext::new().with_user("integration-test");
    orchestrator
        .investigate("contratos suspeitos", &context)
        .await
        .unwrap();

    let (user_rows, auto_rows) = store.investigation_counts().await;
    assert_eq!(user_rows, 1);
    assert_eq!(auto_rows, 0);
}

#[tokio::test]
async fn empty_query_is_rejected() {
    let registry = registry_with_all_specialists().await;
    let executor = Arc::new(ParallelExecutor::new(ExecutorConfig::default()));
    let orchestrator = MasterOrchestrator::new(registry, executor);

    let context = InvestigationContext::new();
    let message = AgentMessage::new("user", "master_orchestrator", "investigate", json!({}));
    let response = orchestrator.process(&message, &context).await;

    assert!(!response.is_success());
    assert!(response.error.unwrap().contains("Missing input"));
}

#[tokio::test]
async fn adapt_strategy_merges_new_steps_into_live_plan() {
    let registry = registry_with_all_specialists().await;
    let executor = Arc::new(ParallelExecutor::new(ExecutorConfig::default()));
    let orchestrator = MasterOrchestrator::new(registry, executor);

    let context = InvestigationContext::new();
    let plan = orchestrator
        .plan_investigation("xyz", &context)
        .await
        .unwrap();
    let steps_before = plan.steps.len();

    let outcome = orchestrator
        .adapt_strategy(
            &json!({
                "query": "xyz",
                "current_results": {
                    "findings": [],
                    "confidence_score": 0.1,
                    "sources": [],
                },
            }),
            &context,
        )
        .await;

    assert_eq!(outcome["status"], "adapted");
    assert!(!outcome["changes"].as_array().unwrap().is_empty());
    assert!(!outcome["new_steps"].as_array().unwrap().is_empty());

    // The live plan grew and remains visible through monitor_progress.
    let progress = orchestrator.monitor_progress(&context).await;
    assert_eq!(progress["status"], "active");
    let total_steps = progress["progress"]["total_steps"].as_u64().unwrap() as usize;
    assert!(total_steps > steps_before);
}
