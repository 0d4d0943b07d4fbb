//! Parallel executor scenarios: mixed-outcome best effort, first-success
//! cancellation, aggregation semantics, and the concurrency cap.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::json;

use vigia::domain::errors::{DomainError, DomainResult};
use vigia::domain::models::{AgentMessage, AgentResponse, InvestigationContext};
use vigia::domain::ports::Agent;
use vigia::services::parallel::{
    ExecutorConfig, ParallelExecutor, ParallelStrategy, ParallelTask,
};

struct DelayAgent {
    name: String,
    capabilities: Vec<String>,
    delay: Duration,
    payload: serde_json::Value,
}

#[async_trait]
impl Agent for DelayAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "delayed stub"
    }

    fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    async fn process(
        &self,
        _message: &AgentMessage,
        _context: &InvestigationContext,
    ) -> DomainResult<AgentResponse> {
        tokio::time::sleep(self.delay).await;
        Ok(AgentResponse::completed(&self.name, self.payload.clone()))
    }
}

struct FailingAgent;

#[async_trait]
impl Agent for FailingAgent {
    fn name(&self) -> &str {
        "failing"
    }

    fn description(&self) -> &str {
        "always fails"
    }

    fn capabilities(&self) -> &[String] {
        &[]
    }

    async fn process(
        &self,
        _message: &AgentMessage,
        _context: &InvestigationContext,
    ) -> DomainResult<AgentResponse> {
        Err(DomainError::ExecutionFailed("boom".to_string()))
    }
}

fn agent(name: &str, delay_ms: u64, payload: serde_json::Value) -> Arc<dyn Agent> {
    Arc::new(DelayAgent {
        name: name.to_string(),
        capabilities: vec!["noop".to_string()],
        delay: Duration::from_millis(delay_ms),
        payload,
    })
}

fn message(recipient: &str) -> AgentMessage {
    AgentMessage::new("test", recipient, "noop", json!({}))
}

/// S3 - best effort over mixed outcomes returns every result and
/// aggregates the successful payloads.
#[tokio::test]
async fn best_effort_with_mixed_outcomes() {
    let executor = ParallelExecutor::new(ExecutorConfig::default());
    let context = InvestigationContext::new();

    let tasks = vec![
        ParallelTask::new(
            agent("first", 0, json!({"findings": [{"value": 1}]})),
            message("first"),
        ),
        ParallelTask::new(Arc::new(FailingAgent), message("failing")),
        ParallelTask::new(
            agent("third", 0, json!({"findings": [{"value": 3}]})),
            message("third"),
        ),
    ];

    let results = executor
        .execute_parallel(tasks, &context, ParallelStrategy::BestEffort)
        .await;

    assert_eq!(results.len(), 3);
    assert_eq!(results.iter().filter(|r| r.success).count(), 2);

    let aggregated = executor.aggregate_results(&results, "findings");
    assert_eq!(aggregated.items.len(), 2);
    let values: Vec<i64> = aggregated
        .items
        .iter()
        .filter_map(|i| i.get("value").and_then(serde_json::Value::as_i64))
        .collect();
    assert!(values.contains(&1));
    assert!(values.contains(&3));
}

/// S4 - first success beats the slow sibling; wall time stays bounded.
#[tokio::test]
async fn first_success_beats_slow_task() {
    let executor = ParallelExecutor::new(ExecutorConfig::default());
    let context = InvestigationContext::new();

    let tasks = vec![
        ParallelTask::new(agent("slow", 2000, json!({})), message("slow")),
        ParallelTask::new(agent("fast", 50, json!({})), message("fast")),
    ];

    let start = Instant::now();
    let results = executor
        .execute_parallel(tasks, &context, ParallelStrategy::FirstSuccess)
        .await;
    let elapsed = start.elapsed();

    assert!(results.iter().any(|r| r.success));
    assert!(elapsed < Duration::from_millis(500), "took {elapsed:?}");
}

/// Property 8 - once one result succeeds, no further completed result is
/// appended.
#[tokio::test]
async fn first_success_appends_nothing_after_success() {
    let executor = ParallelExecutor::new(ExecutorConfig::default());
    let context = InvestigationContext::new();

    let tasks: Vec<ParallelTask> = (0..5)
        .map(|i| {
            let delay = if i == 0 { 10 } else { 1500 };
            ParallelTask::new(agent(&format!("agent_{i}"), delay, json!({})), message("a"))
        })
        .collect();

    let results = executor
        .execute_parallel(tasks, &context, ParallelStrategy::FirstSuccess)
        .await;

    // The returned list ends with the first success; slow siblings were
    // aborted and produced no observable result.
    let success_index = results.iter().position(|r| r.success).unwrap();
    assert_eq!(success_index, results.len() - 1);
}

/// Property 7 - the counting semaphore bounds simultaneous tasks.
#[tokio::test]
async fn concurrency_cap_holds_under_load() {
    struct CountingAgent {
        current: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Agent for CountingAgent {
        fn name(&self) -> &str {
            "counting"
        }

        fn description(&self) -> &str {
            "tracks concurrency"
        }

        fn capabilities(&self) -> &[String] {
            &[]
        }

        async fn process(
            &self,
            _message: &AgentMessage,
            _context: &InvestigationContext,
        ) -> DomainResult<AgentResponse> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(AgentResponse::completed("counting", json!({})))
        }
    }

    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let executor = ParallelExecutor::new(ExecutorConfig {
        max_concurrent: 4,
        default_timeout_seconds: 5,
        enable_pooling: false,
    });
    let context = InvestigationContext::new();

    let tasks: Vec<ParallelTask> = (0..20)
        .map(|_| {
            ParallelTask::new(
                Arc::new(CountingAgent {
                    current: current.clone(),
                    peak: peak.clone(),
                }),
                message("counting"),
            )
        })
        .collect();

    let results = executor
        .execute_parallel(tasks, &context, ParallelStrategy::BestEffort)
        .await;

    assert_eq!(results.len(), 20);
    assert!(
        peak.load(Ordering::SeqCst) <= 4,
        "peak concurrency {} exceeded the cap",
        peak.load(Ordering::SeqCst)
    );
}

/// Property 9 - aggregation is empty on no input and additive over
/// concatenation.
#[tokio::test]
async fn aggregation_is_idempotent_and_additive() {
    let executor = ParallelExecutor::new(ExecutorConfig::default());
    let context = InvestigationContext::new();

    let empty = executor.aggregate_results(&[], "findings");
    assert_eq!(empty.total_tasks, 0);
    assert_eq!(empty.successful_tasks, 0);
    assert_eq!(empty.failed_tasks, 0);
    assert!(empty.items.is_empty());

    let first = executor
        .execute_parallel(
            vec![ParallelTask::new(
                agent("a", 0, json!({"findings": [1, 2]})),
                message("a"),
            )],
            &context,
            ParallelStrategy::BestEffort,
        )
        .await;
    let second = executor
        .execute_parallel(
            vec![
                ParallelTask::new(agent("b", 0, json!({"findings": [3]})), message("b")),
                ParallelTask::new(Arc::new(FailingAgent), message("failing")),
            ],
            &context,
            ParallelStrategy::BestEffort,
        )
        .await;

    let agg_first = executor.aggregate_results(&first, "findings");
    let agg_second = executor.aggregate_results(&second, "findings");

    let combined: Vec<_> = first.iter().cloned().chain(second.iter().cloned()).collect();
    let agg_combined = executor.aggregate_results(&combined, "findings");

    assert_eq!(
        agg_combined.total_tasks,
        agg_first.total_tasks + agg_second.total_tasks
    );
    assert_eq!(
        agg_combined.successful_tasks,
        agg_first.successful_tasks + agg_second.successful_tasks
    );
    assert_eq!(
        agg_combined.failed_tasks,
        agg_first.failed_tasks + agg_second.failed_tasks
    );
    assert_eq!(
        agg_combined.items.len(),
        agg_first.items.len() + agg_second.items.len()
    );
}

/// ALL_SUCCEED never aborts siblings on failure; every result returns.
#[tokio::test]
async fn all_succeed_returns_all_results_despite_failure() {
    let executor = ParallelExecutor::new(ExecutorConfig::default());
    let context = InvestigationContext::new();

    let tasks = vec![
        ParallelTask::new(agent("ok", 0, json!({})), message("ok")),
        ParallelTask::new(Arc::new(FailingAgent), message("failing")),
    ];

    let results = executor
        .execute_parallel(tasks, &context, ParallelStrategy::AllSucceed)
        .await;
    assert_eq!(results.len(), 2);
}

/// MAJORITY_VOTE also runs everything; the warning is observational only.
#[tokio::test]
async fn majority_vote_returns_all_results() {
    let executor = ParallelExecutor::new(ExecutorConfig::default());
    let context = InvestigationContext::new();

    let tasks = vec![
        ParallelTask::new(Arc::new(FailingAgent), message("failing")),
        ParallelTask::new(Arc::new(FailingAgent), message("failing")),
        ParallelTask::new(agent("ok", 0, json!({})), message("ok")),
    ];

    let results = executor
        .execute_parallel(tasks, &context, ParallelStrategy::MajorityVote)
        .await;
    assert_eq!(results.len(), 3);
    assert_eq!(results.iter().filter(|r| r.success).count(), 1);
}
