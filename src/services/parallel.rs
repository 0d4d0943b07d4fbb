//! Parallel agent task execution.
//!
//! Fans out agent invocations under a counting semaphore, with per-task
//! timeouts, optional fallbacks, and strategy-specific completion
//! semantics. FIRST_SUCCESS cancels siblings as soon as one result
//! succeeds; the other strategies always run every task to completion.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::domain::errors::DomainResult;
use crate::domain::models::{AgentMessage, AgentResponse, InvestigationContext};
use crate::domain::ports::Agent;

/// Strategy governing fan-out semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParallelStrategy {
    /// All tasks must succeed; failures are logged but siblings never abort.
    AllSucceed,
    /// Continue even if some tasks fail.
    BestEffort,
    /// Return as soon as one task succeeds; cancel the rest.
    FirstSuccess,
    /// Log a warning when successes fall below a majority.
    MajorityVote,
}

/// Fallback invoked when an agent call raises.
pub type FallbackFn =
    Arc<dyn Fn() -> BoxFuture<'static, DomainResult<AgentResponse>> + Send + Sync>;

/// A task to be executed in parallel.
#[derive(Clone)]
pub struct ParallelTask {
    pub agent: Arc<dyn Agent>,
    pub message: AgentMessage,
    /// Per-task timeout; the executor default applies when absent.
    pub timeout: Option<Duration>,
    /// Weight for weighted aggregation.
    pub weight: f64,
    /// Optional fallback when the agent call raises.
    pub fallback: Option<FallbackFn>,
}

impl ParallelTask {
    pub fn new(agent: Arc<dyn Agent>, message: AgentMessage) -> Self {
        Self {
            agent,
            message,
            timeout: None,
            weight: 1.0,
            fallback: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_fallback(mut self, fallback: FallbackFn) -> Self {
        self.fallback = Some(fallback);
        self
    }
}

/// Result from one parallel task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelResult {
    pub task_id: String,
    pub agent_name: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<AgentResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock execution time in seconds.
    pub execution_time: f64,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Aggregated view over a batch of parallel results.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregatedResults {
    pub total_tasks: usize,
    pub successful_tasks: usize,
    pub failed_tasks: usize,
    pub total_execution_time: f64,
    pub results_by_agent: HashMap<String, Vec<AgentResponse>>,
    /// Field the aggregation flattened from successful payloads.
    pub aggregation_key: String,
    /// Flattened values under the aggregation key.
    pub items: Vec<serde_json::Value>,
}

/// Running executor statistics.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ExecutorStats {
    pub total_tasks: u64,
    pub successful_tasks: u64,
    pub failed_tasks: u64,
    pub total_time: f64,
    pub avg_success_rate: f64,
    pub avg_execution_time: f64,
}

/// Executor configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Maximum concurrently running tasks.
    pub max_concurrent: usize,
    /// Default per-task timeout in seconds.
    pub default_timeout_seconds: u64,
    /// Whether agent instances are leased from the pool.
    pub enable_pooling: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            default_timeout_seconds: 30,
            enable_pooling: true,
        }
    }
}

#[derive(Debug, Default)]
struct StatsInner {
    total_tasks: u64,
    successful_tasks: u64,
    failed_tasks: u64,
    total_time: f64,
}

/// Processor for executing multiple agent tasks in parallel.
pub struct ParallelExecutor {
    config: ExecutorConfig,
    semaphore: Arc<Semaphore>,
    stats: Mutex<StatsInner>,
    /// Pool lending agent instances when pooling is enabled.
    pool: Option<Arc<crate::services::registry::AgentPool>>,
}

impl ParallelExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(config.max_concurrent)),
            config,
            stats: Mutex::new(StatsInner::default()),
            pool: None,
        }
    }

    /// Attach an agent pool; leases are taken per task when
    /// `enable_pooling` is set.
    pub fn with_pool(mut self, pool: Arc<crate::services::registry::AgentPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Execute tasks under the given strategy and return their results.
    pub async fn execute_parallel(
        &self,
        tasks: Vec<ParallelTask>,
        context: &InvestigationContext,
        strategy: ParallelStrategy,
    ) -> Vec<ParallelResult> {
        let start = Instant::now();
        let task_count = tasks.len();
        {
            let mut stats = self.stats.lock().expect("stats lock poisoned");
            stats.total_tasks += task_count as u64;
        }

        info!(
            tasks = task_count,
            strategy = ?strategy,
            investigation_id = %context.investigation_id,
            "starting parallel execution"
        );

        let pool = if self.config.enable_pooling {
            self.pool.clone()
        } else {
            None
        };
        let handles: Vec<tokio::task::JoinHandle<ParallelResult>> = tasks
            .into_iter()
            .enumerate()
            .map(|(i, task)| {
                let task_id = format!("{}_{}", context.investigation_id, i);
                let semaphore = self.semaphore.clone();
                let default_timeout = Duration::from_secs(self.config.default_timeout_seconds);
                let context = context.clone();
                let pool = pool.clone();
                tokio::spawn(async move {
                    execute_single_task(task_id, task, &context, semaphore, default_timeout, pool)
                        .await
                })
            })
            .collect();

        let results = match strategy {
            ParallelStrategy::FirstSuccess => Self::collect_first_success(handles).await,
            _ => Self::collect_all(handles).await,
        };

        match strategy {
            ParallelStrategy::AllSucceed => {
                if results.iter().any(|r| !r.success) {
                    warn!("not all tasks succeeded under all_succeed strategy");
                }
            }
            ParallelStrategy::MajorityVote => {
                let successes = results.iter().filter(|r| r.success).count();
                if successes * 2 < results.len() {
                    warn!(successes, total = results.len(), "majority vote failed");
                }
            }
            _ => {}
        }

        let elapsed = start.elapsed().as_secs_f64();
        let successes = results.iter().filter(|r| r.success).count() as u64;
        {
            let mut stats = self.stats.lock().expect("stats lock poisoned");
            stats.total_time += elapsed;
            stats.successful_tasks += successes;
            stats.failed_tasks += results.len() as u64 - successes;
        }

        info!(
            results = results.len(),
            successes,
            elapsed_secs = elapsed,
            "parallel execution completed"
        );

        results
    }

    /// Await every handle; panicked tasks become failure results.
    async fn collect_all(
        handles: Vec<tokio::task::JoinHandle<ParallelResult>>,
    ) -> Vec<ParallelResult> {
        let mut results = Vec::with_capacity(handles.len());
        for (i, handle) in handles.into_iter().enumerate() {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => results.push(ParallelResult {
                    task_id: format!("task_{i}"),
                    agent_name: "unknown".to_string(),
                    success: false,
                    result: None,
                    error: Some(e.to_string()),
                    execution_time: 0.0,
                    metadata: HashMap::new(),
                }),
            }
        }
        results
    }

    /// Await handles as they complete; abort the rest after the first
    /// success. Cancelled tasks produce no observable result.
    async fn collect_first_success(
        handles: Vec<tokio::task::JoinHandle<ParallelResult>>,
    ) -> Vec<ParallelResult> {
        let mut pending: FuturesUnordered<_> = handles.into_iter().collect();
        let mut results = Vec::new();

        while let Some(joined) = pending.next().await {
            match joined {
                Ok(result) => {
                    let success = result.success;
                    results.push(result);
                    if success {
                        for handle in pending.iter() {
                            handle.abort();
                        }
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "task join failed"),
            }
        }

        results
    }

    /// Aggregate a batch of results, flattening `aggregation_key` from each
    /// successful payload (accepting either a list or a scalar).
    pub fn aggregate_results(
        &self,
        results: &[ParallelResult],
        aggregation_key: &str,
    ) -> AggregatedResults {
        let mut aggregated = AggregatedResults {
            total_tasks: results.len(),
            successful_tasks: results.iter().filter(|r| r.success).count(),
            failed_tasks: results.iter().filter(|r| !r.success).count(),
            total_execution_time: results.iter().map(|r| r.execution_time).sum(),
            results_by_agent: HashMap::new(),
            aggregation_key: aggregation_key.to_string(),
            items: Vec::new(),
        };

        for result in results {
            let Some(response) = result.result.as_ref().filter(|_| result.success) else {
                continue;
            };

            aggregated
                .results_by_agent
                .entry(result.agent_name.clone())
                .or_default()
                .push(response.clone());

            if let Some(payload) = response.result.as_ref().and_then(|v| v.get(aggregation_key)) {
                match payload {
                    serde_json::Value::Array(items) => {
                        aggregated.items.extend(items.iter().cloned());
                    }
                    other => aggregated.items.push(other.clone()),
                }
            }
        }

        aggregated
    }

    /// Snapshot of the running statistics.
    pub fn stats(&self) -> ExecutorStats {
        let stats = self.stats.lock().expect("stats lock poisoned");
        let total = stats.total_tasks;
        ExecutorStats {
            total_tasks: total,
            successful_tasks: stats.successful_tasks,
            failed_tasks: stats.failed_tasks,
            total_time: stats.total_time,
            avg_success_rate: if total > 0 {
                stats.successful_tasks as f64 / total as f64
            } else {
                0.0
            },
            avg_execution_time: if total > 0 {
                stats.total_time / total as f64
            } else {
                0.0
            },
        }
    }
}

/// Run one task: acquire a slot, lease (or reuse) the agent, invoke it
/// under its timeout, fall back if configured, and record timing.
async fn execute_single_task(
    task_id: String,
    task: ParallelTask,
    context: &InvestigationContext,
    semaphore: Arc<Semaphore>,
    default_timeout: Duration,
    pool: Option<Arc<crate::services::registry::AgentPool>>,
) -> ParallelResult {
    let _permit = semaphore
        .acquire_owned()
        .await
        .expect("executor semaphore closed");
    let start = Instant::now();
    let agent_name = task.agent.name().to_string();
    let timeout = task.timeout.unwrap_or(default_timeout);

    // The lease keeps the pool's in-flight gauge honest for the duration
    // of the call; it releases on drop.
    let lease = match pool {
        Some(pool) => pool.acquire(&agent_name).await.ok(),
        None => None,
    };
    let agent: Arc<dyn Agent> = lease
        .as_ref()
        .map_or_else(|| task.agent.clone(), |lease| lease.agent().clone());

    let outcome = run_agent_task(agent.as_ref(), &task.message, context, timeout).await;

    match outcome {
        Ok(response) => {
            let success = response.is_success();
            let error = if success { None } else { response.error.clone() };
            let mut metadata = HashMap::new();
            metadata.insert(
                "task_type".to_string(),
                serde_json::Value::String(agent_name.clone()),
            );
            ParallelResult {
                task_id,
                agent_name,
                success,
                result: Some(response),
                error,
                execution_time: start.elapsed().as_secs_f64(),
                metadata,
            }
        }
        Err(e) => {
            warn!(task_id = %task_id, error = %e, "task failed");

            if let Some(fallback) = task.fallback {
                match fallback().await {
                    Ok(response) => {
                        let mut metadata = HashMap::new();
                        metadata.insert("used_fallback".to_string(), serde_json::Value::Bool(true));
                        return ParallelResult {
                            task_id,
                            agent_name: "fallback".to_string(),
                            success: true,
                            result: Some(response),
                            error: None,
                            execution_time: start.elapsed().as_secs_f64(),
                            metadata,
                        };
                    }
                    Err(fb_error) => {
                        warn!(task_id = %task_id, error = %fb_error, "fallback also failed");
                    }
                }
            }

            ParallelResult {
                task_id,
                agent_name,
                success: false,
                result: None,
                error: Some(e.to_string()),
                execution_time: start.elapsed().as_secs_f64(),
                metadata: HashMap::new(),
            }
        }
    }
}

/// Invoke the agent under a cooperative timeout. Timeout expiry yields a
/// synthetic error response rather than an `Err`.
async fn run_agent_task(
    agent: &dyn Agent,
    message: &AgentMessage,
    context: &InvestigationContext,
    timeout: Duration,
) -> DomainResult<AgentResponse> {
    match tokio::time::timeout(timeout, agent.process(message, context)).await {
        Ok(result) => result,
        Err(_) => {
            warn!(agent = agent.name(), timeout_secs = timeout.as_secs(), "agent timed out");
            Ok(AgentResponse::error(
                agent.name(),
                format!("Timeout after {} seconds", timeout.as_secs()),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::domain::errors::DomainError;

    /// Agent that completes after an optional delay.
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
            "delay"
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

    /// Agent whose process call raises.
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
        AgentMessage::new("test", recipient, "noop", serde_json::json!({}))
    }

    #[tokio::test]
    async fn test_best_effort_returns_all_results() {
        let executor = ParallelExecutor::new(ExecutorConfig::default());
        let context = InvestigationContext::new();

        let tasks = vec![
            ParallelTask::new(agent("a", 0, serde_json::json!({"findings": [1]})), message("a")),
            ParallelTask::new(Arc::new(FailingAgent), message("failing")),
            ParallelTask::new(agent("c", 0, serde_json::json!({"findings": [3]})), message("c")),
        ];

        let results = executor
            .execute_parallel(tasks, &context, ParallelStrategy::BestEffort)
            .await;

        assert_eq!(results.len(), 3);
        assert_eq!(results.iter().filter(|r| r.success).count(), 2);
    }

    #[tokio::test]
    async fn test_timeout_produces_synthetic_error() {
        let executor = ParallelExecutor::new(ExecutorConfig {
            max_concurrent: 2,
            default_timeout_seconds: 30,
            enable_pooling: false,
        });
        let context = InvestigationContext::new();

        let tasks = vec![ParallelTask::new(
            agent("slow", 500, serde_json::json!({})),
            message("slow"),
        )
        .with_timeout(Duration::from_millis(20))];

        let results = executor
            .execute_parallel(tasks, &context, ParallelStrategy::BestEffort)
            .await;

        assert_eq!(results.len(), 1);
        assert!(!results[0].success);
        let err = results[0].error.as_deref().unwrap();
        assert!(err.contains("Timeout after"), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn test_fallback_used_on_failure() {
        let executor = ParallelExecutor::new(ExecutorConfig::default());
        let context = InvestigationContext::new();

        let fallback: FallbackFn = Arc::new(|| {
            Box::pin(async {
                Ok(AgentResponse::completed(
                    "fallback",
                    serde_json::json!({"findings": ["from_fallback"]}),
                ))
            })
        });

        let tasks = vec![
            ParallelTask::new(Arc::new(FailingAgent), message("failing")).with_fallback(fallback),
        ];

        let results = executor
            .execute_parallel(tasks, &context, ParallelStrategy::BestEffort)
            .await;

        assert_eq!(results.len(), 1);
        assert!(results[0].success);
        assert_eq!(
            results[0].metadata.get("used_fallback"),
            Some(&serde_json::Value::Bool(true))
        );
    }

    #[tokio::test]
    async fn test_first_success_cancels_slow_sibling() {
        let executor = ParallelExecutor::new(ExecutorConfig::default());
        let context = InvestigationContext::new();

        let tasks = vec![
            ParallelTask::new(agent("slow", 2000, serde_json::json!({})), message("slow")),
            ParallelTask::new(agent("fast", 50, serde_json::json!({})), message("fast")),
        ];

        let start = Instant::now();
        let results = executor
            .execute_parallel(tasks, &context, ParallelStrategy::FirstSuccess)
            .await;

        assert!(results.iter().any(|r| r.success));
        assert!(
            start.elapsed() < Duration::from_millis(500),
            "first_success took {:?}",
            start.elapsed()
        );
    }

    #[tokio::test]
    async fn test_concurrency_cap_respected() {
        use std::sync::atomic::{AtomicUsize, Ordering};

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
                tokio::time::sleep(Duration::from_millis(30)).await;
                self.current.fetch_sub(1, Ordering::SeqCst);
                Ok(AgentResponse::completed("counting", serde_json::json!({})))
            }
        }

        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let executor = ParallelExecutor::new(ExecutorConfig {
            max_concurrent: 3,
            default_timeout_seconds: 5,
            enable_pooling: false,
        });
        let context = InvestigationContext::new();

        let tasks: Vec<ParallelTask> = (0..10)
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

        assert_eq!(results.len(), 10);
        assert!(peak.load(Ordering::SeqCst) <= 3, "peak {}", peak.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_aggregate_results_flattens_key() {
        let executor = ParallelExecutor::new(ExecutorConfig::default());
        let context = InvestigationContext::new();

        let tasks = vec![
            ParallelTask::new(
                agent("a", 0, serde_json::json!({"findings": [{"x": 1}, {"x": 2}]})),
                message("a"),
            ),
            ParallelTask::new(
                agent("b", 0, serde_json::json!({"findings": {"x": 3}})),
                message("b"),
            ),
            ParallelTask::new(Arc::new(FailingAgent), message("failing")),
        ];

        let results = executor
            .execute_parallel(tasks, &context, ParallelStrategy::BestEffort)
            .await;
        let aggregated = executor.aggregate_results(&results, "findings");

        assert_eq!(aggregated.total_tasks, 3);
        assert_eq!(aggregated.successful_tasks, 2);
        assert_eq!(aggregated.failed_tasks, 1);
        assert_eq!(aggregated.items.len(), 3); // two from list + one scalar
        assert_eq!(aggregated.results_by_agent.len(), 2);
    }

    #[test]
    fn test_aggregate_empty_results() {
        let executor = ParallelExecutor::new(ExecutorConfig::default());
        let aggregated = executor.aggregate_results(&[], "findings");
        assert_eq!(aggregated.total_tasks, 0);
        assert_eq!(aggregated.successful_tasks, 0);
        assert!(aggregated.items.is_empty());
        assert!(aggregated.results_by_agent.is_empty());
    }

    #[tokio::test]
    async fn test_pooling_leases_and_releases() {
        use crate::services::registry::{AgentPool, AgentRegistry};

        let registry = Arc::new(AgentRegistry::new());
        registry
            .register(agent("pooled", 0, serde_json::json!({})))
            .await;
        let pool = Arc::new(AgentPool::new(registry.clone()));

        let executor = ParallelExecutor::new(ExecutorConfig::default()).with_pool(pool.clone());
        let context = InvestigationContext::new();

        let tasks = vec![
            ParallelTask::new(registry.get("pooled").await.unwrap(), message("pooled")),
            ParallelTask::new(registry.get("pooled").await.unwrap(), message("pooled")),
        ];
        let results = executor
            .execute_parallel(tasks, &context, ParallelStrategy::BestEffort)
            .await;

        assert_eq!(results.iter().filter(|r| r.success).count(), 2);
        assert_eq!(pool.leases_total(), 2);
        assert_eq!(pool.in_flight(), 0, "all leases must release");
    }

    #[tokio::test]
    async fn test_stats_accumulate() {
        let executor = ParallelExecutor::new(ExecutorConfig::default());
        let context = InvestigationContext::new();

        let tasks = vec![
            ParallelTask::new(agent("a", 0, serde_json::json!({})), message("a")),
            ParallelTask::new(Arc::new(FailingAgent), message("failing")),
        ];
        executor
            .execute_parallel(tasks, &context, ParallelStrategy::BestEffort)
            .await;

        let stats = executor.stats();
        assert_eq!(stats.total_tasks, 2);
        assert_eq!(stats.successful_tasks, 1);
        assert_eq!(stats.failed_tasks, 1);
        assert!((stats.avg_success_rate - 0.5).abs() < f64::EPSILON);
    }
}
