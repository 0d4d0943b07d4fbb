//! Priority task queue with worker pool.
//!
//! Tasks sit on a min-heap keyed by `(priority, enqueued_at)`; a pool of
//! long-lived workers polls the queue, runs registered handlers under
//! timeouts, retries with exponential backoff, and fires best-effort
//! JSON callbacks. Pending tasks optionally persist to sqlite so they
//! survive restarts.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult, QueueError};
use crate::domain::models::{QueueStats, QueuedTask, TaskPriority, TaskResult, TaskState};

/// A registered task handler: `(payload, metadata) -> result`.
pub type TaskHandler = Arc<
    dyn Fn(serde_json::Value, serde_json::Value) -> BoxFuture<'static, DomainResult<serde_json::Value>>
        + Send
        + Sync,
>;

/// Queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Number of long-lived workers.
    pub max_workers: usize,
    /// Soft per-task time limit in seconds (warn when exceeded).
    pub task_soft_time_limit: u64,
    /// Hard per-task time limit in seconds (terminate when exceeded).
    pub task_hard_time_limit: u64,
    /// How long terminal results are retained, in seconds.
    pub result_retention_seconds: u64,
    /// Worker idle poll interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Scale factor applied to the retry backoff (1.0 = real seconds;
    /// tests shrink it).
    pub retry_backoff_scale: f64,
    /// Payload content types workers accept.
    pub accept_content_types: Vec<String>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_workers: 5,
            task_soft_time_limit: 300,
            task_hard_time_limit: 600,
            result_retention_seconds: 3600,
            poll_interval_ms: 100,
            retry_backoff_scale: 1.0,
            accept_content_types: vec!["json".to_string()],
        }
    }
}

/// Heap plus bookkeeping, guarded by one lock.
#[derive(Default)]
struct QueueInner {
    heap: BinaryHeap<Reverse<QueuedTask>>,
    processing: HashMap<Uuid, QueuedTask>,
    completed: HashMap<Uuid, TaskResult>,
    failed: HashMap<Uuid, TaskResult>,
    seq: u64,
    total_processed: u64,
    total_processing_time: f64,
}

/// Shared queue state; each worker holds a clone of this core.
struct QueueCore {
    config: QueueConfig,
    inner: Mutex<QueueInner>,
    handlers: RwLock<HashMap<String, TaskHandler>>,
    running: AtomicBool,
    accepting: AtomicBool,
    http: reqwest::Client,
    /// Optional sqlite pool for durable pending-task state.
    pool: Option<sqlx::SqlitePool>,
}

/// Priority queue service for deferred work.
pub struct PriorityQueueService {
    core: Arc<QueueCore>,
    workers: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl PriorityQueueService {
    pub fn new(config: QueueConfig) -> Self {
        Self::with_options(config, None)
    }

    /// Construct a queue whose pending tasks persist to sqlite.
    pub fn with_pool(config: QueueConfig, pool: sqlx::SqlitePool) -> Self {
        Self::with_options(config, Some(pool))
    }

    fn with_options(config: QueueConfig, pool: Option<sqlx::SqlitePool>) -> Self {
        Self {
            core: Arc::new(QueueCore {
                config,
                inner: Mutex::new(QueueInner::default()),
                handlers: RwLock::new(HashMap::new()),
                running: AtomicBool::new(false),
                accepting: AtomicBool::new(true),
                http: reqwest::Client::new(),
                pool,
            }),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Bind a handler to a task type. One handler per type; the last
    /// registration wins.
    pub async fn register_handler(&self, task_type: impl Into<String>, handler: TaskHandler) {
        let task_type = task_type.into();
        info!(task_type = %task_type, "task handler registered");
        self.core.handlers.write().await.insert(task_type, handler);
    }

    /// Whether a handler is bound to the task type.
    pub async fn has_handler(&self, task_type: &str) -> bool {
        self.core.handlers.read().await.contains_key(task_type)
    }

    /// Enqueue a task. Returns the fresh task id; the task becomes pending.
    #[allow(clippy::too_many_arguments)]
    pub async fn enqueue(
        &self,
        task_type: impl Into<String>,
        payload: serde_json::Value,
        priority: TaskPriority,
        timeout_seconds: Option<u64>,
        max_retries: u32,
        callback_url: Option<String>,
        metadata: Option<serde_json::Value>,
    ) -> DomainResult<Uuid> {
        self.core
            .enqueue(task_type.into(), payload, priority, timeout_seconds, max_retries, callback_url, metadata)
            .await
    }

    /// Pop the highest-priority task and mark it processing.
    pub async fn dequeue(&self) -> Option<QueuedTask> {
        self.core.dequeue().await
    }

    /// Lifecycle state of a task, or `None` when unknown (or expired).
    pub async fn get_task_status(&self, task_id: Uuid) -> Option<TaskState> {
        self.core.get_task_status(task_id).await
    }

    /// Terminal result of a task, or `None` while it is still in flight.
    pub async fn get_task_result(&self, task_id: Uuid) -> Option<TaskResult> {
        self.core.get_task_result(task_id).await
    }

    /// Cancel a pending task. Returns `false` when the task is already
    /// processing (it cannot be cancelled then).
    pub async fn cancel_task(&self, task_id: Uuid) -> bool {
        self.core.cancel_task(task_id).await
    }

    /// Aggregate queue statistics.
    pub async fn get_stats(&self) -> QueueStats {
        self.core.get_stats().await
    }

    /// Drop terminal results older than the retention window.
    pub async fn clear_completed(&self, older_than: Duration) {
        self.core.clear_completed(older_than).await;
    }

    /// Start the worker pool. Idempotent.
    pub async fn start(&self) -> DomainResult<()> {
        if self.core.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.core.accepting.store(true, Ordering::SeqCst);

        self.core.ensure_schema().await?;
        self.core.load_pending().await?;

        let mut workers = self.workers.lock().await;
        for i in 0..self.core.config.max_workers {
            let core = Arc::clone(&self.core);
            workers.push(tokio::spawn(async move {
                core.worker_loop(&format!("worker-{i}")).await;
            }));
        }
        info!(workers = workers.len(), "priority queue started");
        Ok(())
    }

    /// Stop the worker pool: stop accepting enqueues, let each worker
    /// drain its current task, and leave pending tasks in durable state.
    /// Idempotent.
    pub async fn stop(&self) {
        self.core.accepting.store(false, Ordering::SeqCst);
        if !self.core.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let workers: Vec<_> = self.workers.lock().await.drain(..).collect();
        for worker in workers {
            let _ = worker.await;
        }
        info!("priority queue stopped");
    }

    pub fn is_running(&self) -> bool {
        self.core.running.load(Ordering::SeqCst)
    }

    /// Backoff before retry `retry_count + 1`, for inspection in tests
    /// and operational tooling.
    pub fn retry_backoff(&self, retry_count: u32) -> Duration {
        self.core.retry_backoff(retry_count)
    }
}

impl QueueCore {
    #[allow(clippy::too_many_arguments)]
    async fn enqueue(
        &self,
        task_type: String,
        payload: serde_json::Value,
        priority: TaskPriority,
        timeout_seconds: Option<u64>,
        max_retries: u32,
        callback_url: Option<String>,
        metadata: Option<serde_json::Value>,
    ) -> DomainResult<Uuid> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(DomainError::ExecutionFailed(
                QueueError::NotRunning.to_string(),
            ));
        }

        let task_id = Uuid::new_v4();
        let mut inner = self.inner.lock().await;
        inner.seq += 1;
        let task = QueuedTask {
            task_id,
            task_type: task_type.clone(),
            priority,
            enqueued_at: Utc::now(),
            seq: inner.seq,
            payload,
            retry_count: 0,
            max_retries,
            timeout_seconds: timeout_seconds.unwrap_or(self.config.task_soft_time_limit),
            callback_url,
            metadata: metadata.unwrap_or(serde_json::Value::Null),
        };
        let queue_size = inner.heap.len() + 1;
        inner.heap.push(Reverse(task.clone()));
        drop(inner);

        self.persist_task(&task).await;

        info!(
            task_id = %task_id,
            task_type = %task_type,
            priority = priority.as_str(),
            queue_size,
            "task enqueued"
        );

        Ok(task_id)
    }

    async fn dequeue(&self) -> Option<QueuedTask> {
        let mut inner = self.inner.lock().await;
        let Reverse(task) = inner.heap.pop()?;
        inner.processing.insert(task.task_id, task.clone());
        Some(task)
    }

    async fn get_task_status(&self, task_id: Uuid) -> Option<TaskState> {
        let inner = self.inner.lock().await;
        if inner.processing.contains_key(&task_id) {
            return Some(TaskState::Processing);
        }
        if inner.completed.contains_key(&task_id) {
            return Some(TaskState::Completed);
        }
        if inner.failed.contains_key(&task_id) {
            return Some(TaskState::Failed);
        }
        if inner.heap.iter().any(|Reverse(t)| t.task_id == task_id) {
            return Some(TaskState::Pending);
        }
        None
    }

    async fn get_task_result(&self, task_id: Uuid) -> Option<TaskResult> {
        let inner = self.inner.lock().await;
        inner
            .completed
            .get(&task_id)
            .or_else(|| inner.failed.get(&task_id))
            .cloned()
    }

    async fn cancel_task(&self, task_id: Uuid) -> bool {
        let cancellable = {
            let mut inner = self.inner.lock().await;
            let tasks: Vec<QueuedTask> = std::mem::take(&mut inner.heap)
                .into_iter()
                .map(|Reverse(t)| t)
                .filter(|t| t.task_id != task_id)
                .collect();
            inner.heap = tasks.into_iter().map(Reverse).collect();
            !inner.processing.contains_key(&task_id)
        };
        if cancellable {
            self.delete_task_row(task_id).await;
        }
        cancellable
    }

    async fn get_stats(&self) -> QueueStats {
        let inner = self.inner.lock().await;

        let mut tasks_by_priority: HashMap<String, usize> = HashMap::new();
        let mut tasks_by_type: HashMap<String, usize> = HashMap::new();
        for Reverse(task) in &inner.heap {
            *tasks_by_priority
                .entry(task.priority.as_str().to_string())
                .or_insert(0) += 1;
            *tasks_by_type.entry(task.task_type.clone()).or_insert(0) += 1;
        }

        QueueStats {
            pending_tasks: inner.heap.len(),
            processing_tasks: inner.processing.len(),
            completed_tasks: inner.completed.len(),
            failed_tasks: inner.failed.len(),
            total_processed: inner.total_processed,
            average_processing_time: if inner.total_processed > 0 {
                inner.total_processing_time / inner.total_processed as f64
            } else {
                0.0
            },
            tasks_by_priority,
            tasks_by_type,
        }
    }

    async fn clear_completed(&self, older_than: Duration) {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(older_than).unwrap_or_else(|_| chrono::Duration::zero());
        let mut inner = self.inner.lock().await;
        inner.completed.retain(|_, r| r.completed_at > cutoff);
        inner.failed.retain(|_, r| r.completed_at > cutoff);
        info!(
            remaining_completed = inner.completed.len(),
            remaining_failed = inner.failed.len(),
            "old task results cleared"
        );
    }

    async fn worker_loop(&self, worker_id: &str) {
        info!(worker_id, "worker started");
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);

        while self.running.load(Ordering::SeqCst) {
            match self.dequeue().await {
                Some(task) => self.process_task(task, worker_id).await,
                None => tokio::time::sleep(poll_interval).await,
            }
        }

        info!(worker_id, "worker stopped");
    }

    async fn process_task(&self, task: QueuedTask, worker_id: &str) {
        let started_at = Utc::now();
        info!(
            worker_id,
            task_id = %task.task_id,
            task_type = %task.task_type,
            "task processing started"
        );

        let handler = self.handlers.read().await.get(&task.task_type).cloned();
        let Some(handler) = handler else {
            // No retry for an unroutable task.
            let error = QueueError::NoHandler(task.task_type.clone()).to_string();
            error!(worker_id, task_id = %task.task_id, error = %error, "task failed");
            self.record_terminal_failure(&task, error, started_at).await;
            return;
        };

        let timeout =
            Duration::from_secs(task.timeout_seconds.min(self.config.task_hard_time_limit));
        let outcome = tokio::time::timeout(
            timeout,
            handler(task.payload.clone(), task.metadata.clone()),
        )
        .await;

        let completed_at = Utc::now();
        let duration = (completed_at - started_at).as_seconds_f64();

        match outcome {
            Ok(Ok(result)) => {
                if duration > self.config.task_soft_time_limit as f64 {
                    warn!(
                        task_id = %task.task_id,
                        duration_seconds = duration,
                        soft_limit = self.config.task_soft_time_limit,
                        "task exceeded soft time limit"
                    );
                }

                let task_result = TaskResult {
                    task_id: task.task_id,
                    status: TaskState::Completed,
                    result: Some(result),
                    error: None,
                    started_at,
                    completed_at,
                    duration_seconds: duration,
                    retry_count: task.retry_count,
                };

                {
                    let mut inner = self.inner.lock().await;
                    inner.completed.insert(task.task_id, task_result.clone());
                    inner.processing.remove(&task.task_id);
                    inner.total_processed += 1;
                    inner.total_processing_time += duration;
                }
                self.delete_task_row(task.task_id).await;

                info!(
                    worker_id,
                    task_id = %task.task_id,
                    duration_seconds = duration,
                    "task completed"
                );

                if task.callback_url.is_some() {
                    self.execute_callback(&task, &task_result).await;
                }
            }
            Ok(Err(e)) => {
                self.handle_task_failure(task, worker_id, e.to_string(), started_at)
                    .await;
            }
            Err(_) => {
                // Hard expiry is a retryable failure.
                self.handle_task_failure(
                    task,
                    worker_id,
                    format!("Task timeout after {} seconds", timeout.as_secs()),
                    started_at,
                )
                .await;
            }
        }
    }

    /// Retry with exponential backoff, or mark terminally failed once the
    /// retry budget is exhausted.
    async fn handle_task_failure(
        &self,
        mut task: QueuedTask,
        worker_id: &str,
        error: String,
        started_at: DateTime<Utc>,
    ) {
        if task.retry_count < task.max_retries {
            let backoff = self.retry_backoff(task.retry_count);
            tokio::time::sleep(backoff).await;

            task.retry_count += 1;
            warn!(
                worker_id,
                task_id = %task.task_id,
                retry_count = task.retry_count,
                error = %error,
                "task retry"
            );

            // Re-push at the original priority.
            {
                let mut inner = self.inner.lock().await;
                inner.processing.remove(&task.task_id);
                inner.heap.push(Reverse(task.clone()));
            }
            self.persist_task(&task).await;
        } else {
            error!(
                worker_id,
                task_id = %task.task_id,
                retry_count = task.retry_count,
                error = %error,
                "task failed"
            );
            self.record_terminal_failure(&task, error, started_at).await;
        }
    }

    /// Backoff before retry `retry_count + 1`: `min(2^retry_count, 60)`
    /// seconds, scaled by configuration.
    fn retry_backoff(&self, retry_count: u32) -> Duration {
        let secs = 2f64.powi(i32::try_from(retry_count).unwrap_or(i32::MAX)).min(60.0);
        Duration::from_secs_f64(secs * self.config.retry_backoff_scale)
    }

    async fn record_terminal_failure(
        &self,
        task: &QueuedTask,
        error: String,
        started_at: DateTime<Utc>,
    ) {
        let completed_at = Utc::now();
        let task_result = TaskResult {
            task_id: task.task_id,
            status: TaskState::Failed,
            result: None,
            error: Some(error),
            started_at,
            completed_at,
            duration_seconds: (completed_at - started_at).as_seconds_f64(),
            retry_count: task.retry_count,
        };

        {
            let mut inner = self.inner.lock().await;
            inner.failed.insert(task.task_id, task_result.clone());
            inner.processing.remove(&task.task_id);
        }
        self.delete_task_row(task.task_id).await;

        if task.callback_url.is_some() {
            self.execute_callback(task, &task_result).await;
        }
    }

    /// Best-effort JSON POST to the task's callback URL. Failures are
    /// logged, never retried.
    async fn execute_callback(&self, task: &QueuedTask, result: &TaskResult) {
        let Some(ref url) = task.callback_url else {
            return;
        };

        let envelope = serde_json::json!({
            "task_id": task.task_id,
            "task_type": task.task_type,
            "status": result.status.as_str(),
            "result": result.result,
            "error": result.error,
            "duration_seconds": result.duration_seconds,
        });

        match self
            .http
            .post(url)
            .json(&envelope)
            .timeout(Duration::from_secs(30))
            .send()
            .await
        {
            Ok(_) => info!(task_id = %task.task_id, callback = %url, "callback executed"),
            Err(e) => error!(
                task_id = %task.task_id,
                callback = %url,
                error = %e,
                "callback failed"
            ),
        }
    }

    // ------------------------------------------------------------------
    // Durable state. No-ops when no pool is attached.
    // ------------------------------------------------------------------

    async fn ensure_schema(&self) -> DomainResult<()> {
        let Some(ref pool) = self.pool else {
            return Ok(());
        };
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS priority_tasks (
                task_id TEXT PRIMARY KEY,
                task_type TEXT NOT NULL,
                priority INTEGER NOT NULL,
                enqueued_at TEXT NOT NULL,
                seq INTEGER NOT NULL,
                payload TEXT NOT NULL,
                retry_count INTEGER NOT NULL,
                max_retries INTEGER NOT NULL,
                timeout_seconds INTEGER NOT NULL,
                callback_url TEXT,
                metadata TEXT NOT NULL,
                status TEXT NOT NULL
            )",
        )
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Load pending rows left over from a previous run into the heap.
    async fn load_pending(&self) -> DomainResult<()> {
        let Some(ref pool) = self.pool else {
            return Ok(());
        };

        let rows = sqlx::query_as::<_, TaskRow>(
            "SELECT task_id, task_type, priority, enqueued_at, seq, payload,
                    retry_count, max_retries, timeout_seconds, callback_url, metadata
             FROM priority_tasks WHERE status = 'pending'",
        )
        .fetch_all(pool)
        .await?;

        let mut inner = self.inner.lock().await;
        let mut loaded = 0usize;
        for row in rows {
            if let Some(task) = row.into_task() {
                if inner.heap.iter().any(|Reverse(t)| t.task_id == task.task_id) {
                    continue;
                }
                inner.seq = inner.seq.max(task.seq);
                inner.heap.push(Reverse(task));
                loaded += 1;
            }
        }
        if loaded > 0 {
            info!(loaded, "pending tasks loaded from durable state");
        }
        Ok(())
    }

    async fn persist_task(&self, task: &QueuedTask) {
        let Some(ref pool) = self.pool else {
            return;
        };
        let payload = task.payload.to_string();
        let metadata = task.metadata.to_string();
        if let Err(e) = sqlx::query(
            "INSERT OR REPLACE INTO priority_tasks
             (task_id, task_type, priority, enqueued_at, seq, payload,
              retry_count, max_retries, timeout_seconds, callback_url, metadata, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 'pending')",
        )
        .bind(task.task_id.to_string())
        .bind(&task.task_type)
        .bind(i64::from(task.priority.level()))
        .bind(task.enqueued_at.to_rfc3339())
        .bind(task.seq as i64)
        .bind(payload)
        .bind(i64::from(task.retry_count))
        .bind(i64::from(task.max_retries))
        .bind(task.timeout_seconds as i64)
        .bind(&task.callback_url)
        .bind(metadata)
        .execute(pool)
        .await
        {
            warn!(task_id = %task.task_id, error = %e, "failed to persist task");
        }
    }

    async fn delete_task_row(&self, task_id: Uuid) {
        let Some(ref pool) = self.pool else {
            return;
        };
        if let Err(e) = sqlx::query("DELETE FROM priority_tasks WHERE task_id = ?1")
            .bind(task_id.to_string())
            .execute(pool)
            .await
        {
            warn!(task_id = %task_id, error = %e, "failed to delete task row");
        }
    }
}

/// Row from the `priority_tasks` table.
#[derive(sqlx::FromRow)]
struct TaskRow {
    task_id: String,
    task_type: String,
    priority: i64,
    enqueued_at: String,
    seq: i64,
    payload: String,
    retry_count: i64,
    max_retries: i64,
    timeout_seconds: i64,
    callback_url: Option<String>,
    metadata: String,
}

impl TaskRow {
    fn into_task(self) -> Option<QueuedTask> {
        Some(QueuedTask {
            task_id: Uuid::parse_str(&self.task_id).ok()?,
            task_type: self.task_type,
            priority: TaskPriority::from_level(u8::try_from(self.priority).ok()?)?,
            enqueued_at: DateTime::parse_from_rfc3339(&self.enqueued_at)
                .ok()?
                .with_timezone(&Utc),
            seq: u64::try_from(self.seq).ok()?,
            payload: serde_json::from_str(&self.payload).ok()?,
            retry_count: u32::try_from(self.retry_count).ok()?,
            max_retries: u32::try_from(self.max_retries).ok()?,
            timeout_seconds: u64::try_from(self.timeout_seconds).ok()?,
            callback_url: self.callback_url,
            metadata: serde_json::from_str(&self.metadata).unwrap_or(serde_json::Value::Null),
        })
    }
}
