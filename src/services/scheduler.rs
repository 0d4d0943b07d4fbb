//! Periodic task scheduler.
//!
//! Registers named interval schedules and enqueues the corresponding task
//! when due. A single tick loop wakes on a fixed interval, checks every
//! active schedule, and dispatches through the priority queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::domain::models::TaskPriority;
use crate::services::queue::PriorityQueueService;

/// A registered periodic schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleEntry {
    /// Unique schedule name (dedup key).
    pub name: String,
    /// Firing interval.
    pub interval_seconds: u64,
    /// Task type enqueued when due.
    pub task_type: String,
    /// Task payload.
    pub payload: serde_json::Value,
    /// Priority of the enqueued task.
    pub priority: TaskPriority,
    pub active: bool,
    pub last_fired: Option<DateTime<Utc>>,
    pub fire_count: u64,
}

impl ScheduleEntry {
    /// An interval schedule that first fires one interval after
    /// registration.
    pub fn interval(
        name: impl Into<String>,
        interval: Duration,
        task_type: impl Into<String>,
        payload: serde_json::Value,
        priority: TaskPriority,
    ) -> Self {
        Self {
            name: name.into(),
            interval_seconds: interval.as_secs(),
            task_type: task_type.into(),
            payload,
            priority,
            active: true,
            last_fired: Some(Utc::now()),
            fire_count: 0,
        }
    }

    fn is_due(&self, now: DateTime<Utc>) -> bool {
        if !self.active {
            return false;
        }
        match self.last_fired {
            None => true,
            Some(last) => {
                now.signed_duration_since(last)
                    >= chrono::Duration::seconds(i64::try_from(self.interval_seconds).unwrap_or(i64::MAX))
            }
        }
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Tick interval in milliseconds.
    pub tick_interval_ms: u64,
    /// Maximum number of schedules.
    pub max_schedules: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            max_schedules: 100,
        }
    }
}

/// Single-loop periodic scheduler over the priority queue.
pub struct PeriodicScheduler {
    queue: Arc<PriorityQueueService>,
    config: SchedulerConfig,
    schedules: Arc<RwLock<Vec<ScheduleEntry>>>,
    running: Arc<AtomicBool>,
}

impl PeriodicScheduler {
    pub fn new(queue: Arc<PriorityQueueService>, config: SchedulerConfig) -> Self {
        Self {
            queue,
            config,
            schedules: Arc::new(RwLock::new(Vec::new())),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Register a schedule. Deduplicates by name; returns false when the
    /// name already exists or the schedule limit is reached.
    pub async fn register(&self, entry: ScheduleEntry) -> bool {
        let mut schedules = self.schedules.write().await;
        if schedules.iter().any(|s| s.name == entry.name) {
            return false;
        }
        if schedules.len() >= self.config.max_schedules {
            warn!(
                max = self.config.max_schedules,
                "max schedules reached, rejecting"
            );
            return false;
        }
        info!(name = %entry.name, interval_seconds = entry.interval_seconds, "schedule registered");
        schedules.push(entry);
        true
    }

    /// Deactivate a schedule by name. Returns true when found.
    pub async fn cancel(&self, name: &str) -> bool {
        let mut schedules = self.schedules.write().await;
        match schedules.iter_mut().find(|s| s.name == name) {
            Some(entry) => {
                entry.active = false;
                true
            }
            None => false,
        }
    }

    /// Snapshot of all schedules.
    pub async fn list(&self) -> Vec<ScheduleEntry> {
        self.schedules.read().await.clone()
    }

    /// Register the built-in operational schedules.
    ///
    /// Covers result cleanup, health pings, contract monitoring, priority
    /// organisations, weekly historical reanalysis, and the external
    /// dispensa source.
    pub async fn register_builtin_schedules(&self) -> usize {
        let hour = 3600;
        let entries = vec![
            ScheduleEntry::interval(
                "cleanup-old-results",
                Duration::from_secs(24 * hour),
                "maintenance.cleanup_results",
                serde_json::json!({ "retention_days": 7 }),
                TaskPriority::Normal,
            ),
            ScheduleEntry::interval(
                "health-check",
                Duration::from_secs(5 * 60),
                "system.health_ping",
                serde_json::json!({}),
                TaskPriority::High,
            ),
            ScheduleEntry::interval(
                "auto-monitor-new-contracts-6h",
                Duration::from_secs(6 * hour),
                "monitor.new_contracts",
                serde_json::json!({ "lookback_hours": 6 }),
                TaskPriority::Normal,
            ),
            ScheduleEntry::interval(
                "auto-monitor-priority-orgs-4h",
                Duration::from_secs(4 * hour),
                "monitor.priority_organisations",
                serde_json::json!({}),
                TaskPriority::High,
            ),
            ScheduleEntry::interval(
                "auto-reanalyze-historical-weekly",
                Duration::from_secs(7 * 24 * hour),
                "monitor.historical_reanalysis",
                serde_json::json!({ "months_back": 6, "batch_size": 100 }),
                TaskPriority::Low,
            ),
            ScheduleEntry::interval(
                "auto-investigation-health-hourly",
                Duration::from_secs(hour),
                "monitor.health_probe",
                serde_json::json!({}),
                TaskPriority::High,
            ),
            ScheduleEntry::interval(
                "dispensa-scan-6h",
                Duration::from_secs(6 * hour),
                "dispensa.scan",
                serde_json::json!({}),
                TaskPriority::High,
            ),
            ScheduleEntry::interval(
                "dispensa-health-hourly",
                Duration::from_secs(hour),
                "dispensa.health_probe",
                serde_json::json!({}),
                TaskPriority::Normal,
            ),
        ];

        let mut registered = 0;
        for entry in entries {
            if self.register(entry).await {
                registered += 1;
            }
        }
        registered
    }

    /// Start the tick loop. Idempotent; returns the loop handle.
    pub fn start(&self) -> tokio::task::JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);

        let schedules = self.schedules.clone();
        let queue = self.queue.clone();
        let running = self.running.clone();
        let tick_interval = Duration::from_millis(self.config.tick_interval_ms);

        tokio::spawn(async move {
            while running.load(Ordering::SeqCst) {
                tokio::time::sleep(tick_interval).await;

                let now = Utc::now();
                let due: Vec<(String, String, serde_json::Value, TaskPriority)> = {
                    let scheds = schedules.read().await;
                    scheds
                        .iter()
                        .filter(|s| s.is_due(now))
                        .map(|s| {
                            (
                                s.name.clone(),
                                s.task_type.clone(),
                                s.payload.clone(),
                                s.priority,
                            )
                        })
                        .collect()
                };

                if due.is_empty() {
                    continue;
                }

                {
                    let mut scheds = schedules.write().await;
                    for (name, _, _, _) in &due {
                        if let Some(entry) = scheds.iter_mut().find(|s| &s.name == name) {
                            entry.last_fired = Some(now);
                            entry.fire_count += 1;
                        }
                    }
                }

                for (name, task_type, payload, priority) in due {
                    match queue
                        .enqueue(task_type.clone(), payload, priority, None, 3, None, None)
                        .await
                    {
                        Ok(task_id) => {
                            info!(schedule = %name, task_type = %task_type, task_id = %task_id, "schedule fired");
                        }
                        Err(e) => {
                            warn!(schedule = %name, error = %e, "schedule enqueue failed");
                        }
                    }
                }
            }
        })
    }

    /// Stop the tick loop.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
