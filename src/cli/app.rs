//! Service composition for the CLI.
//!
//! Builds the engine from configuration: registry with the built-in
//! specialists, parallel executor, orchestrator, priority queue (durable
//! when configured), scheduler, monitor and alert fanout. External
//! collaborators are selected from the configured endpoints; without a
//! store endpoint an in-memory store backs the run.

use std::sync::Arc;

use anyhow::{Context, Result};
use futures::FutureExt;

use crate::adapters::http::anomaly_store::{RestAnomalyStore, RestStoreConfig};
use crate::adapters::http::dispensas::{DispensaApiClient, DispensaApiConfig};
use crate::adapters::http::transparency::{TransparencyApiClient, TransparencyApiConfig};
use crate::adapters::store::MemoryAnomalyStore;
use crate::agents::{register_builtin_agents, AnomalyDetector};
use crate::domain::models::TaskPriority;
use crate::domain::ports::{AnomalyStore, DispensaSource, TransparencyClient};
use crate::infrastructure::config::Config;
use crate::services::alerts::AlertService;
use crate::services::monitor::AutoInvestigationMonitor;
use crate::services::orchestrator::MasterOrchestrator;
use crate::services::parallel::ParallelExecutor;
use crate::services::queue::{PriorityQueueService, TaskHandler};
use crate::services::registry::AgentRegistry;
use crate::services::scheduler::PeriodicScheduler;

/// Fully wired engine services.
pub struct App {
    pub config: Config,
    pub registry: Arc<AgentRegistry>,
    pub executor: Arc<ParallelExecutor>,
    pub orchestrator: Arc<MasterOrchestrator>,
    pub queue: Arc<PriorityQueueService>,
    pub scheduler: Arc<PeriodicScheduler>,
    pub monitor: Arc<AutoInvestigationMonitor>,
    pub store: Arc<dyn AnomalyStore>,
    pub dispensas: Option<Arc<dyn DispensaSource>>,
}

impl App {
    /// Build all services from configuration.
    pub async fn build(config: Config) -> Result<Self> {
        let transparency: Arc<dyn TransparencyClient> =
            Arc::new(TransparencyApiClient::new(TransparencyApiConfig {
                base_url: config.external.transparency_base_url.clone(),
                api_key: config.external.transparency_api_key.clone(),
                requests_per_minute: config.rate_limits.transparency_requests_per_minute,
                ..TransparencyApiConfig::default()
            }));

        let store: Arc<dyn AnomalyStore> = match (
            &config.external.store_base_url,
            &config.external.store_api_key,
        ) {
            (Some(url), Some(key)) => Arc::new(RestAnomalyStore::new(RestStoreConfig::new(
                url.clone(),
                key.clone(),
            ))),
            _ => Arc::new(MemoryAnomalyStore::new()),
        };

        let dispensas: Option<Arc<dyn DispensaSource>> = match (
            &config.external.dispensa_base_url,
            &config.external.dispensa_auth_token,
        ) {
            (Some(url), Some(token)) => Some(Arc::new(DispensaApiClient::new(
                DispensaApiConfig::new(url.clone(), token.clone()),
            ))),
            _ => None,
        };

        let registry = Arc::new(AgentRegistry::new());
        let detector = AnomalyDetector::new(config.monitor.value_threshold)
            .with_client(transparency.clone());
        register_builtin_agents(&registry, detector).await;
        registry
            .initialize_all()
            .await
            .map_err(|e| anyhow::anyhow!("agent initialisation failed: {e}"))?;

        let pool = Arc::new(crate::services::registry::AgentPool::new(registry.clone()));
        let executor = Arc::new(ParallelExecutor::new(config.executor).with_pool(pool));
        let orchestrator = Arc::new(
            MasterOrchestrator::new(registry.clone(), executor.clone()).with_store(store.clone()),
        );
        // Reflection is an optional capability discovered at registration;
        // the orchestrator offers it.
        registry
            .register_reflective(orchestrator.name().to_string(), orchestrator.clone())
            .await;

        let queue = if config.database.persist_queue {
            if let Some(parent) = std::path::Path::new(&config.database.path).parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            let url = format!("sqlite://{}?mode=rwc", config.database.path);
            let pool = sqlx::SqlitePool::connect(&url)
                .await
                .context("Failed to open queue database")?;
            Arc::new(PriorityQueueService::with_pool(config.queue.clone(), pool))
        } else {
            Arc::new(PriorityQueueService::new(config.queue.clone()))
        };

        let scheduler = Arc::new(PeriodicScheduler::new(queue.clone(), config.scheduler.clone()));

        let alerts = Arc::new(AlertService::new(store.clone(), config.alerting.clone()));
        let mut monitor = AutoInvestigationMonitor::new(
            transparency,
            store.clone(),
            registry.clone(),
            alerts,
            config.monitor.clone(),
        );
        if let Some(ref source) = dispensas {
            monitor = monitor.with_dispensa_source(source.clone());
        }
        let monitor = Arc::new(monitor);

        Ok(Self {
            config,
            registry,
            executor,
            orchestrator,
            queue,
            scheduler,
            monitor,
            store,
            dispensas,
        })
    }

    /// Bind queue handlers for every task type the seed schedule emits.
    pub async fn register_builtin_handlers(&self) {
        let queue = self.queue.clone();
        let default_retention = self.config.queue.result_retention_seconds;
        let handler: TaskHandler = Arc::new(move |payload, _metadata| {
            let queue = queue.clone();
            async move {
                // The schedule payload overrides in days; otherwise the
                // configured in-memory retention applies.
                let retention_seconds = payload
                    .get("retention_days")
                    .and_then(serde_json::Value::as_u64)
                    .map_or(default_retention, |days| days * 24 * 3600);
                queue
                    .clear_completed(std::time::Duration::from_secs(retention_seconds))
                    .await;
                Ok(serde_json::json!({ "status": "completed" }))
            }
            .boxed()
        });
        self.queue
            .register_handler("maintenance.cleanup_results", handler)
            .await;

        let registry = self.registry.clone();
        let handler: TaskHandler = Arc::new(move |_payload, _metadata| {
            let registry = registry.clone();
            async move {
                Ok(serde_json::json!({
                    "status": "healthy",
                    "registered_agents": registry.len().await,
                }))
            }
            .boxed()
        });
        self.queue.register_handler("system.health_ping", handler).await;

        let monitor = self.monitor.clone();
        let handler: TaskHandler = Arc::new(move |payload, _metadata| {
            let monitor = monitor.clone();
            async move {
                let lookback = payload.get("lookback_hours").and_then(serde_json::Value::as_u64);
                let summary = monitor.monitor_new_contracts(lookback, None).await?;
                serde_json::to_value(summary).map_err(Into::into)
            }
            .boxed()
        });
        self.queue.register_handler("monitor.new_contracts", handler).await;

        let monitor = self.monitor.clone();
        let orgs = self.config.monitor.priority_organisations.clone();
        let handler: TaskHandler = Arc::new(move |_payload, _metadata| {
            let monitor = monitor.clone();
            let orgs = orgs.clone();
            async move {
                let codes = if orgs.is_empty() { None } else { Some(orgs) };
                let summary = monitor.monitor_new_contracts(None, codes).await?;
                serde_json::to_value(summary).map_err(Into::into)
            }
            .boxed()
        });
        self.queue
            .register_handler("monitor.priority_organisations", handler)
            .await;

        let monitor = self.monitor.clone();
        let handler: TaskHandler = Arc::new(move |payload, _metadata| {
            let monitor = monitor.clone();
            async move {
                let months = payload
                    .get("months_back")
                    .and_then(serde_json::Value::as_u64)
                    .and_then(|v| u32::try_from(v).ok());
                let batch = payload
                    .get("batch_size")
                    .and_then(serde_json::Value::as_u64)
                    .and_then(|v| usize::try_from(v).ok());
                let summary = monitor.reanalyze_historical(months, batch).await?;
                serde_json::to_value(summary).map_err(Into::into)
            }
            .boxed()
        });
        self.queue
            .register_handler("monitor.historical_reanalysis", handler)
            .await;

        let queue = self.queue.clone();
        let handler: TaskHandler = Arc::new(move |_payload, _metadata| {
            let queue = queue.clone();
            async move {
                let stats = queue.get_stats().await;
                serde_json::to_value(stats).map_err(Into::into)
            }
            .boxed()
        });
        self.queue.register_handler("monitor.health_probe", handler).await;

        let monitor = self.monitor.clone();
        let handler: TaskHandler = Arc::new(move |_payload, _metadata| {
            let monitor = monitor.clone();
            async move {
                let summary = monitor.scan_dispensas().await?;
                serde_json::to_value(summary).map_err(Into::into)
            }
            .boxed()
        });
        self.queue.register_handler("dispensa.scan", handler).await;

        let dispensas = self.dispensas.clone();
        let handler: TaskHandler = Arc::new(move |_payload, _metadata| {
            let dispensas = dispensas.clone();
            async move {
                let healthy = match dispensas {
                    Some(source) => source.health().await,
                    None => false,
                };
                Ok(serde_json::json!({ "healthy": healthy }))
            }
            .boxed()
        });
        self.queue.register_handler("dispensa.health_probe", handler).await;
    }

    /// Parse a priority argument the way the queue commands accept it.
    pub fn parse_priority(value: &str) -> Result<TaskPriority> {
        TaskPriority::from_str(value)
            .ok_or_else(|| anyhow::anyhow!("unknown priority '{value}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_build_with_defaults_uses_memory_store() {
        let app = App::build(Config::default()).await.unwrap();
        assert!(app.dispensas.is_none());
        assert_eq!(app.registry.len().await, 6);
    }

    #[tokio::test]
    async fn test_builtin_handlers_cover_seed_schedule() {
        let app = App::build(Config::default()).await.unwrap();
        app.register_builtin_handlers().await;
        app.scheduler.register_builtin_schedules().await;

        // Every scheduled task type must have a handler; otherwise the
        // queue would terminally fail the seeded tasks.
        for entry in app.scheduler.list().await {
            assert!(
                app.queue.has_handler(&entry.task_type).await,
                "no handler for scheduled task type {}",
                entry.task_type
            );
        }
    }

    #[test]
    fn test_parse_priority() {
        assert_eq!(App::parse_priority("critical").unwrap(), TaskPriority::Critical);
        assert!(App::parse_priority("bogus").is_err());
    }
}
