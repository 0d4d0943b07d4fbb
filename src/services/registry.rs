//! Agent registry and pool.
//!
//! The registry is the single point where a missing agent can fail: plan
//! steps stay string-addressed and resolve here. It is initialised before
//! workers start and is read-mostly afterwards; registrations are
//! synchronised and one-way (no unregister mid-run).

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::{Agent, Reflective};

/// Name -> agent mapping owned by the orchestrator.
#[derive(Default)]
pub struct AgentRegistry {
    agents: RwLock<HashMap<String, Arc<dyn Agent>>>,
    reflective: RwLock<HashMap<String, Arc<dyn Reflective>>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent under its own name.
    pub async fn register(&self, agent: Arc<dyn Agent>) {
        let name = agent.name().to_string();
        let mut agents = self.agents.write().await;
        agents.insert(name.clone(), agent);
        info!(agent = %name, total = agents.len(), "agent registered");
    }

    /// Register the reflection capability of an already-registered agent.
    ///
    /// Reflection is optional; the orchestrator discovers it here and never
    /// requires it.
    pub async fn register_reflective(&self, name: impl Into<String>, agent: Arc<dyn Reflective>) {
        self.reflective.write().await.insert(name.into(), agent);
    }

    /// Resolve an agent by name.
    pub async fn get(&self, name: &str) -> Option<Arc<dyn Agent>> {
        self.agents.read().await.get(name).cloned()
    }

    /// Resolve an agent by name, failing with [`DomainError::AgentUnavailable`].
    pub async fn resolve(&self, name: &str) -> DomainResult<Arc<dyn Agent>> {
        self.get(name)
            .await
            .ok_or_else(|| DomainError::AgentUnavailable(name.to_string()))
    }

    /// Resolve the reflection capability of an agent, if it offers one.
    pub async fn get_reflective(&self, name: &str) -> Option<Arc<dyn Reflective>> {
        self.reflective.read().await.get(name).cloned()
    }

    /// Names of all registered agents.
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.agents.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered agents.
    pub async fn len(&self) -> usize {
        self.agents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.agents.read().await.is_empty()
    }

    /// Initialize every registered agent.
    pub async fn initialize_all(&self) -> DomainResult<()> {
        let agents: Vec<Arc<dyn Agent>> = self.agents.read().await.values().cloned().collect();
        for agent in agents {
            agent.initialize().await?;
        }
        Ok(())
    }

    /// Shut down every registered agent.
    pub async fn shutdown_all(&self) -> DomainResult<()> {
        let agents: Vec<Arc<dyn Agent>> = self.agents.read().await.values().cloned().collect();
        for agent in agents {
            agent.shutdown().await?;
        }
        Ok(())
    }
}

/// Lends agent instances under a scoped acquisition with guaranteed
/// release. Instances are shared and reused; the lease tracks how many are
/// in flight so statistics and shutdown can observe outstanding work.
pub struct AgentPool {
    registry: Arc<AgentRegistry>,
    in_flight: Arc<AtomicUsize>,
    leases_total: Arc<AtomicUsize>,
}

impl AgentPool {
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        Self {
            registry,
            in_flight: Arc::new(AtomicUsize::new(0)),
            leases_total: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Acquire a lease on the named agent. The lease releases on drop.
    pub async fn acquire(&self, name: &str) -> DomainResult<AgentLease> {
        let agent = self.registry.resolve(name).await?;
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.leases_total.fetch_add(1, Ordering::Relaxed);
        Ok(AgentLease {
            agent,
            in_flight: self.in_flight.clone(),
        })
    }

    /// Number of leases currently outstanding.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Total leases handed out over the pool's lifetime.
    pub fn leases_total(&self) -> usize {
        self.leases_total.load(Ordering::Relaxed)
    }
}

/// RAII lease over an agent instance.
pub struct AgentLease {
    agent: Arc<dyn Agent>,
    in_flight: Arc<AtomicUsize>,
}

impl AgentLease {
    pub fn agent(&self) -> &Arc<dyn Agent> {
        &self.agent
    }
}

impl Drop for AgentLease {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::domain::models::{AgentMessage, AgentResponse, InvestigationContext};

    struct StubAgent {
        name: String,
        capabilities: Vec<String>,
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
            Ok(AgentResponse::completed(&self.name, serde_json::json!({})))
        }
    }

    fn stub(name: &str) -> Arc<dyn Agent> {
        Arc::new(StubAgent {
            name: name.to_string(),
            capabilities: vec!["noop".to_string()],
        })
    }

    #[tokio::test]
    async fn test_register_and_resolve() {
        let registry = AgentRegistry::new();
        registry.register(stub("anomaly_detector")).await;

        assert!(registry.get("anomaly_detector").await.is_some());
        assert!(registry.resolve("anomaly_detector").await.is_ok());
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_resolve_missing_agent_fails() {
        let registry = AgentRegistry::new();
        let result = registry.resolve("ghost").await;
        let err = match result {
            Ok(_) => panic!("expected resolve to fail"),
            Err(err) => err,
        };
        assert!(matches!(err, DomainError::AgentUnavailable(name) if name == "ghost"));
    }

    #[test]
    fn test_names_sorted() {
        tokio_test::block_on(async {
            let registry = AgentRegistry::new();
            registry.register(stub("reporter")).await;
            registry.register(stub("anomaly_detector")).await;
            assert_eq!(
                registry.names().await,
                vec!["anomaly_detector".to_string(), "reporter".to_string()]
            );
        });
    }

    #[tokio::test]
    async fn test_pool_lease_releases_on_drop() {
        let registry = Arc::new(AgentRegistry::new());
        registry.register(stub("anomaly_detector")).await;
        let pool = AgentPool::new(registry);

        {
            let lease = pool.acquire("anomaly_detector").await.unwrap();
            assert_eq!(pool.in_flight(), 1);
            assert_eq!(lease.agent().name(), "anomaly_detector");
        }
        assert_eq!(pool.in_flight(), 0);
        assert_eq!(pool.leases_total(), 1);
    }

    #[tokio::test]
    async fn test_pool_acquire_missing_agent() {
        let registry = Arc::new(AgentRegistry::new());
        let pool = AgentPool::new(registry);
        assert!(pool.acquire("ghost").await.is_err());
        assert_eq!(pool.in_flight(), 0);
    }
}
