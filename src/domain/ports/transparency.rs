//! Ports for external transparency data providers.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{ContractFilter, ContractRecord, Dispensa};

/// Client for the government transparency data provider.
///
/// Implementations are rate-limited and retry transient failures; a 404
/// from the provider means "no data" and yields an empty list.
#[async_trait]
pub trait TransparencyClient: Send + Sync {
    /// Fetch contracts matching the filter, up to `limit` records.
    async fn get_contracts(
        &self,
        filter: &ContractFilter,
        limit: usize,
    ) -> DomainResult<Vec<ContractRecord>>;
}

/// Client for the external dispensa (waiver-of-bidding) source.
#[async_trait]
pub trait DispensaSource: Send + Sync {
    /// Fetch all available dispensas.
    async fn list_all(&self) -> DomainResult<Vec<Dispensa>>;

    /// Fetch one dispensa; `None` when the source has no such record.
    async fn get_by_id(&self, id: &str) -> DomainResult<Option<Dispensa>>;

    /// Whether the source is reachable and healthy.
    async fn health(&self) -> bool;
}
