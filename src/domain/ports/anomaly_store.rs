//! Anomaly & investigation store port.
//!
//! The store is an opaque persistence backend. Severity is computed from
//! the anomaly score at creation time; callers never pass it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    Alert, AlertType, Anomaly, AnomalyStatus, InvestigationRef, Severity,
};

/// A persisted investigation row (shared shape for both tables).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredInvestigation {
    pub id: Uuid,
    pub query: String,
    pub status: String,
    pub initiated_by: String,
    pub context: serde_json::Value,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Arguments for creating an anomaly row.
#[derive(Debug, Clone)]
pub struct NewAnomaly {
    /// Parent investigation (exactly one of the two tables).
    pub investigation: InvestigationRef,
    /// Source system ("portal_transparencia", "dispensa_scan", ...).
    pub source: String,
    pub source_id: Option<String>,
    pub anomaly_type: String,
    /// Score in [0, 1]; the store derives severity from it.
    pub anomaly_score: f64,
    pub title: String,
    pub description: String,
    pub indicators: Vec<String>,
    pub recommendations: Vec<String>,
    pub contract_data: serde_json::Value,
    pub metadata: serde_json::Value,
}

/// Filters for listing anomalies.
#[derive(Debug, Clone, Default)]
pub struct AnomalyFilter {
    pub severity: Option<Severity>,
    pub source: Option<String>,
    pub status: Option<AnomalyStatus>,
}

/// Persistence port for investigations, anomalies and alerts.
#[async_trait]
pub trait AnomalyStore: Send + Sync {
    /// Create a user-initiated investigation row.
    async fn create_investigation(
        &self,
        query: &str,
        context: serde_json::Value,
        initiated_by: &str,
    ) -> DomainResult<StoredInvestigation>;

    /// Create an unattended auto-investigation row (parallel table,
    /// identical schema).
    async fn create_auto_investigation(
        &self,
        query: &str,
        context: serde_json::Value,
        initiated_by: &str,
    ) -> DomainResult<StoredInvestigation>;

    /// Update an investigation's status, progress and serialized results.
    async fn update_investigation_status(
        &self,
        investigation: InvestigationRef,
        status: &str,
        progress: f64,
        results: serde_json::Value,
        anomalies_found: usize,
    ) -> DomainResult<()>;

    /// Create an anomaly row. Severity is derived from `anomaly_score`;
    /// out-of-range scores are an internal invariant violation.
    async fn create_anomaly(&self, anomaly: NewAnomaly) -> DomainResult<Anomaly>;

    /// Create an alert row referencing an existing anomaly.
    #[allow(clippy::too_many_arguments)]
    async fn create_alert(
        &self,
        anomaly_id: Uuid,
        alert_type: AlertType,
        severity: Severity,
        title: &str,
        message: &str,
        recipients: Vec<String>,
        metadata: serde_json::Value,
    ) -> DomainResult<Alert>;

    /// List anomalies matching the filter.
    async fn get_anomalies(
        &self,
        filter: &AnomalyFilter,
        limit: usize,
        offset: usize,
    ) -> DomainResult<Vec<Anomaly>>;

    /// Update anomaly triage status.
    async fn update_anomaly_status(
        &self,
        id: Uuid,
        status: AnomalyStatus,
        assigned_to: Option<String>,
    ) -> DomainResult<Anomaly>;
}
