//! In-memory anomaly store.
//!
//! Backs tests and offline runs with the same contract as the REST store.
//! State lives in RwLock maps; alert creation checks that the referenced
//! anomaly exists, mirroring the foreign key in the persisted layout.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    Alert, AlertStatus, AlertType, Anomaly, AnomalyStatus, InvestigationRef, Severity,
};
use crate::domain::ports::{AnomalyFilter, AnomalyStore, NewAnomaly, StoredInvestigation};

#[derive(Default)]
struct StoreInner {
    investigations: HashMap<Uuid, StoredInvestigation>,
    auto_investigations: HashMap<Uuid, StoredInvestigation>,
    anomalies: HashMap<Uuid, Anomaly>,
    alerts: HashMap<Uuid, Alert>,
    /// Insertion order of anomalies, for stable listing.
    anomaly_order: Vec<Uuid>,
}

/// In-memory implementation of [`AnomalyStore`].
#[derive(Default)]
pub struct MemoryAnomalyStore {
    inner: RwLock<StoreInner>,
}

impl MemoryAnomalyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All anomalies in insertion order (test helper).
    pub async fn all_anomalies(&self) -> Vec<Anomaly> {
        let inner = self.inner.read().await;
        inner
            .anomaly_order
            .iter()
            .filter_map(|id| inner.anomalies.get(id).cloned())
            .collect()
    }

    /// All alerts (test helper).
    pub async fn all_alerts(&self) -> Vec<Alert> {
        self.inner.read().await.alerts.values().cloned().collect()
    }

    /// Number of alert rows (test helper).
    pub async fn alert_count(&self) -> usize {
        self.inner.read().await.alerts.len()
    }

    /// Number of investigation rows in each table (test helper).
    pub async fn investigation_counts(&self) -> (usize, usize) {
        let inner = self.inner.read().await;
        (inner.investigations.len(), inner.auto_investigations.len())
    }

    fn new_row(query: &str, context: serde_json::Value, initiated_by: &str) -> StoredInvestigation {
        StoredInvestigation {
            id: Uuid::new_v4(),
            query: query.to_string(),
            status: "pending".to_string(),
            initiated_by: initiated_by.to_string(),
            context,
            created_at: Utc::now(),
        }
    }
}

#[async_trait]
impl AnomalyStore for MemoryAnomalyStore {
    async fn create_investigation(
        &self,
        query: &str,
        context: serde_json::Value,
        initiated_by: &str,
    ) -> DomainResult<StoredInvestigation> {
        let row = Self::new_row(query, context, initiated_by);
        self.inner
            .write()
            .await
            .investigations
            .insert(row.id, row.clone());
        Ok(row)
    }

    async fn create_auto_investigation(
        &self,
        query: &str,
        context: serde_json::Value,
        initiated_by: &str,
    ) -> DomainResult<StoredInvestigation> {
        let row = Self::new_row(query, context, initiated_by);
        self.inner
            .write()
            .await
            .auto_investigations
            .insert(row.id, row.clone());
        Ok(row)
    }

    async fn update_investigation_status(
        &self,
        investigation: InvestigationRef,
        status: &str,
        _progress: f64,
        _results: serde_json::Value,
        _anomalies_found: usize,
    ) -> DomainResult<()> {
        let mut inner = self.inner.write().await;
        let row = match investigation {
            InvestigationRef::Investigation(id) => inner.investigations.get_mut(&id),
            InvestigationRef::Auto(id) => inner.auto_investigations.get_mut(&id),
        };
        match row {
            Some(row) => {
                row.status = status.to_string();
                Ok(())
            }
            None => Err(DomainError::InvestigationNotFound(match investigation {
                InvestigationRef::Investigation(id) | InvestigationRef::Auto(id) => id,
            })),
        }
    }

    async fn create_anomaly(&self, anomaly: NewAnomaly) -> DomainResult<Anomaly> {
        let severity = Severity::from_score(anomaly.anomaly_score)?;

        let mut inner = self.inner.write().await;
        // The parent investigation must exist in its table.
        let parent_exists = match anomaly.investigation {
            InvestigationRef::Investigation(id) => inner.investigations.contains_key(&id),
            InvestigationRef::Auto(id) => inner.auto_investigations.contains_key(&id),
        };
        if !parent_exists {
            let id = match anomaly.investigation {
                InvestigationRef::Investigation(id) | InvestigationRef::Auto(id) => id,
            };
            return Err(DomainError::InvestigationNotFound(id));
        }

        let metadata = anomaly
            .metadata
            .as_object()
            .map(|obj| obj.clone().into_iter().collect())
            .unwrap_or_default();

        let row = Anomaly {
            id: Uuid::new_v4(),
            source: anomaly.source,
            source_id: anomaly.source_id,
            anomaly_type: anomaly.anomaly_type,
            anomaly_score: anomaly.anomaly_score,
            severity,
            title: anomaly.title,
            description: anomaly.description,
            indicators: anomaly.indicators,
            recommendations: anomaly.recommendations,
            contract_data: anomaly.contract_data,
            status: AnomalyStatus::Detected,
            investigation: anomaly.investigation,
            metadata,
            created_at: Utc::now(),
        };
        inner.anomalies.insert(row.id, row.clone());
        inner.anomaly_order.push(row.id);
        Ok(row)
    }

    async fn create_alert(
        &self,
        anomaly_id: Uuid,
        alert_type: AlertType,
        severity: Severity,
        title: &str,
        message: &str,
        recipients: Vec<String>,
        metadata: serde_json::Value,
    ) -> DomainResult<Alert> {
        let mut inner = self.inner.write().await;
        if !inner.anomalies.contains_key(&anomaly_id) {
            return Err(DomainError::InternalInvariant(format!(
                "alert references unknown anomaly {anomaly_id}"
            )));
        }

        let metadata = metadata
            .as_object()
            .map(|obj| obj.clone().into_iter().collect())
            .unwrap_or_default();

        let alert = Alert {
            id: Uuid::new_v4(),
            anomaly_id,
            alert_type,
            severity,
            title: title.to_string(),
            message: message.to_string(),
            recipients,
            status: AlertStatus::Sent,
            metadata,
            created_at: Utc::now(),
        };
        inner.alerts.insert(alert.id, alert.clone());
        Ok(alert)
    }

    async fn get_anomalies(
        &self,
        filter: &AnomalyFilter,
        limit: usize,
        offset: usize,
    ) -> DomainResult<Vec<Anomaly>> {
        let inner = self.inner.read().await;
        Ok(inner
            .anomaly_order
            .iter()
            .filter_map(|id| inner.anomalies.get(id))
            .filter(|a| filter.severity.is_none_or(|s| a.severity == s))
            .filter(|a| filter.status.is_none_or(|s| a.status == s))
            .filter(|a| {
                filter
                    .source
                    .as_ref()
                    .is_none_or(|source| &a.source == source)
            })
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn update_anomaly_status(
        &self,
        id: Uuid,
        status: AnomalyStatus,
        assigned_to: Option<String>,
    ) -> DomainResult<Anomaly> {
        let mut inner = self.inner.write().await;
        let anomaly = inner
            .anomalies
            .get_mut(&id)
            .ok_or(DomainError::InternalInvariant(format!(
                "anomaly {id} not found"
            )))?;
        anomaly.status = status;
        if let Some(assignee) = assigned_to {
            anomaly
                .metadata
                .insert("assigned_to".to_string(), serde_json::json!(assignee));
        }
        Ok(anomaly.clone())
    }
}
