//! REST anomaly & investigation store.
//!
//! Talks to a PostgREST-style row API (`/rest/v1/<table>`): api key plus
//! bearer auth headers, `Prefer: return=representation` so creates echo
//! the row back. Transient failures (5xx, connection errors) retry with
//! exponential backoff.

use std::time::Duration;

use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use chrono::Utc;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult, ExternalApiError};
use crate::domain::models::{
    Alert, AlertStatus, AlertType, Anomaly, AnomalyStatus, InvestigationRef, Severity,
};
use crate::domain::ports::{AnomalyFilter, AnomalyStore, NewAnomaly, StoredInvestigation};

/// Store client configuration.
#[derive(Debug, Clone)]
pub struct RestStoreConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout_seconds: u64,
    /// Total time budget for transient-error retries.
    pub retry_budget_seconds: u64,
}

impl RestStoreConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            timeout_seconds: 30,
            retry_budget_seconds: 60,
        }
    }
}

/// REST-backed implementation of [`AnomalyStore`].
pub struct RestAnomalyStore {
    http: reqwest::Client,
    config: RestStoreConfig,
}

impl RestAnomalyStore {
    pub fn new(config: RestStoreConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!(
            "{}/rest/v1/{table}",
            self.config.base_url.trim_end_matches('/')
        )
    }

    fn apply_headers(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.config.api_key)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .header("Prefer", "return=representation")
            .timeout(Duration::from_secs(self.config.timeout_seconds))
    }

    /// POST a row, retrying transient failures, and unwrap the
    /// representation (the API returns a one-element list).
    async fn insert_row(
        &self,
        table: &str,
        body: serde_json::Value,
    ) -> DomainResult<serde_json::Value> {
        let url = self.table_url(table);
        let policy = ExponentialBackoffBuilder::new()
            .with_max_elapsed_time(Some(Duration::from_secs(self.config.retry_budget_seconds)))
            .build();

        let row = backoff::future::retry(policy, || async {
            let response = self
                .apply_headers(self.http.post(&url).json(&body))
                .send()
                .await
                .map_err(|e| {
                    backoff::Error::transient(ExternalApiError::RequestFailed(e.to_string()))
                })?;

            let status = response.status();
            if status.is_success() {
                let value = response.json::<serde_json::Value>().await.map_err(|e| {
                    backoff::Error::permanent(ExternalApiError::InvalidResponse(e.to_string()))
                })?;
                return Ok(value);
            }

            let message = response.text().await.unwrap_or_default();
            if status.is_server_error() || status.as_u16() == 429 {
                Err(backoff::Error::transient(ExternalApiError::ServerError {
                    status: status.as_u16(),
                    message,
                }))
            } else {
                Err(backoff::Error::permanent(ExternalApiError::PermanentError {
                    status: status.as_u16(),
                    message,
                }))
            }
        })
        .await
        .map_err(DomainError::from)?;

        Ok(match row {
            serde_json::Value::Array(mut items) if !items.is_empty() => items.remove(0),
            other => other,
        })
    }

    async fn fetch_rows(
        &self,
        table: &str,
        params: &[(String, String)],
    ) -> DomainResult<serde_json::Value> {
        let url = self.table_url(table);
        let response = self
            .apply_headers(self.http.get(&url).query(params))
            .send()
            .await
            .map_err(|e| ExternalApiError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ExternalApiError::PermanentError {
                status: status.as_u16(),
                message,
            }
            .into());
        }

        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| ExternalApiError::InvalidResponse(e.to_string()).into())
    }

    fn row_to_investigation(row: &serde_json::Value) -> DomainResult<StoredInvestigation> {
        let id = row
            .get("id")
            .and_then(serde_json::Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| {
                DomainError::SerializationError("investigation row missing id".to_string())
            })?;
        Ok(StoredInvestigation {
            id,
            query: row
                .get("query")
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default()
                .to_string(),
            status: row
                .get("status")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("pending")
                .to_string(),
            initiated_by: row
                .get("initiated_by")
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default()
                .to_string(),
            context: row.get("context").cloned().unwrap_or_default(),
            created_at: Utc::now(),
        })
    }

    fn row_to_anomaly(row: serde_json::Value) -> DomainResult<Anomaly> {
        serde_json::from_value(normalize_anomaly_row(row)).map_err(Into::into)
    }

    async fn create_investigation_row(
        &self,
        table: &str,
        query: &str,
        context: serde_json::Value,
        initiated_by: &str,
    ) -> DomainResult<StoredInvestigation> {
        let row = self
            .insert_row(
                table,
                json!({
                    "query": query,
                    "context": context,
                    "initiated_by": initiated_by,
                    "status": "pending",
                }),
            )
            .await?;
        Self::row_to_investigation(&row)
    }
}

/// Lift the flat persisted row into the [`Anomaly`] serde shape.
fn normalize_anomaly_row(mut row: serde_json::Value) -> serde_json::Value {
    if let Some(obj) = row.as_object_mut() {
        let investigation = match (
            obj.get("investigation_id").and_then(serde_json::Value::as_str),
            obj.get("auto_investigation_id")
                .and_then(serde_json::Value::as_str),
        ) {
            (Some(id), _) => json!({ "investigation": id }),
            (None, Some(id)) => json!({ "auto": id }),
            (None, None) => serde_json::Value::Null,
        };
        obj.insert("investigation".to_string(), investigation);
        obj.remove("investigation_id");
        obj.remove("auto_investigation_id");
        obj.entry("created_at")
            .or_insert_with(|| json!(Utc::now().to_rfc3339()));
    }
    row
}

#[async_trait]
impl AnomalyStore for RestAnomalyStore {
    async fn create_investigation(
        &self,
        query: &str,
        context: serde_json::Value,
        initiated_by: &str,
    ) -> DomainResult<StoredInvestigation> {
        self.create_investigation_row("investigations", query, context, initiated_by)
            .await
    }

    async fn create_auto_investigation(
        &self,
        query: &str,
        context: serde_json::Value,
        initiated_by: &str,
    ) -> DomainResult<StoredInvestigation> {
        self.create_investigation_row("auto_investigations", query, context, initiated_by)
            .await
    }

    async fn update_investigation_status(
        &self,
        investigation: InvestigationRef,
        status: &str,
        progress: f64,
        results: serde_json::Value,
        anomalies_found: usize,
    ) -> DomainResult<()> {
        let (table, id) = match investigation {
            InvestigationRef::Investigation(id) => ("investigations", id),
            InvestigationRef::Auto(id) => ("auto_investigations", id),
        };
        let url = self.table_url(table);
        let response = self
            .apply_headers(self.http.patch(&url).query(&[("id", format!("eq.{id}"))]).json(
                &json!({
                    "status": status,
                    "progress": progress,
                    "results": results,
                    "anomalies_found": anomalies_found,
                    "completed_at": if status == "completed" {
                        Some(Utc::now().to_rfc3339())
                    } else {
                        None
                    },
                }),
            ))
            .send()
            .await
            .map_err(|e| ExternalApiError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status_code = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ExternalApiError::PermanentError {
                status: status_code,
                message,
            }
            .into());
        }
        Ok(())
    }

    async fn create_anomaly(&self, anomaly: NewAnomaly) -> DomainResult<Anomaly> {
        // Severity is derived here; out-of-range scores fail fast.
        let severity = Severity::from_score(anomaly.anomaly_score)?;

        let mut body = json!({
            "source": anomaly.source,
            "source_id": anomaly.source_id,
            "anomaly_type": anomaly.anomaly_type,
            "anomaly_score": anomaly.anomaly_score,
            "severity": severity.as_str(),
            "title": anomaly.title,
            "description": anomaly.description,
            "indicators": anomaly.indicators,
            "recommendations": anomaly.recommendations,
            "contract_data": anomaly.contract_data,
            "metadata": anomaly.metadata,
            "status": "detected",
        });
        if let Some(obj) = body.as_object_mut() {
            match anomaly.investigation {
                InvestigationRef::Investigation(id) => {
                    obj.insert("investigation_id".to_string(), json!(id));
                }
                InvestigationRef::Auto(id) => {
                    obj.insert("auto_investigation_id".to_string(), json!(id));
                }
            }
        }

        let row = self.insert_row("anomalies", body).await?;
        let anomaly = Self::row_to_anomaly(row)?;
        info!(
            anomaly_id = %anomaly.id,
            source = %anomaly.source,
            severity = anomaly.severity.as_str(),
            score = anomaly.anomaly_score,
            "anomaly created in store"
        );
        Ok(anomaly)
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
        let row = self
            .insert_row(
                "alerts",
                json!({
                    "anomaly_id": anomaly_id,
                    "alert_type": alert_type.as_str(),
                    "severity": severity.as_str(),
                    "title": title,
                    "message": message,
                    "recipients": recipients,
                    "metadata": metadata,
                    "status": "sent",
                }),
            )
            .await?;

        let id = row
            .get("id")
            .and_then(serde_json::Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| DomainError::SerializationError("alert row missing id".to_string()))?;

        Ok(Alert {
            id,
            anomaly_id,
            alert_type,
            severity,
            title: title.to_string(),
            message: message.to_string(),
            recipients,
            status: AlertStatus::Sent,
            metadata: metadata
                .as_object()
                .map(|obj| obj.clone().into_iter().collect())
                .unwrap_or_default(),
            created_at: Utc::now(),
        })
    }

    async fn get_anomalies(
        &self,
        filter: &AnomalyFilter,
        limit: usize,
        offset: usize,
    ) -> DomainResult<Vec<Anomaly>> {
        let mut params: Vec<(String, String)> = vec![
            ("limit".to_string(), limit.to_string()),
            ("offset".to_string(), offset.to_string()),
            ("order".to_string(), "created_at.desc".to_string()),
        ];
        if let Some(severity) = filter.severity {
            params.push(("severity".to_string(), format!("eq.{}", severity.as_str())));
        }
        if let Some(ref source) = filter.source {
            params.push(("source".to_string(), format!("eq.{source}")));
        }
        if let Some(status) = filter.status {
            params.push(("status".to_string(), format!("eq.{}", status.as_str())));
        }

        let rows = self.fetch_rows("anomalies", &params).await?;
        let items = match rows {
            serde_json::Value::Array(items) => items,
            _ => Vec::new(),
        };
        items.into_iter().map(Self::row_to_anomaly).collect()
    }

    async fn update_anomaly_status(
        &self,
        id: Uuid,
        status: AnomalyStatus,
        assigned_to: Option<String>,
    ) -> DomainResult<Anomaly> {
        let url = self.table_url("anomalies");
        let mut body = json!({ "status": status.as_str() });
        if let Some(assignee) = assigned_to {
            if let Some(obj) = body.as_object_mut() {
                obj.insert("assigned_to".to_string(), json!(assignee));
            }
        }

        let response = self
            .apply_headers(
                self.http
                    .patch(&url)
                    .query(&[("id", format!("eq.{id}"))])
                    .json(&body),
            )
            .send()
            .await
            .map_err(|e| ExternalApiError::RequestFailed(e.to_string()))?;

        let status_code = response.status();
        if !status_code.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ExternalApiError::PermanentError {
                status: status_code.as_u16(),
                message,
            }
            .into());
        }

        let row = response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| ExternalApiError::InvalidResponse(e.to_string()))?;
        let row = match row {
            serde_json::Value::Array(mut items) if !items.is_empty() => items.remove(0),
            other => other,
        };
        Self::row_to_anomaly(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_anomaly_row_auto_parent() {
        let row = json!({
            "id": Uuid::new_v4(),
            "auto_investigation_id": Uuid::new_v4().to_string(),
            "source": "portal_transparencia",
            "source_id": "c-1",
            "anomaly_type": "price",
            "anomaly_score": 0.9,
            "severity": "critical",
            "title": "t",
            "description": "d",
            "indicators": [],
            "recommendations": [],
            "contract_data": {},
            "status": "detected",
        });
        let normalized = normalize_anomaly_row(row);
        assert!(normalized["investigation"]["auto"].is_string());
        assert!(normalized.get("auto_investigation_id").is_none());

        let anomaly: Anomaly = serde_json::from_value(normalized).unwrap();
        assert!(anomaly.investigation.auto_investigation_id().is_some());
    }

    #[test]
    fn test_normalize_anomaly_row_user_parent() {
        let row = json!({
            "id": Uuid::new_v4(),
            "investigation_id": Uuid::new_v4().to_string(),
            "source": "portal_transparencia",
            "source_id": null,
            "anomaly_type": "vendor",
            "anomaly_score": 0.6,
            "severity": "medium",
            "title": "t",
            "description": "d",
            "indicators": [],
            "recommendations": [],
            "contract_data": {},
            "status": "detected",
        });
        let anomaly: Anomaly = serde_json::from_value(normalize_anomaly_row(row)).unwrap();
        assert!(anomaly.investigation.investigation_id().is_some());
        assert!(anomaly.investigation.auto_investigation_id().is_none());
    }
}
