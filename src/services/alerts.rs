//! Alert fanout for detected anomalies.
//!
//! Three channels: webhooks (JSON POST, per-destination failure
//! isolation), dashboard records (always persisted), and email (gated on
//! configuration; the template data is rendered here, transport stays
//! behind the boundary). Every dispatched alert is recorded in the store.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

use crate::domain::models::{AlertType, Anomaly};
use crate::domain::ports::AnomalyStore;

/// Alerting configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertingConfig {
    /// Webhook destinations; non-2xx is a failure for that URL only.
    pub webhook_urls: Vec<String>,
    /// Email recipients.
    pub alert_emails: Vec<String>,
    /// Whether email alerts are enabled.
    pub email_enabled: bool,
}

/// Outcome of one alert dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertDispatch {
    pub alert_type: String,
    pub destination: Option<String>,
    pub alert_id: Option<uuid::Uuid>,
    pub error: Option<String>,
}

/// Summary of a fanout run for one anomaly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertDispatchSummary {
    pub alerts_sent: Vec<AlertDispatch>,
    pub alerts_failed: Vec<AlertDispatch>,
}

/// Service for sending alerts about detected anomalies.
pub struct AlertService {
    store: Arc<dyn AnomalyStore>,
    http: reqwest::Client,
    config: AlertingConfig,
}

impl AlertService {
    pub fn new(store: Arc<dyn AnomalyStore>, config: AlertingConfig) -> Self {
        Self {
            store,
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Default channels for unattended dispatch.
    pub fn default_channels() -> Vec<AlertType> {
        vec![AlertType::Webhook, AlertType::Dashboard]
    }

    /// Send alerts for an anomaly over the requested channels.
    pub async fn send_anomaly_alert(
        &self,
        anomaly: &Anomaly,
        alert_types: &[AlertType],
    ) -> AlertDispatchSummary {
        let mut summary = AlertDispatchSummary::default();
        let message = render_alert_message(anomaly);

        if alert_types.contains(&AlertType::Webhook) {
            for url in &self.config.webhook_urls {
                match self.send_webhook(url, anomaly).await {
                    Ok(()) => {
                        let alert_id = self
                            .record_alert(anomaly, AlertType::Webhook, &message, vec![url.clone()])
                            .await;
                        summary.alerts_sent.push(AlertDispatch {
                            alert_type: "webhook".to_string(),
                            destination: Some(url.clone()),
                            alert_id,
                            error: None,
                        });
                        info!(anomaly_id = %anomaly.id, webhook = %url, "webhook alert sent");
                    }
                    Err(e) => {
                        error!(anomaly_id = %anomaly.id, webhook = %url, error = %e, "webhook alert failed");
                        summary.alerts_failed.push(AlertDispatch {
                            alert_type: "webhook".to_string(),
                            destination: Some(url.clone()),
                            alert_id: None,
                            error: Some(e),
                        });
                    }
                }
            }
        }

        if alert_types.contains(&AlertType::Email) {
            if self.config.email_enabled {
                for email in &self.config.alert_emails {
                    let template_data = render_email_template_data(anomaly);
                    let alert_id = self
                        .record_alert_with_metadata(
                            anomaly,
                            AlertType::Email,
                            &message,
                            vec![email.clone()],
                            json!({ "template": "anomaly_alert", "template_data": template_data }),
                        )
                        .await;
                    summary.alerts_sent.push(AlertDispatch {
                        alert_type: "email".to_string(),
                        destination: Some(email.clone()),
                        alert_id,
                        error: None,
                    });
                    info!(anomaly_id = %anomaly.id, recipient = %email, "email alert recorded");
                }
            } else {
                info!(anomaly_id = %anomaly.id, "email alerts skipped: disabled");
            }
        }

        if alert_types.contains(&AlertType::Dashboard) {
            let alert_id = self
                .record_alert_with_metadata(
                    anomaly,
                    AlertType::Dashboard,
                    &message,
                    vec![],
                    json!({ "auto_generated": true }),
                )
                .await;
            match alert_id {
                Some(id) => summary.alerts_sent.push(AlertDispatch {
                    alert_type: "dashboard".to_string(),
                    destination: None,
                    alert_id: Some(id),
                    error: None,
                }),
                None => summary.alerts_failed.push(AlertDispatch {
                    alert_type: "dashboard".to_string(),
                    destination: None,
                    alert_id: None,
                    error: Some("alert record creation failed".to_string()),
                }),
            }
        }

        summary
    }

    /// POST the anomaly envelope to one webhook. Non-2xx is a failure for
    /// that destination only.
    async fn send_webhook(&self, url: &str, anomaly: &Anomaly) -> Result<(), String> {
        let payload = json!({
            "event": "anomaly_detected",
            "timestamp": Utc::now().to_rfc3339(),
            "anomaly": {
                "id": anomaly.id,
                "title": anomaly.title,
                "severity": anomaly.severity.as_str(),
                "score": anomaly.anomaly_score,
                "source": anomaly.source,
                "type": anomaly.anomaly_type,
                "description": anomaly.description,
                "indicators": anomaly.indicators,
                "recommendations": anomaly.recommendations,
            },
            "contract": anomaly.contract_data,
        });

        let response = self
            .http
            .post(url)
            .json(&payload)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("webhook returned {}", response.status()));
        }
        Ok(())
    }

    async fn record_alert(
        &self,
        anomaly: &Anomaly,
        alert_type: AlertType,
        message: &str,
        recipients: Vec<String>,
    ) -> Option<uuid::Uuid> {
        self.record_alert_with_metadata(
            anomaly,
            alert_type,
            message,
            recipients,
            json!({ "sent_at": Utc::now().to_rfc3339() }),
        )
        .await
    }

    async fn record_alert_with_metadata(
        &self,
        anomaly: &Anomaly,
        alert_type: AlertType,
        message: &str,
        recipients: Vec<String>,
        metadata: serde_json::Value,
    ) -> Option<uuid::Uuid> {
        match self
            .store
            .create_alert(
                anomaly.id,
                alert_type,
                anomaly.severity,
                &anomaly.title,
                message,
                recipients,
                metadata,
            )
            .await
        {
            Ok(alert) => Some(alert.id),
            Err(e) => {
                error!(anomaly_id = %anomaly.id, error = %e, "failed to record alert");
                None
            }
        }
    }
}

/// Plain-text alert body shared by all channels.
fn render_alert_message(anomaly: &Anomaly) -> String {
    let format_list = |items: &[String]| {
        if items.is_empty() {
            "- Nenhum".to_string()
        } else {
            items
                .iter()
                .map(|i| format!("- {i}"))
                .collect::<Vec<_>>()
                .join("\n")
        }
    };

    format!(
        "ALERTA DE ANOMALIA - {severity}\n\n{title}\n\n\
         Score: {score:.4}\nFonte: {source}\nTipo: {kind}\n\n{description}\n\n\
         Indicadores:\n{indicators}\n\nRecomendações:\n{recommendations}\n\n\
         ID: {id}",
        severity = anomaly.severity.as_str().to_uppercase(),
        title = anomaly.title,
        score = anomaly.anomaly_score,
        source = anomaly.source,
        kind = anomaly.anomaly_type,
        description = anomaly.description,
        indicators = format_list(&anomaly.indicators),
        recommendations = format_list(&anomaly.recommendations),
        id = anomaly.id,
    )
}

/// Template data for the email channel, including the severity colour.
fn render_email_template_data(anomaly: &Anomaly) -> serde_json::Value {
    json!({
        "anomaly_id": anomaly.id,
        "title": anomaly.title,
        "severity": anomaly.severity.as_str().to_uppercase(),
        "severity_color": anomaly.severity.color(),
        "score": anomaly.anomaly_score,
        "source": anomaly.source,
        "anomaly_type": anomaly.anomaly_type,
        "description": anomaly.description,
        "indicators": anomaly.indicators,
        "recommendations": anomaly.recommendations,
        "contract_data": anomaly.contract_data,
        "detected_at": Utc::now().format("%d/%m/%Y %H:%M:%S").to_string(),
    })
}
