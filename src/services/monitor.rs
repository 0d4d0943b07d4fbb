//! Auto-investigation monitor.
//!
//! Unattended pipeline over the orchestrator's building blocks: fetch
//! contracts from external sources, pre-screen them with cheap additive
//! signals, run full investigations on the suspicious subset, persist the
//! resulting anomalies, and dispatch alerts for high/critical severities.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, instrument, warn};

use crate::agents::detector::suspicion_signals;
use crate::agents::names;
use crate::domain::errors::DomainResult;
use crate::domain::models::{
    AgentMessage, AlertType, ContractFilter, ContractRecord, InvestigationContext,
    InvestigationRef, Severity,
};
use crate::domain::ports::{Agent, AnomalyStore, DispensaSource, NewAnomaly, TransparencyClient};
use crate::services::alerts::AlertService;
use crate::services::registry::AgentRegistry;

/// System identity recorded as the initiator of unattended runs.
const AUTO_MONITOR_USER: &str = "system:auto-monitor";

/// Pre-screen promote level: contracts at or above it are investigated.
const PROMOTE_SCORE: u32 = 3;

/// Monitor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Contract value above which the high-value signal trips.
    pub value_threshold: f64,
    /// Maximum contracts analyzed per run.
    pub daily_contract_limit: usize,
    /// Default lookback for new-contract monitoring.
    pub lookback_hours_default: u64,
    /// Default depth for historical reanalysis.
    pub months_back_default: u32,
    /// Contracts per historical batch.
    pub batch_size: usize,
    /// Organisation codes receiving priority monitoring.
    pub priority_organisations: Vec<String>,
    /// Delay between investigations in milliseconds.
    pub investigation_delay_ms: u64,
    /// Delay between fetch batches in milliseconds.
    pub batch_delay_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            value_threshold: 100_000.0,
            daily_contract_limit: 500,
            lookback_hours_default: 24,
            months_back_default: 6,
            batch_size: 100,
            priority_organisations: Vec::new(),
            investigation_delay_ms: 500,
            batch_delay_ms: 1000,
        }
    }
}

/// Summary of one monitoring run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringRunSummary {
    pub monitoring_type: String,
    pub contracts_analyzed: usize,
    pub suspicious_found: usize,
    pub investigations_created: usize,
    pub anomalies_detected: usize,
    pub duration_seconds: f64,
    pub timestamp: DateTime<Utc>,
}

/// A contract promoted by the pre-screen, carrying its signals.
#[derive(Debug, Clone)]
pub struct SuspiciousContract {
    pub contract: ContractRecord,
    pub suspicion_score: u32,
    pub suspicion_reasons: Vec<String>,
    /// Source system for persisted anomalies.
    pub source: String,
}

/// 24/7 contract monitoring and automatic investigation.
pub struct AutoInvestigationMonitor {
    transparency: Arc<dyn TransparencyClient>,
    dispensas: Option<Arc<dyn DispensaSource>>,
    store: Arc<dyn AnomalyStore>,
    registry: Arc<AgentRegistry>,
    alerts: Arc<AlertService>,
    config: MonitorConfig,
}

impl AutoInvestigationMonitor {
    pub fn new(
        transparency: Arc<dyn TransparencyClient>,
        store: Arc<dyn AnomalyStore>,
        registry: Arc<AgentRegistry>,
        alerts: Arc<AlertService>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            transparency,
            dispensas: None,
            store,
            registry,
            alerts,
            config,
        }
    }

    /// Attach the external dispensa source for waiver scans.
    pub fn with_dispensa_source(mut self, source: Arc<dyn DispensaSource>) -> Self {
        self.dispensas = Some(source);
        self
    }

    /// Monitor and investigate contracts from the last `lookback_hours`.
    #[instrument(skip(self), err)]
    pub async fn monitor_new_contracts(
        &self,
        lookback_hours: Option<u64>,
        organisation_codes: Option<Vec<String>>,
    ) -> DomainResult<MonitoringRunSummary> {
        let lookback = lookback_hours.unwrap_or(self.config.lookback_hours_default);
        let start = Utc::now();
        info!(lookback_hours = lookback, "auto monitoring started");

        let end_date = Utc::now();
        let start_date = end_date - chrono::Duration::hours(i64::try_from(lookback).unwrap_or(24));

        let contracts = self
            .fetch_contracts(start_date, end_date, organisation_codes.as_deref(), self.config.daily_contract_limit)
            .await;

        info!(count = contracts.len(), "contracts fetched");

        let suspicious = self.pre_screen(&contracts, "portal_transparencia");
        info!(
            total = contracts.len(),
            suspicious = suspicious.len(),
            "contracts pre-screened"
        );

        let (investigations, anomalies) = self.investigate_batch(&suspicious).await;

        let summary = MonitoringRunSummary {
            monitoring_type: "new_contracts".to_string(),
            contracts_analyzed: contracts.len(),
            suspicious_found: suspicious.len(),
            investigations_created: investigations,
            anomalies_detected: anomalies,
            duration_seconds: (Utc::now() - start).as_seconds_f64(),
            timestamp: Utc::now(),
        };
        info!(?summary, "auto monitoring completed");
        Ok(summary)
    }

    /// Re-analyze historical contracts in weekly batches.
    #[instrument(skip(self), err)]
    pub async fn reanalyze_historical(
        &self,
        months_back: Option<u32>,
        batch_size: Option<usize>,
    ) -> DomainResult<MonitoringRunSummary> {
        let months = months_back.unwrap_or(self.config.months_back_default);
        let batch_size = batch_size.unwrap_or(self.config.batch_size);
        let start = Utc::now();
        info!(months_back = months, batch_size, "historical reanalysis started");

        let end_date = Utc::now();
        let start_date = end_date - chrono::Duration::days(i64::from(months) * 30);

        let mut total_analyzed = 0usize;
        let mut total_suspicious = 0usize;
        let mut total_investigations = 0usize;
        let mut total_anomalies = 0usize;

        let mut current = start_date;
        while current < end_date {
            let batch_end = (current + chrono::Duration::days(7)).min(end_date);

            let contracts = self.fetch_contracts(current, batch_end, None, batch_size).await;
            if !contracts.is_empty() {
                let suspicious = self.pre_screen(&contracts, "portal_transparencia");
                if !suspicious.is_empty() {
                    let (investigations, anomalies) = self.investigate_batch(&suspicious).await;
                    total_investigations += investigations;
                    total_anomalies += anomalies;
                }
                info!(
                    batch_start = %current.date_naive(),
                    batch_end = %batch_end.date_naive(),
                    contracts = contracts.len(),
                    suspicious = suspicious.len(),
                    "historical batch processed"
                );
                total_suspicious += suspicious.len();
                total_analyzed += contracts.len();
            }

            current = batch_end;
            tokio::time::sleep(Duration::from_millis(self.config.batch_delay_ms)).await;
        }

        let summary = MonitoringRunSummary {
            monitoring_type: "historical_reanalysis".to_string(),
            contracts_analyzed: total_analyzed,
            suspicious_found: total_suspicious,
            investigations_created: total_investigations,
            anomalies_detected: total_anomalies,
            duration_seconds: (Utc::now() - start).as_seconds_f64(),
            timestamp: Utc::now(),
        };
        info!(?summary, "historical reanalysis completed");
        Ok(summary)
    }

    /// Scan the external dispensa source and investigate suspicious
    /// waivers.
    #[instrument(skip(self), err)]
    pub async fn scan_dispensas(&self) -> DomainResult<MonitoringRunSummary> {
        let start = Utc::now();
        let Some(ref source) = self.dispensas else {
            warn!("dispensa scan requested but no source configured");
            return Ok(MonitoringRunSummary {
                monitoring_type: "dispensa_scan".to_string(),
                contracts_analyzed: 0,
                suspicious_found: 0,
                investigations_created: 0,
                anomalies_detected: 0,
                duration_seconds: 0.0,
                timestamp: Utc::now(),
            });
        };

        let dispensas = match source.list_all().await {
            Ok(list) => list,
            Err(e) => {
                warn!(error = %e, "dispensa fetch failed");
                Vec::new()
            }
        };

        let records: Vec<ContractRecord> = dispensas
            .iter()
            .map(crate::domain::models::Dispensa::as_contract_record)
            .collect();
        let suspicious = self.pre_screen(&records, "dispensa_scan");

        let (investigations, anomalies) = self.investigate_batch(&suspicious).await;

        let summary = MonitoringRunSummary {
            monitoring_type: "dispensa_scan".to_string(),
            contracts_analyzed: dispensas.len(),
            suspicious_found: suspicious.len(),
            investigations_created: investigations,
            anomalies_detected: anomalies,
            duration_seconds: (Utc::now() - start).as_seconds_f64(),
            timestamp: Utc::now(),
        };
        info!(?summary, "dispensa scan completed");
        Ok(summary)
    }

    /// Fetch contracts for a window, per organisation when codes are
    /// given. A fetch error logs a warning and skips the batch.
    async fn fetch_contracts(
        &self,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
        organisation_codes: Option<&[String]>,
        limit: usize,
    ) -> Vec<ContractRecord> {
        let filter = ContractFilter::for_window(start_date, end_date);

        let outcome = match organisation_codes {
            Some(codes) if !codes.is_empty() => {
                let per_org_limit = (limit / codes.len()).max(1);
                let mut all = Vec::new();
                let mut failed = None;
                for code in codes {
                    let org_filter = filter.clone().with_organisation(code.clone());
                    match self.transparency.get_contracts(&org_filter, per_org_limit).await {
                        Ok(contracts) => all.extend(contracts),
                        Err(e) => {
                            failed = Some(e);
                            break;
                        }
                    }
                    tokio::time::sleep(Duration::from_millis(self.config.batch_delay_ms)).await;
                }
                match failed {
                    None => Ok(all),
                    Some(e) => Err(e),
                }
            }
            _ => self.transparency.get_contracts(&filter, limit).await,
        };

        match outcome {
            Ok(contracts) => contracts,
            Err(e) => {
                warn!(
                    error = %e,
                    start = %start_date.date_naive(),
                    end = %end_date.date_naive(),
                    "contract fetch failed"
                );
                Vec::new()
            }
        }
    }

    /// Cheap rule-based filter promoting contracts whose additive
    /// suspicion score reaches the promote level.
    pub fn pre_screen(
        &self,
        contracts: &[ContractRecord],
        source: &str,
    ) -> Vec<SuspiciousContract> {
        contracts
            .iter()
            .filter_map(|contract| {
                let signals = suspicion_signals(contract, self.config.value_threshold);
                if signals.score >= PROMOTE_SCORE {
                    Some(SuspiciousContract {
                        contract: contract.clone(),
                        suspicion_score: signals.score,
                        suspicion_reasons: signals.reasons,
                        source: source.to_string(),
                    })
                } else {
                    None
                }
            })
            .collect()
    }

    /// Investigate each suspicious contract. Returns
    /// `(investigations_created, anomalies_detected)`. Per-contract errors
    /// are logged and the loop continues.
    async fn investigate_batch(&self, suspicious: &[SuspiciousContract]) -> (usize, usize) {
        let mut investigations = 0usize;
        let mut anomalies_total = 0usize;

        for item in suspicious {
            match self.investigate_contract(item).await {
                Ok(anomalies) => {
                    investigations += 1;
                    anomalies_total += anomalies;
                }
                Err(e) => {
                    error!(
                        contract_id = item.contract.id().as_deref().unwrap_or("unknown"),
                        error = %e,
                        "auto investigation failed"
                    );
                }
            }
            tokio::time::sleep(Duration::from_millis(self.config.investigation_delay_ms)).await;
        }

        (investigations, anomalies_total)
    }

    /// Run one auto-investigation end to end: record, detect, update,
    /// persist anomalies, alert.
    async fn investigate_contract(&self, item: &SuspiciousContract) -> DomainResult<usize> {
        let subject = item.contract.subject();
        let subject_excerpt: String = subject.chars().take(100).collect();
        let query = format!("Auto-investigation: {subject_excerpt}");

        let row = self
            .store
            .create_auto_investigation(
                &query,
                json!({
                    "contract_id": item.contract.id(),
                    "auto_triggered": true,
                    "suspicion_score": item.suspicion_score,
                    "suspicion_reasons": item.suspicion_reasons,
                }),
                AUTO_MONITOR_USER,
            )
            .await?;
        let investigation_ref = InvestigationRef::Auto(row.id);

        let context = InvestigationContext::new()
            .with_user(AUTO_MONITOR_USER)
            .with_metadata("auto_investigation", json!(true))
            .with_metadata("contract_data", item.contract.raw().clone());

        let detector = self.registry.resolve(names::ANOMALY_DETECTOR).await?;
        let message = AgentMessage::new(
            "auto_monitor",
            names::ANOMALY_DETECTOR,
            "detect_anomalies",
            json!({
                "query": format!(
                    "Analyze contract {}",
                    item.contract.id().unwrap_or_else(|| "unknown".to_string())
                ),
                "contract_data": item.contract.raw(),
            }),
        );

        let response = detector.process(&message, &context).await?;
        let findings: Vec<serde_json::Value> = response
            .result
            .as_ref()
            .and_then(|v| v.get("findings"))
            .and_then(serde_json::Value::as_array)
            .cloned()
            .unwrap_or_default();

        self.store
            .update_investigation_status(
                investigation_ref,
                "completed",
                1.0,
                json!(findings),
                findings.len(),
            )
            .await?;

        // Persist every scored finding as an anomaly row; alert on
        // high/critical.
        let mut persisted = 0usize;
        for finding in &findings {
            let Some(score) = finding.get("anomaly_score").and_then(serde_json::Value::as_f64)
            else {
                continue;
            };
            let severity = Severity::from_score(score)?;

            let indicators: Vec<String> = finding
                .get("indicators")
                .and_then(serde_json::Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(serde_json::Value::as_str)
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default();

            let description = finding
                .get("description")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("Anomalia detectada em contrato")
                .to_string();

            let anomaly = self
                .store
                .create_anomaly(NewAnomaly {
                    investigation: investigation_ref,
                    source: item.source.clone(),
                    source_id: item.contract.id(),
                    anomaly_type: finding
                        .get("finding_type")
                        .and_then(serde_json::Value::as_str)
                        .unwrap_or("contract_risk")
                        .to_string(),
                    anomaly_score: score,
                    title: format!("Anomalia em contrato {}", item.contract.id().unwrap_or_default()),
                    description,
                    indicators,
                    recommendations: vec![
                        "Revisar documentação do processo licitatório".to_string(),
                        "Comparar valores com contratos similares".to_string(),
                    ],
                    contract_data: item.contract.raw().clone(),
                    metadata: json!({
                        "suspicion_score": item.suspicion_score,
                        "suspicion_reasons": item.suspicion_reasons,
                    }),
                })
                .await?;
            persisted += 1;

            if severity.is_alertable() {
                let mut channels = AlertService::default_channels();
                channels.push(AlertType::Email);
                self.alerts.send_anomaly_alert(&anomaly, &channels).await;
            }
        }

        info!(
            auto_investigation_id = %row.id,
            contract_id = item.contract.id().as_deref().unwrap_or("unknown"),
            anomalies = persisted,
            "auto investigation completed"
        );

        Ok(persisted)
    }
}
