//! Anomaly detection specialist.
//!
//! Scores contract records with the additive suspicion signals used across
//! the engine: value above threshold, waiver/emergency modality, single
//! bidder. Contracts can arrive inline in the message payload, or be
//! fetched from the transparency provider when a client is attached.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tracing::{debug, info};

use super::names;
use crate::domain::errors::DomainResult;
use crate::domain::models::{
    AgentMessage, AgentResponse, ContractFilter, ContractRecord, InvestigationContext,
};
use crate::domain::ports::{Agent, TransparencyClient};

/// Additive suspicion signals for one contract.
#[derive(Debug, Clone, Default)]
pub struct SuspicionSignals {
    pub score: u32,
    pub reasons: Vec<String>,
}

/// Maximum attainable suspicion score (2 + 3 + 2).
const MAX_SUSPICION: u32 = 7;

/// Compute the pre-screen suspicion signals for a contract.
///
/// Value above `value_threshold` adds 2, a `dispensa`/`inexigibilidade`
/// modality adds 3, a single bidder adds 2.
pub fn suspicion_signals(contract: &ContractRecord, value_threshold: f64) -> SuspicionSignals {
    let mut signals = SuspicionSignals::default();

    let valor = contract.value();
    if valor > value_threshold {
        signals.score += 2;
        signals.reasons.push(format!("high_value:{valor}"));
    }

    let modalidade = contract.modality();
    if modalidade.contains("dispensa") || modalidade.contains("inexigibilidade") {
        signals.score += 3;
        signals.reasons.push(format!("emergency_process:{modalidade}"));
    }

    if contract.bidder_count() == 1 {
        signals.score += 2;
        signals.reasons.push("single_bidder".to_string());
    }

    signals
}

/// Detector of anomalous contracts and waivers.
pub struct AnomalyDetector {
    capabilities: Vec<String>,
    /// Contract value above which the high-value signal trips.
    value_threshold: f64,
    /// Optional data client for query-only invocations.
    client: Option<Arc<dyn TransparencyClient>>,
    /// Records fetched per query-only invocation.
    fetch_limit: usize,
}

impl AnomalyDetector {
    pub fn new(value_threshold: f64) -> Self {
        Self {
            capabilities: vec!["detect_anomalies".to_string()],
            value_threshold,
            client: None,
            fetch_limit: 100,
        }
    }

    /// Attach a transparency client used when no contracts arrive inline.
    pub fn with_client(mut self, client: Arc<dyn TransparencyClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Contracts from the payload: `contract_data` (single) or
    /// `contracts` (list).
    fn inline_contracts(payload: &serde_json::Value) -> Vec<ContractRecord> {
        if let Some(single) = payload.get("contract_data") {
            if !single.is_null() {
                return vec![ContractRecord::new(single.clone())];
            }
        }
        payload
            .get("contracts")
            .and_then(serde_json::Value::as_array)
            .map(|items| items.iter().cloned().map(ContractRecord::new).collect())
            .unwrap_or_default()
    }

    async fn gather_contracts(&self, payload: &serde_json::Value) -> Vec<ContractRecord> {
        let inline = Self::inline_contracts(payload);
        if !inline.is_empty() {
            return inline;
        }

        let Some(ref client) = self.client else {
            return Vec::new();
        };

        let end = Utc::now();
        let start = end - chrono::Duration::days(30);
        let filter = ContractFilter::for_window(start, end);
        match client.get_contracts(&filter, self.fetch_limit).await {
            Ok(contracts) => contracts,
            Err(e) => {
                debug!(error = %e, "contract fetch for detection failed");
                Vec::new()
            }
        }
    }

    fn detect(&self, contracts: &[ContractRecord], sensitivity_high: bool) -> Vec<serde_json::Value> {
        // High sensitivity halves the value threshold and flags any
        // scored contract; normal sensitivity requires the promote level.
        let threshold = if sensitivity_high {
            self.value_threshold / 2.0
        } else {
            self.value_threshold
        };
        let min_score = if sensitivity_high { 1 } else { 3 };

        let mut findings = Vec::new();
        for contract in contracts {
            let signals = suspicion_signals(contract, threshold);
            if signals.score < min_score {
                continue;
            }
            let anomaly_score = f64::from(signals.score.min(MAX_SUSPICION)) / f64::from(MAX_SUSPICION);
            findings.push(json!({
                "finding_type": "contract_risk",
                "description": format!(
                    "Contrato {} com sinais de risco: {}",
                    contract.id().unwrap_or_else(|| "sem id".to_string()),
                    signals.reasons.join(", ")
                ),
                "anomaly_score": anomaly_score,
                "contract_id": contract.id(),
                "indicators": signals.reasons,
            }));
        }
        findings
    }
}

#[async_trait]
impl Agent for AnomalyDetector {
    fn name(&self) -> &str {
        names::ANOMALY_DETECTOR
    }

    fn description(&self) -> &str {
        "Detects anomalous contracts: overpricing signals, waiver processes, single bidders"
    }

    fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    async fn process(
        &self,
        message: &AgentMessage,
        _context: &InvestigationContext,
    ) -> DomainResult<AgentResponse> {
        let sensitivity_high = message
            .payload
            .get("sensitivity")
            .and_then(serde_json::Value::as_str)
            == Some("high");

        let contracts = self.gather_contracts(&message.payload).await;
        let findings = self.detect(&contracts, sensitivity_high);

        info!(
            contracts = contracts.len(),
            findings = findings.len(),
            sensitivity_high,
            "anomaly detection completed"
        );

        Ok(AgentResponse::completed(
            self.name(),
            json!({
                "findings": findings,
                "sources": ["portal_transparencia"],
                "contracts_analyzed": contracts.len(),
            }),
        ))
    }
}
