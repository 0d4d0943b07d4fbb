//! Investigation result model.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::plan::InvestigationPlan;

/// A single finding produced by an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    /// Kind of finding (e.g. "price", "vendor", "temporal").
    #[serde(default)]
    pub finding_type: Option<String>,
    /// Human-readable description.
    #[serde(default)]
    pub description: Option<String>,
    /// Anomaly score in [0, 1] when the finding is an anomaly signal.
    #[serde(default)]
    pub anomaly_score: Option<f64>,
    /// Additional fields carried through untouched.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Finding {
    pub fn new(finding_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            finding_type: Some(finding_type.into()),
            description: Some(description.into()),
            anomaly_score: None,
            extra: HashMap::new(),
        }
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.anomaly_score = Some(score);
        self
    }
}

/// Result of one end-to-end investigation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestigationResult {
    pub investigation_id: Uuid,
    /// Original query text.
    pub query: String,
    /// Merged findings from all completed steps.
    pub findings: Vec<Finding>,
    /// Deduplicated data sources consulted.
    pub sources: Vec<String>,
    /// Confidence in the results, in [0, 1].
    pub confidence_score: f64,
    /// Narrative explanation of the findings.
    pub explanation: String,
    /// Plan snapshot, agents used, steps executed. The plan is stored as a
    /// value copy, not a reference.
    pub metadata: ResultMetadata,
    /// Wall-clock processing time in milliseconds.
    pub processing_time_ms: u64,
    pub timestamp: DateTime<Utc>,
}

/// Metadata block of an [`InvestigationResult`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultMetadata {
    pub plan: InvestigationPlan,
    pub steps_executed: usize,
    pub agents_used: Vec<String>,
}

impl InvestigationResult {
    /// Mean anomaly score across findings (0 when there are none).
    pub fn anomaly_rate(&self) -> f64 {
        let scores: Vec<f64> = self
            .findings
            .iter()
            .filter_map(|f| f.anomaly_score)
            .collect();
        if scores.is_empty() {
            return 0.0;
        }
        scores.iter().sum::<f64>() / scores.len() as f64
    }
}
