//! Anomaly and alert models.
//!
//! Severity is a pure function of the anomaly score. An anomaly always
//! belongs to exactly one parent: a user-initiated investigation or an
//! unattended auto-investigation; [`InvestigationRef`] makes any other
//! shape unrepresentable.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};

/// Coarse anomaly classification derived from the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Derive severity from an anomaly score.
    ///
    /// Thresholds: >= 0.85 critical, >= 0.7 high, >= 0.5 medium, else low.
    /// Scores outside [0, 1] violate an internal invariant and fail fast.
    pub fn from_score(score: f64) -> DomainResult<Self> {
        if !(0.0..=1.0).contains(&score) || score.is_nan() {
            return Err(DomainError::InternalInvariant(format!(
                "anomaly score {score} outside [0, 1]"
            )));
        }
        Ok(if score >= 0.85 {
            Self::Critical
        } else if score >= 0.7 {
            Self::High
        } else if score >= 0.5 {
            Self::Medium
        } else {
            Self::Low
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Whether this severity warrants alert dispatch.
    pub fn is_alertable(&self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }

    /// Display colour used by email templates.
    pub fn color(&self) -> &'static str {
        match self {
            Self::Critical => "#dc3545",
            Self::High => "#fd7e14",
            Self::Medium => "#ffc107",
            Self::Low => "#28a745",
        }
    }
}

/// Triage status of a persisted anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyStatus {
    Detected,
    Triaged,
    Resolved,
}

impl AnomalyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Detected => "detected",
            Self::Triaged => "triaged",
            Self::Resolved => "resolved",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "detected" => Some(Self::Detected),
            "triaged" => Some(Self::Triaged),
            "resolved" => Some(Self::Resolved),
            _ => None,
        }
    }
}

/// Reference to the investigation that produced an anomaly.
///
/// Exactly one of the two parent tables applies; the enum enforces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvestigationRef {
    /// User-initiated investigation.
    Investigation(Uuid),
    /// Unattended auto-investigation.
    Auto(Uuid),
}

impl InvestigationRef {
    /// The `investigations` parent, if this is a user-initiated run.
    pub fn investigation_id(&self) -> Option<Uuid> {
        match self {
            Self::Investigation(id) => Some(*id),
            Self::Auto(_) => None,
        }
    }

    /// The `auto_investigations` parent, if this is an unattended run.
    pub fn auto_investigation_id(&self) -> Option<Uuid> {
        match self {
            Self::Auto(id) => Some(*id),
            Self::Investigation(_) => None,
        }
    }
}

/// A persisted anomaly row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    pub id: Uuid,
    /// Source system ("portal_transparencia", "dispensa_scan", ...).
    pub source: String,
    /// Identifier in the source system.
    pub source_id: Option<String>,
    pub anomaly_type: String,
    /// Score in [0, 1]; severity is derived from it.
    pub anomaly_score: f64,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub indicators: Vec<String>,
    pub recommendations: Vec<String>,
    /// Snapshot of the contract/dispensa that triggered the anomaly.
    pub contract_data: serde_json::Value,
    pub status: AnomalyStatus,
    /// Parent investigation (exactly one of the two tables).
    pub investigation: InvestigationRef,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Delivery channel of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    Webhook,
    Email,
    Dashboard,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Webhook => "webhook",
            Self::Email => "email",
            Self::Dashboard => "dashboard",
        }
    }
}

/// Delivery status of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Pending,
    Sent,
    Failed,
}

/// A persisted alert row, always referencing an existing anomaly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub anomaly_id: Uuid,
    pub alert_type: AlertType,
    pub severity: Severity,
    pub title: String,
    pub message: String,
    pub recipients: Vec<String>,
    pub status: AlertStatus,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}
