//! Agent messaging primitives.
//!
//! Messages address agents by name; responses carry a status, an opaque
//! JSON result, and timing metadata. The orchestrator never assumes a
//! concrete agent type beyond these shapes.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome status of one agent invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Invocation finished and produced a usable result.
    Completed,
    /// Invocation failed; `error` carries the diagnostic.
    Error,
    /// Invocation finished but the result is degraded.
    Warning,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Warning => "warning",
        }
    }
}

/// A message sent to an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    /// Name of the sender (orchestrator or another agent).
    pub sender: String,
    /// Name of the addressed agent.
    pub recipient: String,
    /// Requested action (must be one of the agent's capabilities).
    pub action: String,
    /// Action parameters, opaque to the engine.
    pub payload: serde_json::Value,
}

impl AgentMessage {
    pub fn new(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        action: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            sender: sender.into(),
            recipient: recipient.into(),
            action: action.into(),
            payload,
        }
    }
}

/// Response from a single agent invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    /// Name of the responding agent.
    pub agent_name: String,
    /// Outcome status.
    pub status: AgentStatus,
    /// Result payload when status is not `Error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Error message when status is `Error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Free-form metadata (action, investigation id, ...).
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// Wall-clock processing time in milliseconds.
    #[serde(default)]
    pub processing_time_ms: u64,
}

impl AgentResponse {
    /// Build a completed response with a result payload.
    pub fn completed(agent_name: impl Into<String>, result: serde_json::Value) -> Self {
        Self {
            agent_name: agent_name.into(),
            status: AgentStatus::Completed,
            result: Some(result),
            error: None,
            metadata: HashMap::new(),
            processing_time_ms: 0,
        }
    }

    /// Build an error response with a diagnostic message.
    pub fn error(agent_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            status: AgentStatus::Error,
            result: None,
            error: Some(error.into()),
            metadata: HashMap::new(),
            processing_time_ms: 0,
        }
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Whether the invocation completed successfully.
    pub fn is_success(&self) -> bool {
        self.status == AgentStatus::Completed
    }
}

/// Context for one end-to-end investigation run.
///
/// Created when an investigation begins and dropped when the orchestrator
/// returns a result or fails terminally. IDs are time-ordered-friendly
/// (UUID plus started_at).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestigationContext {
    pub investigation_id: Uuid,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub trace_id: Option<String>,
    /// Free-form per-run metadata (e.g. contract snapshot for auto runs).
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub started_at: DateTime<Utc>,
}

impl InvestigationContext {
    pub fn new() -> Self {
        Self {
            investigation_id: Uuid::new_v4(),
            user_id: None,
            session_id: None,
            trace_id: None,
            metadata: HashMap::new(),
            started_at: Utc::now(),
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

impl Default for InvestigationContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completed_response() {
        let resp = AgentResponse::completed("anomaly_detector", serde_json::json!({"findings": []}));
        assert!(resp.is_success());
        assert!(resp.error.is_none());
        assert_eq!(resp.agent_name, "anomaly_detector");
    }

    #[test]
    fn test_error_response() {
        let resp = AgentResponse::error("reporter", "Timeout after 30 seconds");
        assert!(!resp.is_success());
        assert_eq!(resp.status, AgentStatus::Error);
        assert_eq!(resp.error.as_deref(), Some("Timeout after 30 seconds"));
    }

    #[test]
    fn test_context_metadata() {
        let ctx = InvestigationContext::new()
            .with_user("auto-monitor")
            .with_metadata("auto_investigation", serde_json::json!(true));
        assert_eq!(ctx.user_id.as_deref(), Some("auto-monitor"));
        assert!(ctx.metadata.contains_key("auto_investigation"));
    }

    #[test]
    fn test_status_as_str() {
        assert_eq!(AgentStatus::Completed.as_str(), "completed");
        assert_eq!(AgentStatus::Error.as_str(), "error");
        assert_eq!(AgentStatus::Warning.as_str(), "warning");
    }
}
