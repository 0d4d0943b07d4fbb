//! Domain error types for the Vigia investigation engine.
//!
//! The error taxonomy is closed and small: missing input, unavailable
//! agents, timeouts, retryable/permanent external failures, and internal
//! invariant violations. Each enum carries transience helpers so callers
//! can decide whether a retry budget applies.

use thiserror::Error;
use uuid::Uuid;

/// Top-level domain errors surfaced by the orchestrator and services.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An operation was invoked without its required input.
    #[error("Missing input: {0}")]
    MissingInput(String),

    /// A plan step names an agent absent from the registry.
    #[error("Agent not available: {0}")]
    AgentUnavailable(String),

    /// An agent invocation or plan execution failed.
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    /// An agent or task exceeded its deadline.
    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    /// Investigation with the given ID is not known to the orchestrator.
    #[error("Investigation not found: {0}")]
    InvestigationNotFound(Uuid),

    /// Internal invariant violated (unknown step, out-of-range score, etc.).
    /// Fail fast with a diagnostic.
    #[error("Internal invariant violated: {0}")]
    InternalInvariant(String),

    /// Validation of a model or configuration value failed.
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// Error from an external collaborator (data or store client).
    #[error(transparent)]
    External(#[from] ExternalApiError),

    /// Error from the persistence layer backing the queue.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

/// Errors from external HTTP collaborators (transparency data, dispensa
/// source, anomaly store).
#[derive(Debug, Error)]
pub enum ExternalApiError {
    /// Request failed at the network layer.
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// Rate limit exceeded (HTTP 429); honour `retry_after` before retrying.
    #[error("Rate limit exceeded, retry after {retry_after} seconds")]
    RateLimited { retry_after: u64 },

    /// Server-side failure (5xx); retryable up to the caller's budget.
    #[error("Server error {status}: {message}")]
    ServerError { status: u16, message: String },

    /// Client-side failure (non-429 4xx) or malformed payload; never retried.
    #[error("Permanent error {status}: {message}")]
    PermanentError { status: u16, message: String },

    /// Response body could not be parsed.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Request timed out.
    #[error("Request timeout after {0} seconds")]
    Timeout(u64),

    /// Retry budget exhausted.
    #[error("Failed after {0} attempts")]
    MaxRetriesExceeded(u32),
}

impl ExternalApiError {
    /// Returns true if this error is transient and should be retried.
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RequestFailed(_)
                | Self::RateLimited { .. }
                | Self::ServerError { .. }
                | Self::Timeout(_)
        )
    }

    /// Returns true if this error is permanent and should not be retried.
    pub const fn is_permanent(&self) -> bool {
        !self.is_transient()
    }
}

/// Errors related to the priority task queue.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// No handler has been registered for the task type.
    #[error("No handler registered for task type: {0}")]
    NoHandler(String),

    /// Task with the given ID was not found in any queue state.
    #[error("Task not found: {0}")]
    TaskNotFound(Uuid),

    /// Task has exceeded the maximum number of retry attempts.
    #[error("Task cannot be retried (max retries reached)")]
    MaxRetriesExceeded,

    /// The queue is not accepting new tasks (stopped or stopping).
    #[error("Queue is not running")]
    NotRunning,
}

impl QueueError {
    /// Returns true if this error represents a permanent failure.
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::NoHandler(_) | Self::MaxRetriesExceeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_input_display() {
        let err = DomainError::MissingInput("query".to_string());
        assert_eq!(err.to_string(), "Missing input: query");
    }

    #[test]
    fn test_agent_unavailable_display() {
        let err = DomainError::AgentUnavailable("anomaly_detector".to_string());
        assert_eq!(err.to_string(), "Agent not available: anomaly_detector");
    }

    #[test]
    fn test_timeout_display() {
        let err = DomainError::Timeout(30);
        assert_eq!(err.to_string(), "Timeout after 30 seconds");
    }

    #[test]
    fn test_external_error_is_transient() {
        assert!(ExternalApiError::RateLimited { retry_after: 60 }.is_transient());
        assert!(ExternalApiError::Timeout(30).is_transient());
        assert!(ExternalApiError::ServerError {
            status: 503,
            message: "unavailable".to_string()
        }
        .is_transient());
        assert!(ExternalApiError::RequestFailed("connection reset".to_string()).is_transient());
    }

    #[test]
    fn test_external_error_is_permanent() {
        assert!(ExternalApiError::PermanentError {
            status: 400,
            message: "bad request".to_string()
        }
        .is_permanent());
        assert!(ExternalApiError::InvalidResponse("not json".to_string()).is_permanent());
        assert!(ExternalApiError::MaxRetriesExceeded(3).is_permanent());
        assert!(!ExternalApiError::RateLimited { retry_after: 10 }.is_permanent());
    }

    #[test]
    fn test_queue_error_is_permanent() {
        assert!(QueueError::NoHandler("unknown".to_string()).is_permanent());
        assert!(QueueError::MaxRetriesExceeded.is_permanent());
        assert!(!QueueError::TaskNotFound(Uuid::new_v4()).is_permanent());
    }

    #[test]
    fn test_external_error_into_domain_error() {
        let err: DomainError = ExternalApiError::Timeout(10).into();
        assert_eq!(err.to_string(), "Request timeout after 10 seconds");
    }
}
