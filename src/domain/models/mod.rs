//! Domain models for the investigation engine.

pub mod anomaly;
pub mod contract;
pub mod investigation;
pub mod message;
pub mod plan;
pub mod queue;

pub use anomaly::{Alert, AlertStatus, AlertType, Anomaly, AnomalyStatus, InvestigationRef, Severity};
pub use contract::{ContractFilter, ContractRecord, Dispensa};
pub use investigation::{Finding, InvestigationResult};
pub use message::{AgentMessage, AgentResponse, AgentStatus, InvestigationContext};
pub use plan::{InvestigationPlan, PlanStep, QualityCriteria};
pub use queue::{QueueStats, QueuedTask, TaskPriority, TaskResult, TaskState};
