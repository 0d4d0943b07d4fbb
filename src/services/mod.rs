//! Engine services: planning, orchestration, parallel execution, the
//! priority queue, scheduling, monitoring and alerting.

pub mod alerts;
pub mod monitor;
pub mod orchestrator;
pub mod parallel;
pub mod planner;
pub mod queue;
pub mod registry;
pub mod scheduler;

pub use alerts::{AlertDispatchSummary, AlertService, AlertingConfig};
pub use monitor::{AutoInvestigationMonitor, MonitorConfig, MonitoringRunSummary};
pub use orchestrator::{confidence_score, MasterOrchestrator};
pub use parallel::{
    AggregatedResults, ExecutorConfig, ExecutorStats, ParallelExecutor, ParallelResult,
    ParallelStrategy, ParallelTask,
};
pub use planner::InvestigationPlanner;
pub use queue::{PriorityQueueService, QueueConfig, TaskHandler};
pub use registry::{AgentLease, AgentPool, AgentRegistry};
pub use scheduler::{PeriodicScheduler, ScheduleEntry, SchedulerConfig};
