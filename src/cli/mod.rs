//! Command-line interface over the engine operations.

pub mod app;
pub mod commands;
pub mod display;

use clap::{Parser, Subcommand};

/// Vigia - multi-agent investigation engine for public-sector
/// transparency data.
#[derive(Parser, Debug)]
#[command(name = "vigia", version, about)]
pub struct Cli {
    /// Output JSON instead of tables.
    #[arg(long, global = true)]
    pub json: bool,

    /// Path to a configuration file (defaults to .vigia/config.yaml).
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run an investigation for a free-text query.
    Investigate {
        /// Query text, e.g. "contratos suspeitos no nordeste".
        query: String,
    },
    /// Show the plan that would be generated for a query.
    Plan {
        query: String,
    },
    /// Auto-investigation monitor operations.
    #[command(subcommand)]
    Monitor(MonitorCommands),
    /// Priority queue operations.
    #[command(subcommand)]
    Queue(QueueCommands),
    /// Periodic schedule operations.
    #[command(subcommand)]
    Schedule(ScheduleCommands),
    /// Run the queue workers and scheduler until interrupted.
    Serve,
    /// Show orchestrator and executor statistics.
    Stats,
}

#[derive(Subcommand, Debug)]
pub enum MonitorCommands {
    /// Monitor new contracts from the last N hours.
    Run {
        #[arg(long)]
        lookback_hours: Option<u64>,
        /// Organisation codes to monitor (repeatable).
        #[arg(long = "org")]
        organisations: Vec<String>,
    },
    /// Re-analyze historical contracts in weekly batches.
    Reanalyze {
        #[arg(long)]
        months_back: Option<u32>,
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Scan the external dispensa source.
    Dispensas,
}

#[derive(Subcommand, Debug)]
pub enum QueueCommands {
    /// Show queue statistics.
    Stats,
    /// Show the status of a task.
    Status {
        task_id: uuid::Uuid,
    },
    /// Enqueue a task.
    Enqueue {
        task_type: String,
        /// JSON payload.
        #[arg(long, default_value = "{}")]
        payload: String,
        #[arg(long, default_value = "normal")]
        priority: String,
        #[arg(long, default_value_t = 3)]
        max_retries: u32,
        #[arg(long)]
        callback_url: Option<String>,
    },
    /// Cancel a pending task.
    Cancel {
        task_id: uuid::Uuid,
    },
}

#[derive(Subcommand, Debug)]
pub enum ScheduleCommands {
    /// List registered schedules.
    List,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_structure_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_investigate() {
        let cli = Cli::parse_from(["vigia", "investigate", "contratos suspeitos"]);
        match cli.command {
            Commands::Investigate { query } => assert_eq!(query, "contratos suspeitos"),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_monitor_run_with_orgs() {
        let cli = Cli::parse_from([
            "vigia", "monitor", "run", "--lookback-hours", "6", "--org", "26000", "--org", "36000",
        ]);
        match cli.command {
            Commands::Monitor(MonitorCommands::Run {
                lookback_hours,
                organisations,
            }) => {
                assert_eq!(lookback_hours, Some(6));
                assert_eq!(organisations, vec!["26000", "36000"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_queue_enqueue_defaults() {
        let cli = Cli::parse_from(["vigia", "queue", "enqueue", "system.health_ping"]);
        match cli.command {
            Commands::Queue(QueueCommands::Enqueue {
                task_type,
                payload,
                priority,
                max_retries,
                callback_url,
            }) => {
                assert_eq!(task_type, "system.health_ping");
                assert_eq!(payload, "{}");
                assert_eq!(priority, "normal");
                assert_eq!(max_retries, 3);
                assert!(callback_url.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
