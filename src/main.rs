//! Vigia CLI entry point.

use anyhow::{Context, Result};
use clap::Parser;

use vigia::cli::{app::App, commands, Cli, Commands};
use vigia::infrastructure::config::ConfigLoader;
use vigia::infrastructure::logging;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match cli.config {
        Some(ref path) => ConfigLoader::load_from_file(path)
            .with_context(|| format!("Failed to load configuration from {path}"))?,
        None => ConfigLoader::load().context("Failed to load configuration")?,
    };

    logging::init(&config.logging)?;

    let app = App::build(config).await.context("Failed to build services")?;

    match cli.command {
        Commands::Investigate { query } => {
            commands::handle_investigate(&app, &query, cli.json).await?;
        }
        Commands::Plan { query } => {
            commands::handle_plan(&app, &query, cli.json).await?;
        }
        Commands::Monitor(monitor_cmd) => {
            commands::handle_monitor(&app, monitor_cmd, cli.json).await?;
        }
        Commands::Queue(queue_cmd) => {
            commands::handle_queue(&app, queue_cmd, cli.json).await?;
        }
        Commands::Schedule(schedule_cmd) => {
            commands::handle_schedule(&app, schedule_cmd, cli.json).await?;
        }
        Commands::Serve => {
            commands::handle_serve(&app).await?;
        }
        Commands::Stats => {
            commands::handle_stats(&app, cli.json).await?;
        }
    }

    Ok(())
}
