//! Command handlers.

use anyhow::{Context, Result};
use console::style;

use super::app::App;
use super::display;
use super::{MonitorCommands, QueueCommands, ScheduleCommands};
use crate::domain::models::InvestigationContext;
use crate::domain::ports::Reflective;

/// Run an investigation and print the result.
pub async fn handle_investigate(app: &App, query: &str, json: bool) -> Result<()> {
    let context = InvestigationContext::new().with_user("cli");

    let bar = if json { None } else { Some(display::spinner("investigating...")) };
    let result = app
        .orchestrator
        .investigate(query, &context)
        .await
        .context("Investigation failed")?;
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        display::print_investigation_result(&result);
    }

    // Self-reflection when the orchestrator offers the capability.
    if let Some(reflective) = app.registry.get_reflective(app.orchestrator.name()).await {
        let reflection = reflective
            .reflect(&serde_json::to_value(&result)?, &context)
            .await
            .map_err(|e| anyhow::anyhow!("reflection failed: {e}"))?;
        if json {
            println!("{}", serde_json::to_string_pretty(&reflection)?);
        } else {
            println!(
                "{} {:.2}",
                style("Quality score:").bold(),
                reflection.quality_score
            );
            for issue in &reflection.issues {
                println!("  {} {issue}", style("issue:").yellow());
            }
        }
    }
    Ok(())
}

/// Print the plan for a query without executing it.
pub async fn handle_plan(app: &App, query: &str, json: bool) -> Result<()> {
    let context = InvestigationContext::new();
    let plan = app
        .orchestrator
        .plan_investigation(query, &context)
        .await
        .map_err(|e| anyhow::anyhow!("planning failed: {e}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        display::print_plan(&plan);
    }
    Ok(())
}

/// Monitor subcommands.
pub async fn handle_monitor(app: &App, command: MonitorCommands, json: bool) -> Result<()> {
    let bar = if json { None } else { Some(display::spinner("monitoring...")) };
    let summary = match command {
        MonitorCommands::Run {
            lookback_hours,
            organisations,
        } => {
            let codes = if organisations.is_empty() {
                None
            } else {
                Some(organisations)
            };
            app.monitor.monitor_new_contracts(lookback_hours, codes).await
        }
        MonitorCommands::Reanalyze {
            months_back,
            batch_size,
        } => app.monitor.reanalyze_historical(months_back, batch_size).await,
        MonitorCommands::Dispensas => app.monitor.scan_dispensas().await,
    }
    .map_err(|e| anyhow::anyhow!("monitoring run failed: {e}"))?;
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        display::print_monitor_summary(&summary);
    }
    Ok(())
}

/// Queue subcommands.
pub async fn handle_queue(app: &App, command: QueueCommands, json: bool) -> Result<()> {
    match command {
        QueueCommands::Stats => {
            let stats = app.queue.get_stats().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                display::print_queue_stats(&stats);
            }
        }
        QueueCommands::Status { task_id } => {
            match app.queue.get_task_status(task_id).await {
                Some(state) => println!("{}", state.as_str()),
                None => println!("unknown"),
            }
            if let Some(result) = app.queue.get_task_result(task_id).await {
                println!("{}", serde_json::to_string_pretty(&result)?);
            }
        }
        QueueCommands::Enqueue {
            task_type,
            payload,
            priority,
            max_retries,
            callback_url,
        } => {
            let payload: serde_json::Value =
                serde_json::from_str(&payload).context("payload must be valid JSON")?;
            let priority = App::parse_priority(&priority)?;
            let task_id = app
                .queue
                .enqueue(task_type, payload, priority, None, max_retries, callback_url, None)
                .await
                .map_err(|e| anyhow::anyhow!("enqueue failed: {e}"))?;
            println!("{task_id}");
        }
        QueueCommands::Cancel { task_id } => {
            if app.queue.cancel_task(task_id).await {
                println!("{}", style("cancelled").green());
            } else {
                println!("{}", style("cannot cancel: task is processing").red());
            }
        }
    }
    Ok(())
}

/// Schedule subcommands.
pub async fn handle_schedule(app: &App, command: ScheduleCommands, json: bool) -> Result<()> {
    match command {
        ScheduleCommands::List => {
            app.scheduler.register_builtin_schedules().await;
            let entries = app.scheduler.list().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                display::print_schedules(&entries);
            }
        }
    }
    Ok(())
}

/// Run workers and scheduler until interrupted.
pub async fn handle_serve(app: &App) -> Result<()> {
    app.register_builtin_handlers().await;
    app.scheduler.register_builtin_schedules().await;

    app.queue
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("queue start failed: {e}"))?;
    let scheduler_handle = app.scheduler.start();

    println!(
        "{} workers={} schedules={}",
        style("vigia serving").green().bold(),
        app.config.queue.max_workers,
        app.scheduler.list().await.len()
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    println!("{}", style("shutting down").yellow());

    app.scheduler.stop();
    scheduler_handle.abort();
    app.queue.stop().await;
    app.registry
        .shutdown_all()
        .await
        .map_err(|e| anyhow::anyhow!("agent shutdown failed: {e}"))?;
    Ok(())
}

/// Print engine statistics.
pub async fn handle_stats(app: &App, json: bool) -> Result<()> {
    let executor_stats = app.executor.stats();
    let queue_stats = app.queue.get_stats().await;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "executor": executor_stats,
                "queue": queue_stats,
                "registered_agents": app.registry.names().await,
            }))?
        );
    } else {
        println!("{}", style("Executor").bold());
        display::print_executor_stats(&executor_stats);
        println!("{}", style("Queue").bold());
        display::print_queue_stats(&queue_stats);
    }
    Ok(())
}
