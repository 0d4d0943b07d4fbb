//! Terminal output helpers.

use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::domain::models::{InvestigationPlan, InvestigationResult, QueueStats};
use crate::services::monitor::MonitoringRunSummary;
use crate::services::parallel::ExecutorStats;
use crate::services::scheduler::ScheduleEntry;

/// Spinner shown while a long operation runs.
pub fn spinner(message: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner} {msg}").unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

fn base_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Render an investigation result.
pub fn print_investigation_result(result: &InvestigationResult) {
    println!(
        "{} {}",
        style("Investigation").bold(),
        style(result.investigation_id).dim()
    );

    let mut table = base_table();
    table.set_header(vec!["Findings", "Sources", "Confidence", "Time (ms)"]);
    table.add_row(vec![
        Cell::new(result.findings.len()),
        Cell::new(result.sources.join(", ")),
        Cell::new(format!("{:.2}", result.confidence_score)),
        Cell::new(result.processing_time_ms),
    ]);
    println!("{table}");

    println!("\n{}\n{}", style("Explanation").bold(), result.explanation);
}

/// Render an investigation plan.
pub fn print_plan(plan: &InvestigationPlan) {
    println!("{} {}", style("Objective:").bold(), plan.objective);
    println!(
        "{} {}s, min confidence {:.2}",
        style("Estimate:").bold(),
        plan.estimated_time_seconds,
        plan.quality_criteria.min_confidence
    );

    let mut table = base_table();
    table.set_header(vec!["#", "Agent", "Action", "Depends on"]);
    for (i, step) in plan.steps.iter().enumerate() {
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(&step.agent),
            Cell::new(&step.action),
            Cell::new(step.depends_on.join(", ")),
        ]);
    }
    println!("{table}");
}

/// Render a monitoring run summary.
pub fn print_monitor_summary(summary: &MonitoringRunSummary) {
    let mut table = base_table();
    table.set_header(vec![
        "Type",
        "Analyzed",
        "Suspicious",
        "Investigations",
        "Anomalies",
        "Duration (s)",
    ]);
    table.add_row(vec![
        Cell::new(&summary.monitoring_type),
        Cell::new(summary.contracts_analyzed),
        Cell::new(summary.suspicious_found),
        Cell::new(summary.investigations_created),
        Cell::new(summary.anomalies_detected),
        Cell::new(format!("{:.1}", summary.duration_seconds)),
    ]);
    println!("{table}");

    if summary.anomalies_detected > 0 {
        println!(
            "{}",
            style(format!("{} anomalies persisted", summary.anomalies_detected)).red()
        );
    } else {
        println!("{}", style("no anomalies detected").green());
    }
}

/// Render queue statistics.
pub fn print_queue_stats(stats: &QueueStats) {
    let mut table = base_table();
    table.set_header(vec![
        "Pending",
        "Processing",
        "Completed",
        "Failed",
        "Processed",
        "Avg time (s)",
    ]);
    table.add_row(vec![
        Cell::new(stats.pending_tasks),
        Cell::new(stats.processing_tasks),
        Cell::new(stats.completed_tasks),
        Cell::new(stats.failed_tasks),
        Cell::new(stats.total_processed),
        Cell::new(format!("{:.2}", stats.average_processing_time)),
    ]);
    println!("{table}");

    if !stats.tasks_by_priority.is_empty() {
        let mut by_priority = base_table();
        by_priority.set_header(vec!["Priority", "Pending"]);
        let mut entries: Vec<_> = stats.tasks_by_priority.iter().collect();
        entries.sort();
        for (priority, count) in entries {
            by_priority.add_row(vec![Cell::new(priority), Cell::new(count)]);
        }
        println!("{by_priority}");
    }
}

/// Render the schedule list.
pub fn print_schedules(entries: &[ScheduleEntry]) {
    let mut table = base_table();
    table.set_header(vec![
        "Name",
        "Interval (s)",
        "Task type",
        "Priority",
        "Active",
        "Fired",
    ]);
    for entry in entries {
        table.add_row(vec![
            Cell::new(&entry.name),
            Cell::new(entry.interval_seconds),
            Cell::new(&entry.task_type),
            Cell::new(entry.priority.as_str()),
            Cell::new(entry.active),
            Cell::new(entry.fire_count),
        ]);
    }
    println!("{table}");
}

/// Render executor statistics.
pub fn print_executor_stats(stats: &ExecutorStats) {
    let mut table = base_table();
    table.set_header(vec![
        "Total tasks",
        "Successful",
        "Failed",
        "Success rate",
        "Avg time (s)",
    ]);
    table.add_row(vec![
        Cell::new(stats.total_tasks),
        Cell::new(stats.successful_tasks),
        Cell::new(stats.failed_tasks),
        Cell::new(format!("{:.0}%", stats.avg_success_rate * 100.0)),
        Cell::new(format!("{:.2}", stats.avg_execution_time)),
    ]);
    println!("{table}");
}
