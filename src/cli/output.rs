//! Table rendering for human-readable CLI output.

use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, ContentArrangement, Table};

use crate::domain::models::{Execution, Task};
use crate::domain::ports::TaskStats;

pub fn task_table(tasks: &[Task]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["ID", "Name", "Type", "Trigger", "Enabled", "Runs", "OK", "Failed"]);
    for task in tasks {
        table.add_row(vec![
            Cell::new(short_id(&task.id.to_string())),
            Cell::new(&task.name),
            Cell::new(task.kind().as_str()),
            Cell::new(trigger_summary(task)),
            Cell::new(if task.enabled { "yes" } else { "no" }),
            Cell::new(task.run_count),
            Cell::new(task.success_count),
            Cell::new(task.failure_count),
        ]);
    }
    table
}

pub fn execution_table(executions: &[Execution]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["ID", "Task", "Trigger", "Status", "Duration", "Exit", "Started"]);
    for execution in executions {
        table.add_row(vec![
            Cell::new(short_id(&execution.id.to_string())),
            Cell::new(short_id(&execution.task_id.to_string())),
            Cell::new(execution.trigger_type.as_str()),
            Cell::new(execution.status.as_str()),
            Cell::new(
                execution
                    .duration_ms
                    .map_or_else(|| "-".to_string(), |d| format!("{d} ms")),
            ),
            Cell::new(
                execution
                    .exit_code
                    .map_or_else(|| "-".to_string(), |c| c.to_string()),
            ),
            Cell::new(
                execution
                    .started_at
                    .map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d %H:%M:%S").to_string()),
            ),
        ]);
    }
    table
}

pub fn stats_table(stats: &TaskStats) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_header(vec!["Metric", "Value"]);
    table.add_row(vec![
        Cell::new("Total runs"),
        Cell::new(stats.total_runs),
    ]);
    table.add_row(vec![
        Cell::new("Successful"),
        Cell::new(stats.successful_runs),
    ]);
    table.add_row(vec![Cell::new("Failed"), Cell::new(stats.failed_runs)]);
    table.add_row(vec![
        Cell::new("Avg duration"),
        Cell::new(
            stats
                .average_duration_ms
                .map_or_else(|| "-".to_string(), |d| format!("{d:.0} ms")),
        ),
    ]);
    table.add_row(vec![
        Cell::new("Total cost"),
        Cell::new(
            stats
                .total_cost_usd
                .map_or_else(|| "-".to_string(), |c| format!("${c:.4}")),
        ),
    ]);
    table
}

fn trigger_summary(task: &Task) -> String {
    use crate::domain::models::Trigger;
    match &task.trigger {
        Trigger::Manual => "manual".to_string(),
        Trigger::Cron { schedule } => format!("cron: {schedule}"),
        Trigger::Event { event, filters } => {
            if filters.is_empty() {
                format!("on {}", event.as_str())
            } else {
                format!("on {} ({} filters)", event.as_str(), filters.len())
            }
        }
    }
}

fn short_id(id: &str) -> String {
    id.chars().take(8).collect()
}
