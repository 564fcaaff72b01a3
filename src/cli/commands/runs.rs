//! Execution history and statistics handlers.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use uuid::Uuid;

use crate::cli::output;
use crate::domain::models::ExecutionStatus;
use crate::domain::ports::{ExecutionFilter, Storage};

pub async fn handle_runs(
    storage: &Arc<dyn Storage>,
    task: Option<Uuid>,
    status: Option<String>,
    limit: u32,
    offset: u32,
    json: bool,
) -> Result<()> {
    let status = status
        .map(|s| {
            ExecutionStatus::from_str(&s).ok_or_else(|| anyhow!("unknown status '{s}'"))
        })
        .transpose()?;

    let executions = storage
        .load_executions(ExecutionFilter {
            task_id: task,
            status,
            limit: Some(limit),
            offset: Some(offset),
            start_date: None,
            end_date: None,
        })
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&executions)?);
    } else if executions.is_empty() {
        println!("No executions.");
    } else {
        println!("{}", output::execution_table(&executions));
    }
    Ok(())
}

pub async fn handle_stats(storage: &Arc<dyn Storage>, task_id: Uuid, json: bool) -> Result<()> {
    // Fail loudly for a missing task rather than printing zeroes.
    storage
        .get_task(task_id)
        .await?
        .ok_or_else(|| anyhow!("task {task_id} not found"))?;
    let stats = storage.get_task_stats(task_id).await?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "total_runs": stats.total_runs,
                "successful_runs": stats.successful_runs,
                "failed_runs": stats.failed_runs,
                "average_duration_ms": stats.average_duration_ms,
                "total_cost_usd": stats.total_cost_usd,
            })
        );
    } else {
        println!("{}", output::stats_table(&stats));
    }
    Ok(())
}
