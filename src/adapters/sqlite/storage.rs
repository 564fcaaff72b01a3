//! SQLite implementation of the storage contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    Execution, ExecutionStatus, Handler, Task, TaskConfig, TaskOptions, Trigger, TriggerType,
    UsageInfo,
};
use crate::domain::ports::{
    ExecutionFilter, ExecutionProgress, Storage, TaskFilter, TaskStats,
};

#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn create_task(&self, task: &Task) -> DomainResult<()> {
        let config_json = serde_json::to_string(&task.config)?;
        let trigger_json = serde_json::to_string(&task.trigger)?;
        let options_json = serde_json::to_string(&task.options)?;
        let handlers_json = serde_json::to_string(&task.handlers)?;

        sqlx::query(
            r#"INSERT INTO tasks (id, name, task_type, enabled, config, trigger_type,
               trigger_config, trigger_event, options, handlers, run_count, success_count,
               failure_count, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(task.id.to_string())
        .bind(&task.name)
        .bind(task.kind().as_str())
        .bind(i64::from(task.enabled))
        .bind(&config_json)
        .bind(task.trigger.kind_str())
        .bind(&trigger_json)
        .bind(task.trigger.event_type().map(|e| e.as_str()))
        .bind(&options_json)
        .bind(&handlers_json)
        .bind(task.run_count as i64)
        .bind(task.success_count as i64)
        .bind(task.failure_count as i64)
        .bind(task.created_at.to_rfc3339())
        .bind(task.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_task(&self, id: Uuid) -> DomainResult<Option<Task>> {
        let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn update_task(&self, task: &Task) -> DomainResult<()> {
        let config_json = serde_json::to_string(&task.config)?;
        let trigger_json = serde_json::to_string(&task.trigger)?;
        let options_json = serde_json::to_string(&task.options)?;
        let handlers_json = serde_json::to_string(&task.handlers)?;

        let result = sqlx::query(
            r#"UPDATE tasks SET name = ?, task_type = ?, enabled = ?, config = ?,
               trigger_type = ?, trigger_config = ?, trigger_event = ?, options = ?,
               handlers = ?, updated_at = ?
               WHERE id = ?"#,
        )
        .bind(&task.name)
        .bind(task.kind().as_str())
        .bind(i64::from(task.enabled))
        .bind(&config_json)
        .bind(task.trigger.kind_str())
        .bind(&trigger_json)
        .bind(task.trigger.event_type().map(|e| e.as_str()))
        .bind(&options_json)
        .bind(&handlers_json)
        .bind(Utc::now().to_rfc3339())
        .bind(task.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::TaskNotFound(task.id));
        }
        Ok(())
    }

    async fn delete_task(&self, id: Uuid) -> DomainResult<()> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DomainError::TaskNotFound(id));
        }
        Ok(())
    }

    async fn load_tasks(&self, filter: TaskFilter) -> DomainResult<Vec<Task>> {
        let mut builder: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new("SELECT * FROM tasks WHERE 1=1");
        if let Some(enabled) = filter.enabled {
            builder.push(" AND enabled = ").push_bind(i64::from(enabled));
        }
        if let Some(kind) = filter.kind {
            builder.push(" AND task_type = ").push_bind(kind.as_str());
        }
        if let Some(trigger_type) = filter.trigger_type {
            builder.push(" AND trigger_type = ").push_bind(trigger_type);
        }
        if let Some(event) = filter.trigger_event {
            builder.push(" AND trigger_event = ").push_bind(event.as_str());
        }
        builder.push(" ORDER BY created_at");

        let rows: Vec<TaskRow> = builder.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn create_execution(&self, execution: &Execution) -> DomainResult<()> {
        let context_json = serde_json::to_string(&execution.trigger_context)?;
        let usage_json = execution
            .usage
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"INSERT INTO executions (id, task_id, trigger_type, trigger_context, status,
               output, thinking, error, exit_code, duration_ms, usage, cost_usd,
               created_at, started_at, completed_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(execution.id.to_string())
        .bind(execution.task_id.to_string())
        .bind(execution.trigger_type.as_str())
        .bind(&context_json)
        .bind(execution.status.as_str())
        .bind(&execution.output)
        .bind(&execution.thinking)
        .bind(&execution.error)
        .bind(execution.exit_code)
        .bind(execution.duration_ms)
        .bind(&usage_json)
        .bind(execution.usage.as_ref().and_then(|u| u.cost_usd))
        .bind(execution.created_at.to_rfc3339())
        .bind(execution.started_at.map(|t| t.to_rfc3339()))
        .bind(execution.completed_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_execution(&self, id: Uuid) -> DomainResult<Option<Execution>> {
        let row: Option<ExecutionRow> = sqlx::query_as("SELECT * FROM executions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn update_execution(&self, execution: &Execution) -> DomainResult<()> {
        let result = update_execution_query(execution)?
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DomainError::ExecutionNotFound(execution.id));
        }
        Ok(())
    }

    async fn load_executions(&self, filter: ExecutionFilter) -> DomainResult<Vec<Execution>> {
        let mut builder: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new("SELECT * FROM executions WHERE 1=1");
        if let Some(task_id) = filter.task_id {
            builder.push(" AND task_id = ").push_bind(task_id.to_string());
        }
        if let Some(status) = filter.status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(start) = filter.start_date {
            builder.push(" AND created_at >= ").push_bind(start.to_rfc3339());
        }
        if let Some(end) = filter.end_date {
            builder.push(" AND created_at <= ").push_bind(end.to_rfc3339());
        }
        builder.push(" ORDER BY created_at DESC");
        builder
            .push(" LIMIT ")
            .push_bind(i64::from(filter.limit.unwrap_or(100)));
        if let Some(offset) = filter.offset {
            builder.push(" OFFSET ").push_bind(i64::from(offset));
        }

        let rows: Vec<ExecutionRow> = builder.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn finalize_execution(&self, execution: &Execution) -> DomainResult<()> {
        let (run_bump, success_bump, failure_bump) = match execution.status {
            ExecutionStatus::Success => (1i64, 1i64, 0i64),
            ExecutionStatus::Failure | ExecutionStatus::Timeout => (1, 0, 1),
            ExecutionStatus::Cancelled => (1, 0, 0),
            _ => (0, 0, 0),
        };

        let mut tx = self.pool.begin().await?;
        let result = update_execution_query(execution)?.execute(&mut *tx).await?;
        if result.rows_affected() == 0 {
            return Err(DomainError::ExecutionNotFound(execution.id));
        }
        if run_bump > 0 {
            sqlx::query(
                r#"UPDATE tasks SET run_count = run_count + ?,
                   success_count = success_count + ?,
                   failure_count = failure_count + ?,
                   updated_at = ?
                   WHERE id = ?"#,
            )
            .bind(run_bump)
            .bind(success_bump)
            .bind(failure_bump)
            .bind(Utc::now().to_rfc3339())
            .bind(execution.task_id.to_string())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn append_execution_output(&self, id: Uuid, text: &str) -> DomainResult<()> {
        sqlx::query("UPDATE executions SET output = output || ? WHERE id = ?")
            .bind(text)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn append_execution_thinking(&self, id: Uuid, text: &str) -> DomainResult<()> {
        sqlx::query("UPDATE executions SET thinking = thinking || ? WHERE id = ?")
            .bind(text)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_execution_progress(&self, id: Uuid) -> DomainResult<Option<ExecutionProgress>> {
        let row: Option<(String, String, String)> =
            sqlx::query_as("SELECT output, thinking, status FROM executions WHERE id = ?")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        row.map(|(output, thinking, status)| {
            let status = ExecutionStatus::from_str(&status).ok_or_else(|| {
                DomainError::SerializationError(format!("unknown execution status '{status}'"))
            })?;
            Ok(ExecutionProgress {
                output,
                thinking,
                status,
            })
        })
        .transpose()
    }

    async fn get_task_stats(&self, task_id: Uuid) -> DomainResult<TaskStats> {
        let row: (i64, Option<i64>, Option<i64>, Option<f64>, Option<f64>) = sqlx::query_as(
            r#"SELECT COUNT(*),
               SUM(CASE WHEN status = 'success' THEN 1 ELSE 0 END),
               SUM(CASE WHEN status IN ('failure', 'timeout') THEN 1 ELSE 0 END),
               AVG(CAST(duration_ms AS REAL)),
               SUM(cost_usd)
               FROM executions
               WHERE task_id = ? AND status IN ('success', 'failure', 'timeout', 'cancelled')"#,
        )
        .bind(task_id.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(TaskStats {
            total_runs: row.0 as u64,
            successful_runs: row.1.unwrap_or(0) as u64,
            failed_runs: row.2.unwrap_or(0) as u64,
            average_duration_ms: row.3,
            total_cost_usd: row.4,
        })
    }

    async fn sweep_stale_executions(&self, note: &str) -> DomainResult<u64> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            r#"UPDATE executions SET
               status = 'failure',
               error = ?,
               completed_at = ?,
               duration_ms = CASE WHEN started_at IS NOT NULL
                   THEN CAST((julianday(?) - julianday(started_at)) * 86400000.0 AS INTEGER)
                   ELSE duration_ms END
               WHERE status IN ('pending', 'running')"#,
        )
        .bind(note)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn close(&self) -> DomainResult<()> {
        self.pool.close().await;
        Ok(())
    }
}

/// Shared UPDATE for `update_execution` and `finalize_execution`.
fn update_execution_query(
    execution: &Execution,
) -> DomainResult<sqlx::query::Query<'_, Sqlite, sqlx::sqlite::SqliteArguments<'_>>> {
    let context_json = serde_json::to_string(&execution.trigger_context)?;
    let usage_json = execution
        .usage
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    Ok(sqlx::query(
        r#"UPDATE executions SET trigger_context = ?, status = ?, output = ?, thinking = ?,
           error = ?, exit_code = ?, duration_ms = ?, usage = ?, cost_usd = ?,
           started_at = ?, completed_at = ?
           WHERE id = ?"#,
    )
    .bind(context_json)
    .bind(execution.status.as_str())
    .bind(execution.output.clone())
    .bind(execution.thinking.clone())
    .bind(execution.error.clone())
    .bind(execution.exit_code)
    .bind(execution.duration_ms)
    .bind(usage_json)
    .bind(execution.usage.as_ref().and_then(|u| u.cost_usd))
    .bind(execution.started_at.map(|t| t.to_rfc3339()))
    .bind(execution.completed_at.map(|t| t.to_rfc3339()))
    .bind(execution.id.to_string()))
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: String,
    name: String,
    #[allow(dead_code)]
    task_type: String,
    enabled: i64,
    config: String,
    #[allow(dead_code)]
    trigger_type: String,
    trigger_config: String,
    #[allow(dead_code)]
    trigger_event: Option<String>,
    options: String,
    handlers: String,
    run_count: i64,
    success_count: i64,
    failure_count: i64,
    created_at: String,
    updated_at: String,
}

impl TryFrom<TaskRow> for Task {
    type Error = DomainError;

    fn try_from(row: TaskRow) -> DomainResult<Task> {
        let config: TaskConfig = serde_json::from_str(&row.config)?;
        let trigger: Trigger = serde_json::from_str(&row.trigger_config)?;
        let options: TaskOptions = serde_json::from_str(&row.options)?;
        let handlers: Vec<Handler> = serde_json::from_str(&row.handlers)?;

        Ok(Task {
            id: parse_uuid(&row.id)?,
            name: row.name,
            enabled: row.enabled != 0,
            config,
            trigger,
            options,
            handlers,
            run_count: row.run_count as u64,
            success_count: row.success_count as u64,
            failure_count: row.failure_count as u64,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ExecutionRow {
    id: String,
    task_id: String,
    trigger_type: String,
    trigger_context: String,
    status: String,
    output: String,
    thinking: String,
    error: Option<String>,
    exit_code: Option<i32>,
    duration_ms: Option<i64>,
    usage: Option<String>,
    #[allow(dead_code)]
    cost_usd: Option<f64>,
    created_at: String,
    started_at: Option<String>,
    completed_at: Option<String>,
}

impl TryFrom<ExecutionRow> for Execution {
    type Error = DomainError;

    fn try_from(row: ExecutionRow) -> DomainResult<Execution> {
        let trigger_type = TriggerType::from_str(&row.trigger_type).ok_or_else(|| {
            DomainError::SerializationError(format!("unknown trigger type '{}'", row.trigger_type))
        })?;
        let status = ExecutionStatus::from_str(&row.status).ok_or_else(|| {
            DomainError::SerializationError(format!("unknown execution status '{}'", row.status))
        })?;
        let usage: Option<UsageInfo> = row
            .usage
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;

        Ok(Execution {
            id: parse_uuid(&row.id)?,
            task_id: parse_uuid(&row.task_id)?,
            trigger_type,
            trigger_context: serde_json::from_str(&row.trigger_context)?,
            status,
            output: row.output,
            thinking: row.thinking,
            error: row.error,
            exit_code: row.exit_code,
            duration_ms: row.duration_ms,
            usage,
            created_at: parse_timestamp(&row.created_at)?,
            started_at: row.started_at.as_deref().map(parse_timestamp_ref).transpose()?,
            completed_at: row
                .completed_at
                .as_deref()
                .map(parse_timestamp_ref)
                .transpose()?,
        })
    }
}

fn parse_uuid(s: &str) -> DomainResult<Uuid> {
    Uuid::parse_str(s)
        .map_err(|e| DomainError::SerializationError(format!("invalid uuid '{s}': {e}")))
}

fn parse_timestamp(s: &str) -> DomainResult<DateTime<Utc>> {
    parse_timestamp_ref(s)
}

fn parse_timestamp_ref(s: &str) -> DomainResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DomainError::SerializationError(format!("invalid timestamp '{s}': {e}")))
}
