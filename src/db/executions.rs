use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde_json::Value;
use sqlx::{Pool, Row, Sqlite, sqlite::SqliteRow};

use crate::models::*;

use super::row_helpers::{json_column, none_if_empty};

fn map_execution_row(row: &SqliteRow) -> Execution {
    let output: Option<String> = row.get("output");
    Execution {
        id: row.get("id"),
        execution_type: row.get("execution_type"),
        target_servers: json_column(row, "target_servers"),
        command_id: row.get("command_id"),
        playbook_id: row.get("playbook_id"),
        status: row.get("status"),
        output: output.and_then(|s| serde_json::from_str(&s).ok()),
        error_message: none_if_empty(row.get("error_message")),
        started_at: row.get("started_at"),
        completed_at: row.get("completed_at"),
        executed_by: row.get("executed_by"),
    }
}

const SELECT_EXECUTION: &str = r#"
    SELECT id, execution_type, target_servers, command_id, playbook_id, status,
           output, error_message, started_at, completed_at, executed_by
    FROM executions
"#;

/// Execution records are written twice: once `running`, once terminal.
pub struct ExecutionRepo;

impl ExecutionRepo {
    pub async fn create(pool: &Pool<Sqlite>, id: &str, req: &CreateExecutionRequest) -> Result<Execution> {
        let targets = serde_json::to_string(&req.target_servers)?;
        sqlx::query(
            r#"
            INSERT INTO executions (id, execution_type, target_servers, command_id, playbook_id,
                                    status, started_at, executed_by)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(&req.execution_type)
        .bind(&targets)
        .bind(req.command_id)
        .bind(req.playbook_id)
        .bind(execution_status::RUNNING)
        .bind(Utc::now())
        .bind(&req.executed_by)
        .execute(pool)
        .await?;

        Self::get(pool, id)
            .await?
            .context("Execution not found after creation")
    }

    pub async fn get(pool: &Pool<Sqlite>, id: &str) -> Result<Option<Execution>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_EXECUTION))
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(row.as_ref().map(map_execution_row))
    }

    /// Newest first; rowid breaks ties between records started in the same instant
    pub async fn list_recent(pool: &Pool<Sqlite>, limit: i32) -> Result<Vec<Execution>> {
        let rows = sqlx::query(&format!("{} ORDER BY started_at DESC, rowid DESC LIMIT ?", SELECT_EXECUTION))
            .bind(limit)
            .fetch_all(pool)
            .await?;
        Ok(rows.iter().map(map_execution_row).collect())
    }

    /// Executions still marked running, oldest first
    pub async fn list_running(pool: &Pool<Sqlite>) -> Result<Vec<Execution>> {
        let rows = sqlx::query(&format!("{} WHERE status = ? ORDER BY started_at", SELECT_EXECUTION))
            .bind(execution_status::RUNNING)
            .fetch_all(pool)
            .await?;
        Ok(rows.iter().map(map_execution_row).collect())
    }

    pub async fn complete(pool: &Pool<Sqlite>, id: &str, output: &Value) -> Result<Execution> {
        let output = serde_json::to_string(output)?;
        let result = sqlx::query(
            "UPDATE executions SET status = ?, output = ?, completed_at = ? WHERE id = ? AND status = ?",
        )
        .bind(execution_status::COMPLETED)
        .bind(&output)
        .bind(Utc::now())
        .bind(id)
        .bind(execution_status::RUNNING)
        .execute(pool)
        .await?;
        Self::finish(pool, id, result.rows_affected()).await
    }

    pub async fn fail(pool: &Pool<Sqlite>, id: &str, error: &str) -> Result<Execution> {
        let result = sqlx::query(
            "UPDATE executions SET status = ?, error_message = ?, completed_at = ? WHERE id = ? AND status = ?",
        )
        .bind(execution_status::FAILED)
        .bind(error)
        .bind(Utc::now())
        .bind(id)
        .bind(execution_status::RUNNING)
        .execute(pool)
        .await?;
        Self::finish(pool, id, result.rows_affected()).await
    }

    async fn finish(pool: &Pool<Sqlite>, id: &str, rows_affected: u64) -> Result<Execution> {
        let execution = Self::get(pool, id)
            .await?
            .ok_or_else(|| super::NotFoundError::new("Execution", id))?;
        if rows_affected == 0 {
            bail!("Execution {} is already {}", id, execution.status);
        }
        Ok(execution)
    }
}
