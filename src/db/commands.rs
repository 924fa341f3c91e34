use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Pool, Sqlite};

use crate::models::*;

use super::row_helpers::map_command_row;

const SELECT_COMMAND: &str = r#"
    SELECT id, name, description, command, timeout, created_by, created_at, updated_at
    FROM commands
"#;

pub struct CommandRepo;

impl CommandRepo {
    pub async fn list(pool: &Pool<Sqlite>) -> Result<Vec<ShellCommand>> {
        let rows = sqlx::query(&format!("{} ORDER BY name", SELECT_COMMAND))
            .fetch_all(pool)
            .await?;
        Ok(rows.iter().map(map_command_row).collect())
    }

    pub async fn get(pool: &Pool<Sqlite>, id: i64) -> Result<Option<ShellCommand>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_COMMAND))
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(row.as_ref().map(map_command_row))
    }

    pub async fn get_by_name(pool: &Pool<Sqlite>, name: &str) -> Result<Option<ShellCommand>> {
        let row = sqlx::query(&format!("{} WHERE name = ?", SELECT_COMMAND))
            .bind(name)
            .fetch_optional(pool)
            .await?;
        Ok(row.as_ref().map(map_command_row))
    }

    pub async fn create(pool: &Pool<Sqlite>, req: &CreateCommandRequest) -> Result<ShellCommand> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO commands (name, description, command, timeout, created_by, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&req.name)
        .bind(req.description.clone().unwrap_or_default())
        .bind(&req.command)
        .bind(req.timeout)
        .bind(&req.created_by)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;

        Self::get(pool, result.last_insert_rowid())
            .await?
            .context("Command not found after creation")
    }

    pub async fn update(pool: &Pool<Sqlite>, id: i64, req: &UpdateCommandRequest) -> Result<ShellCommand> {
        let existing = Self::get(pool, id)
            .await?
            .ok_or_else(|| super::NotFoundError::new("Command", &id.to_string()))?;

        let description = match &req.description {
            Some(d) => d.clone(),
            None => existing.description.clone().unwrap_or_default(),
        };
        let result = sqlx::query(
            "UPDATE commands SET name = ?, description = ?, command = ?, timeout = ?, updated_at = ? WHERE id = ?",
        )
        .bind(req.name.as_ref().unwrap_or(&existing.name))
        .bind(&description)
        .bind(req.command.as_ref().unwrap_or(&existing.command))
        .bind(req.timeout.unwrap_or(existing.timeout))
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(super::NotFoundError::new("Command", &id.to_string()).into());
        }
        Self::get(pool, id).await?.context("Command not found after update")
    }

    pub async fn delete(pool: &Pool<Sqlite>, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM commands WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(super::NotFoundError::new("Command", &id.to_string()).into());
        }
        Ok(())
    }
}
