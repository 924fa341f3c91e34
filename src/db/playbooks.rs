use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Pool, Sqlite};

use crate::models::*;

use super::row_helpers::map_playbook_row;

const SELECT_PLAYBOOK: &str = r#"
    SELECT id, name, description, content, variables, version, created_by, created_at, updated_at
    FROM playbooks
"#;

pub struct PlaybookRepo;

impl PlaybookRepo {
    pub async fn list(pool: &Pool<Sqlite>) -> Result<Vec<Playbook>> {
        let rows = sqlx::query(&format!("{} ORDER BY name", SELECT_PLAYBOOK))
            .fetch_all(pool)
            .await?;
        Ok(rows.iter().map(map_playbook_row).collect())
    }

    pub async fn get(pool: &Pool<Sqlite>, id: i64) -> Result<Option<Playbook>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_PLAYBOOK))
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(row.as_ref().map(map_playbook_row))
    }

    pub async fn get_by_name(pool: &Pool<Sqlite>, name: &str) -> Result<Option<Playbook>> {
        let row = sqlx::query(&format!("{} WHERE name = ?", SELECT_PLAYBOOK))
            .bind(name)
            .fetch_optional(pool)
            .await?;
        Ok(row.as_ref().map(map_playbook_row))
    }

    pub async fn create(pool: &Pool<Sqlite>, req: &CreatePlaybookRequest) -> Result<Playbook> {
        let now = Utc::now();
        let variables = serde_json::to_string(&req.variables)?;
        let result = sqlx::query(
            r#"
            INSERT INTO playbooks (name, description, content, variables, version, created_by, created_at, updated_at)
            VALUES (?, ?, ?, ?, 1, ?, ?, ?)
            "#,
        )
        .bind(&req.name)
        .bind(req.description.clone().unwrap_or_default())
        .bind(&req.content)
        .bind(&variables)
        .bind(&req.created_by)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;

        Self::get(pool, result.last_insert_rowid())
            .await?
            .context("Playbook not found after creation")
    }

    /// Partial update. The version is bumped in the same statement whenever
    /// the content actually changes.
    pub async fn update(pool: &Pool<Sqlite>, id: i64, req: &UpdatePlaybookRequest) -> Result<Playbook> {
        let existing = Self::get(pool, id)
            .await?
            .ok_or_else(|| super::NotFoundError::new("Playbook", &id.to_string()))?;

        let description = match &req.description {
            Some(d) => d.clone(),
            None => existing.description.clone().unwrap_or_default(),
        };
        let content = req.content.as_ref().unwrap_or(&existing.content);
        let variables = serde_json::to_string(req.variables.as_ref().unwrap_or(&existing.variables))?;

        let result = sqlx::query(
            r#"
            UPDATE playbooks
            SET name = ?, description = ?, variables = ?,
                version = version + (CASE WHEN content <> ? THEN 1 ELSE 0 END),
                content = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(req.name.as_ref().unwrap_or(&existing.name))
        .bind(&description)
        .bind(&variables)
        .bind(content)
        .bind(content)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(super::NotFoundError::new("Playbook", &id.to_string()).into());
        }
        Self::get(pool, id).await?.context("Playbook not found after update")
    }

    pub async fn delete(pool: &Pool<Sqlite>, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM playbooks WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(super::NotFoundError::new("Playbook", &id.to_string()).into());
        }
        Ok(())
    }
}
