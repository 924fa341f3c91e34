use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Pool, Sqlite};

use crate::models::*;

use super::row_helpers::map_server_row;

const SELECT_SERVER: &str = r#"
    SELECT id, name, hostname, ip_address, port, username, ssh_key_path,
           description, tags, status, last_ping, created_at, updated_at
    FROM servers
"#;

/// Server registry operations. Probe results only ever touch
/// status/last_ping; edits never touch them.
pub struct ServerRepo;

impl ServerRepo {
    pub async fn list(pool: &Pool<Sqlite>) -> Result<Vec<Server>> {
        let rows = sqlx::query(&format!("{} ORDER BY name", SELECT_SERVER))
            .fetch_all(pool)
            .await?;

        Ok(rows.iter().map(map_server_row).collect())
    }

    pub async fn get(pool: &Pool<Sqlite>, id: i64) -> Result<Option<Server>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_SERVER))
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(row.as_ref().map(map_server_row))
    }

    pub async fn get_by_name(pool: &Pool<Sqlite>, name: &str) -> Result<Option<Server>> {
        let row = sqlx::query(&format!("{} WHERE name = ?", SELECT_SERVER))
            .bind(name)
            .fetch_optional(pool)
            .await?;

        Ok(row.as_ref().map(map_server_row))
    }

    pub async fn create(pool: &Pool<Sqlite>, req: &CreateServerRequest) -> Result<Server> {
        let now = Utc::now();
        let tags = serde_json::to_string(&req.tags)?;
        let result = sqlx::query(
            r#"
            INSERT INTO servers (name, hostname, ip_address, port, username, ssh_key_path,
                                 description, tags, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&req.name)
        .bind(&req.hostname)
        .bind(&req.ip_address)
        .bind(req.port)
        .bind(&req.username)
        .bind(req.ssh_key_path.clone().unwrap_or_default())
        .bind(req.description.clone().unwrap_or_default())
        .bind(&tags)
        .bind(server_status::UNKNOWN)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;

        Self::get(pool, result.last_insert_rowid())
            .await?
            .context("Server not found after creation")
    }

    /// Partial update; absent fields keep their stored value
    pub async fn update(pool: &Pool<Sqlite>, id: i64, req: &UpdateServerRequest) -> Result<Server> {
        let existing = Self::get(pool, id)
            .await?
            .ok_or_else(|| super::NotFoundError::new("Server", &id.to_string()))?;

        let tags = serde_json::to_string(req.tags.as_ref().unwrap_or(&existing.tags))?;
        let ssh_key_path = match &req.ssh_key_path {
            Some(path) => path.clone(),
            None => existing.ssh_key_path.clone().unwrap_or_default(),
        };
        let description = match &req.description {
            Some(d) => d.clone(),
            None => existing.description.clone().unwrap_or_default(),
        };

        let result = sqlx::query(
            r#"
            UPDATE servers SET name = ?, hostname = ?, ip_address = ?, port = ?, username = ?,
                               ssh_key_path = ?, description = ?, tags = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(req.name.as_ref().unwrap_or(&existing.name))
        .bind(req.hostname.as_ref().unwrap_or(&existing.hostname))
        .bind(req.ip_address.as_ref().unwrap_or(&existing.ip_address))
        .bind(req.port.unwrap_or(existing.port))
        .bind(req.username.as_ref().unwrap_or(&existing.username))
        .bind(&ssh_key_path)
        .bind(&description)
        .bind(&tags)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(super::NotFoundError::new("Server", &id.to_string()).into());
        }
        Self::get(pool, id).await?.context("Server not found after update")
    }

    pub async fn delete(pool: &Pool<Sqlite>, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM servers WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(super::NotFoundError::new("Server", &id.to_string()).into());
        }
        Ok(())
    }

    pub async fn set_key_path(pool: &Pool<Sqlite>, id: i64, path: &str) -> Result<()> {
        let result = sqlx::query("UPDATE servers SET ssh_key_path = ?, updated_at = ? WHERE id = ?")
            .bind(path)
            .bind(Utc::now())
            .bind(id)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(super::NotFoundError::new("Server", &id.to_string()).into());
        }
        Ok(())
    }

    /// Record a liveness probe outcome in one statement
    pub async fn record_probe(pool: &Pool<Sqlite>, id: i64, status: &str) -> Result<()> {
        let now = Utc::now();
        let result = sqlx::query("UPDATE servers SET status = ?, last_ping = ?, updated_at = ? WHERE id = ?")
            .bind(status)
            .bind(now)
            .bind(now)
            .bind(id)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(super::NotFoundError::new("Server", &id.to_string()).into());
        }
        Ok(())
    }
}
