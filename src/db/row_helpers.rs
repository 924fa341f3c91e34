use serde::de::DeserializeOwned;
use sqlx::{Row, sqlite::SqliteRow};

use crate::models::*;

/// Filter empty strings to None: used when DB stores '' instead of NULL
pub fn none_if_empty(opt: Option<String>) -> Option<String> {
    opt.filter(|s| !s.is_empty())
}

/// Decode a JSON text column, falling back to the type's default on bad data
pub fn json_column<T: DeserializeOwned + Default>(row: &SqliteRow, column: &str) -> T {
    let raw: Option<String> = row.get(column);
    raw.and_then(|s| serde_json::from_str(&s).ok()).unwrap_or_default()
}

/// Map a SQLite row to a Server struct
pub fn map_server_row(row: &SqliteRow) -> Server {
    Server {
        id: row.get("id"),
        name: row.get("name"),
        hostname: row.get("hostname"),
        ip_address: row.get("ip_address"),
        port: row.get("port"),
        username: row.get("username"),
        ssh_key_path: none_if_empty(row.get("ssh_key_path")),
        description: none_if_empty(row.get("description")),
        tags: json_column(row, "tags"),
        status: row.get("status"),
        last_ping: row.get("last_ping"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Map a SQLite row to a ShellCommand struct
pub fn map_command_row(row: &SqliteRow) -> ShellCommand {
    ShellCommand {
        id: row.get("id"),
        name: row.get("name"),
        description: none_if_empty(row.get("description")),
        command: row.get("command"),
        timeout: row.get("timeout"),
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Map a SQLite row to a Playbook struct
pub fn map_playbook_row(row: &SqliteRow) -> Playbook {
    Playbook {
        id: row.get("id"),
        name: row.get("name"),
        description: none_if_empty(row.get("description")),
        content: row.get("content"),
        variables: json_column(row, "variables"),
        version: row.get("version"),
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
