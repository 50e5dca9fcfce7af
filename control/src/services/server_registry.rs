use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::types::{RegisterServerRequest, Server};

fn row_to_server(row: &rusqlite::Row) -> rusqlite::Result<Server> {
    Ok(Server {
        id: row.get(0)?,
        name: row.get(1)?,
        address: row.get(2)?,
        agent_port: row.get(3)?,
        ssh_user: row.get(4)?,
        ssh_port: row.get(5)?,
        ssh_key: row.get(6)?,
        status: row.get(7)?,
        created_at: row.get(8)?,
    })
}

const SERVER_COLUMNS: &str =
    "id, name, address, agent_port, ssh_user, ssh_port, ssh_key, status, created_at";

pub fn register_server(conn: &Connection, req: &RegisterServerRequest) -> Result<i64> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("System clock is before the unix epoch")?
        .as_secs() as i64;

    conn.execute(
        "INSERT INTO servers (name, address, agent_port, ssh_user, ssh_port, ssh_key, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'unknown', ?7)",
        rusqlite::params![
            req.name,
            req.address,
            req.agent_port.unwrap_or(10750),
            req.ssh_user.as_deref().unwrap_or(""),
            req.ssh_port.unwrap_or(22),
            req.ssh_key.as_deref().unwrap_or(""),
            now,
        ],
    )
    .context("Failed to insert server")?;

    Ok(conn.last_insert_rowid())
}

pub fn get_server(conn: &Connection, id: i64) -> Result<Option<Server>> {
    conn.query_row(
        &format!("SELECT {SERVER_COLUMNS} FROM servers WHERE id = ?1"),
        [id],
        row_to_server,
    )
    .optional()
    .context("Failed to query server")
}

pub fn list_servers(conn: &Connection) -> Result<Vec<Server>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {SERVER_COLUMNS} FROM servers ORDER BY id"
        ))
        .context("Failed to prepare server query")?;

    let servers = stmt
        .query_map([], row_to_server)
        .context("Failed to query servers")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("Failed to read server rows")?;

    Ok(servers)
}

pub fn update_server(conn: &Connection, server: &Server) -> Result<bool> {
    let rows = conn
        .execute(
            "UPDATE servers
             SET name = ?1, address = ?2, agent_port = ?3, ssh_user = ?4, ssh_port = ?5, ssh_key = ?6
             WHERE id = ?7",
            rusqlite::params![
                server.name,
                server.address,
                server.agent_port,
                server.ssh_user,
                server.ssh_port,
                server.ssh_key,
                server.id,
            ],
        )
        .context("Failed to update server")?;

    Ok(rows > 0)
}

pub fn update_server_status(conn: &Connection, id: i64, status: &str) -> Result<bool> {
    let rows = conn
        .execute(
            "UPDATE servers SET status = ?1 WHERE id = ?2",
            rusqlite::params![status, id],
        )
        .context("Failed to update server status")?;

    Ok(rows > 0)
}

pub fn delete_server(conn: &Connection, id: i64) -> Result<bool> {
    let rows = conn
        .execute("DELETE FROM servers WHERE id = ?1", [id])
        .context("Failed to delete server")?;

    Ok(rows > 0)
}
