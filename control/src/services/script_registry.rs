use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::types::{CreateScriptRequest, Script, ScriptResult};

fn row_to_script(row: &rusqlite::Row) -> rusqlite::Result<Script> {
    Ok(Script {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        content: row.get(3)?,
        script_type: row.get(4)?,
        created_at: row.get(5)?,
    })
}

const SCRIPT_COLUMNS: &str = "id, name, description, content, script_type, created_at";

pub fn create_script(conn: &Connection, req: &CreateScriptRequest) -> Result<i64> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("System clock is before the unix epoch")?
        .as_secs() as i64;

    conn.execute(
        "INSERT INTO scripts (name, description, content, script_type, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            req.name,
            req.description.as_deref().unwrap_or(""),
            req.content,
            req.script_type.as_deref().unwrap_or("shell"),
            now,
        ],
    )
    .context("Failed to insert script")?;

    Ok(conn.last_insert_rowid())
}

pub fn get_script(conn: &Connection, id: i64) -> Result<Option<Script>> {
    conn.query_row(
        &format!("SELECT {SCRIPT_COLUMNS} FROM scripts WHERE id = ?1"),
        [id],
        row_to_script,
    )
    .optional()
    .context("Failed to query script")
}

pub fn list_scripts(conn: &Connection) -> Result<Vec<Script>> {
    let mut stmt = conn
        .prepare(&format!("SELECT {SCRIPT_COLUMNS} FROM scripts ORDER BY id"))
        .context("Failed to prepare script query")?;

    let scripts = stmt
        .query_map([], row_to_script)
        .context("Failed to query scripts")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("Failed to read script rows")?;

    Ok(scripts)
}

pub fn update_script(conn: &Connection, script: &Script) -> Result<bool> {
    let rows = conn
        .execute(
            "UPDATE scripts SET name = ?1, description = ?2, content = ?3, script_type = ?4
             WHERE id = ?5",
            rusqlite::params![
                script.name,
                script.description,
                script.content,
                script.script_type,
                script.id,
            ],
        )
        .context("Failed to update script")?;

    Ok(rows > 0)
}

pub fn delete_script(conn: &Connection, id: i64) -> Result<bool> {
    let rows = conn
        .execute("DELETE FROM scripts WHERE id = ?1", [id])
        .context("Failed to delete script")?;

    Ok(rows > 0)
}

// ============================================================================
// Script Results
// ============================================================================

fn row_to_result(row: &rusqlite::Row) -> rusqlite::Result<ScriptResult> {
    Ok(ScriptResult {
        id: row.get(0)?,
        task_id: row.get::<_, i64>(1)? as u64,
        script_id: row.get(2)?,
        server_id: row.get(3)?,
        server_address: row.get(4)?,
        agent_port: row.get(5)?,
        status: row.get(6)?,
        output: row.get(7)?,
        error_message: row.get(8)?,
        created_at: row.get(9)?,
    })
}

const RESULT_COLUMNS: &str = "id, task_id, script_id, server_id, server_address, agent_port, \
                              status, output, error_message, created_at";

/// Writes the pending row before the execution request goes out, so a
/// dispatch failure always has a row to record itself on.
pub fn insert_script_result(
    conn: &Connection,
    task_id: u64,
    script_id: i64,
    server_id: i64,
    server_address: &str,
    agent_port: u16,
) -> Result<i64> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("System clock is before the unix epoch")?
        .as_secs() as i64;

    conn.execute(
        "INSERT INTO script_results
             (task_id, script_id, server_id, server_address, agent_port, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 'running', ?6)",
        rusqlite::params![task_id as i64, script_id, server_id, server_address, agent_port, now],
    )
    .context("Failed to insert script result")?;

    Ok(conn.last_insert_rowid())
}

pub fn get_result_by_task_id(conn: &Connection, task_id: u64) -> Result<Option<ScriptResult>> {
    conn.query_row(
        &format!("SELECT {RESULT_COLUMNS} FROM script_results WHERE task_id = ?1"),
        [task_id as i64],
        row_to_result,
    )
    .optional()
    .context("Failed to query script result")
}

pub fn update_result_by_task_id(
    conn: &Connection,
    task_id: u64,
    status: &str,
    output: &str,
    error_message: &str,
) -> Result<bool> {
    let rows = conn
        .execute(
            "UPDATE script_results SET status = ?1, output = ?2, error_message = ?3
             WHERE task_id = ?4",
            rusqlite::params![status, output, error_message, task_id as i64],
        )
        .context("Failed to update script result")?;

    Ok(rows > 0)
}

pub fn list_results_by_script(conn: &Connection, script_id: i64) -> Result<Vec<ScriptResult>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {RESULT_COLUMNS} FROM script_results
             WHERE script_id = ?1 ORDER BY created_at DESC, id DESC"
        ))
        .context("Failed to prepare script result query")?;

    let results = stmt
        .query_map([script_id], row_to_result)
        .context("Failed to query script results")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("Failed to read script result rows")?;

    Ok(results)
}
