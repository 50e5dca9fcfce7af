use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::types::{ScriptExecuteRequest, ScriptTask};

fn row_to_task(row: &rusqlite::Row) -> rusqlite::Result<ScriptTask> {
    Ok(ScriptTask {
        id: row.get(0)?,
        task_id: row.get::<_, i64>(1)? as u64,
        script_id: row.get(2)?,
        name: row.get(3)?,
        content: row.get(4)?,
        status: row.get(5)?,
        output: row.get(6)?,
        error_message: row.get(7)?,
        reported: row.get(8)?,
        created_at: row.get(9)?,
        executed_at: row.get(10)?,
    })
}

const TASK_COLUMNS: &str = "id, task_id, script_id, name, content, status, output, \
                            error_message, reported, created_at, executed_at";

/// Single-flight admission: the insert only happens while no other task is
/// pending or running. One SQL statement, so two concurrent requests cannot
/// both get in.
pub fn insert_task_if_idle(conn: &Connection, req: &ScriptExecuteRequest) -> Result<bool> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("System clock is before the unix epoch")?
        .as_secs() as i64;

    let rows = conn
        .execute(
            "INSERT INTO script_tasks (task_id, script_id, name, content, status, created_at)
             SELECT ?1, ?2, ?3, ?4, 'pending', ?5
             WHERE NOT EXISTS (
                 SELECT 1 FROM script_tasks WHERE status IN ('pending', 'running')
             )",
            rusqlite::params![req.task_id as i64, req.id, req.name, req.content, now],
        )
        .context("Failed to admit script task")?;

    Ok(rows > 0)
}

pub fn get_by_task_id(conn: &Connection, task_id: u64) -> Result<Option<ScriptTask>> {
    conn.query_row(
        &format!("SELECT {TASK_COLUMNS} FROM script_tasks WHERE task_id = ?1"),
        [task_id as i64],
        row_to_task,
    )
    .optional()
    .context("Failed to query script task")
}

pub fn mark_running(conn: &Connection, task_id: u64) -> Result<bool> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("System clock is before the unix epoch")?
        .as_secs() as i64;

    let rows = conn
        .execute(
            "UPDATE script_tasks SET status = 'running', executed_at = ?1 WHERE task_id = ?2",
            rusqlite::params![now, task_id as i64],
        )
        .context("Failed to mark script task running")?;

    Ok(rows > 0)
}

/// Terminal transition. The task becomes visible to the reporting loop.
pub fn finish_task(
    conn: &Connection,
    task_id: u64,
    status: &str,
    output: &str,
    error_message: &str,
) -> Result<bool> {
    let rows = conn
        .execute(
            "UPDATE script_tasks
             SET status = ?1, output = ?2, error_message = ?3, reported = 0
             WHERE task_id = ?4",
            rusqlite::params![status, output, error_message, task_id as i64],
        )
        .context("Failed to finish script task")?;

    Ok(rows > 0)
}

pub fn list_unreported(conn: &Connection) -> Result<Vec<ScriptTask>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM script_tasks
             WHERE reported = 0 AND status IN ('success', 'failed')
             ORDER BY created_at DESC, id DESC"
        ))
        .context("Failed to prepare unreported task query")?;

    let tasks = stmt
        .query_map([], row_to_task)
        .context("Failed to query unreported tasks")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("Failed to read unreported task rows")?;

    Ok(tasks)
}

pub fn mark_reported(conn: &Connection, task_id: u64) -> Result<bool> {
    let rows = conn
        .execute(
            "UPDATE script_tasks SET reported = 1 WHERE task_id = ?1",
            [task_id as i64],
        )
        .context("Failed to mark script task reported")?;

    Ok(rows > 0)
}
