use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::types::{DeployRequest, Workload};

fn row_to_workload(row: &rusqlite::Row) -> rusqlite::Result<Workload> {
    Ok(Workload {
        id: row.get(0)?,
        deploy_id: row.get::<_, i64>(1)? as u64,
        application_id: row.get(2)?,
        name: row.get(3)?,
        content: row.get(4)?,
        status: row.get(5)?,
        created_at: row.get(6)?,
    })
}

const WORKLOAD_COLUMNS: &str =
    "id, deploy_id, application_id, name, content, status, created_at";

pub fn insert_workload(conn: &Connection, req: &DeployRequest) -> Result<i64> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("System clock is before the unix epoch")?
        .as_secs() as i64;

    conn.execute(
        "INSERT INTO workloads (deploy_id, application_id, name, content, status, created_at)
         VALUES (?1, ?2, ?3, ?4, 'starting', ?5)",
        rusqlite::params![req.deploy_id as i64, req.id, req.name, req.content, now],
    )
    .context("Failed to insert workload")?;

    Ok(conn.last_insert_rowid())
}

pub fn get_by_deploy_id(conn: &Connection, deploy_id: u64) -> Result<Option<Workload>> {
    conn.query_row(
        &format!("SELECT {WORKLOAD_COLUMNS} FROM workloads WHERE deploy_id = ?1"),
        [deploy_id as i64],
        row_to_workload,
    )
    .optional()
    .context("Failed to query workload")
}

pub fn list_workloads(conn: &Connection) -> Result<Vec<Workload>> {
    let mut stmt = conn
        .prepare(&format!("SELECT {WORKLOAD_COLUMNS} FROM workloads ORDER BY id"))
        .context("Failed to prepare workload query")?;

    let workloads = stmt
        .query_map([], row_to_workload)
        .context("Failed to query workloads")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("Failed to read workload rows")?;

    Ok(workloads)
}

pub fn update_status_by_deploy_id(conn: &Connection, deploy_id: u64, status: &str) -> Result<bool> {
    let rows = conn
        .execute(
            "UPDATE workloads SET status = ?1 WHERE deploy_id = ?2",
            rusqlite::params![status, deploy_id as i64],
        )
        .context("Failed to update workload status")?;

    Ok(rows > 0)
}

/// Atomic `stopped` -> `starting` transition. Of two concurrent starts only
/// one sees a row to update; the other gets false.
pub fn try_mark_starting(conn: &Connection, deploy_id: u64) -> Result<bool> {
    let rows = conn
        .execute(
            "UPDATE workloads SET status = 'starting'
             WHERE deploy_id = ?1 AND status = 'stopped'",
            [deploy_id as i64],
        )
        .context("Failed to claim workload for start")?;

    Ok(rows > 0)
}

pub fn delete_by_deploy_id(conn: &Connection, deploy_id: u64) -> Result<bool> {
    let rows = conn
        .execute(
            "DELETE FROM workloads WHERE deploy_id = ?1",
            [deploy_id as i64],
        )
        .context("Failed to delete workload")?;

    Ok(rows > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_test_db;

    fn sample_request(deploy_id: u64, name: &str) -> DeployRequest {
        DeployRequest {
            id: 1,
            name: name.to_string(),
            description: String::new(),
            app_type: "compose".to_string(),
            content: "services: {}".to_string(),
            version: String::new(),
            server_id: 1,
            deploy_id,
        }
    }

    #[test]
    fn insert_records_starting_workload() {
        let pool = init_test_db().unwrap();
        let conn = pool.get().unwrap();

        insert_workload(&conn, &sample_request(42, "redis")).unwrap();

        let w = get_by_deploy_id(&conn, 42).unwrap().unwrap();
        assert_eq!(w.status, "starting");
        assert_eq!(w.name, "redis");
        assert_eq!(w.deploy_id, 42);
    }

    #[test]
    fn start_claim_requires_stopped_status() {
        let pool = init_test_db().unwrap();
        let conn = pool.get().unwrap();

        insert_workload(&conn, &sample_request(7, "redis")).unwrap();

        // Fresh workload is 'starting', not claimable.
        assert!(!try_mark_starting(&conn, 7).unwrap());

        update_status_by_deploy_id(&conn, 7, "stopped").unwrap();
        assert!(try_mark_starting(&conn, 7).unwrap());

        // Now 'starting' again; the second claim loses.
        assert!(!try_mark_starting(&conn, 7).unwrap());
    }

    #[test]
    fn delete_is_keyed_by_deploy_id() {
        let pool = init_test_db().unwrap();
        let conn = pool.get().unwrap();

        insert_workload(&conn, &sample_request(7, "redis")).unwrap();
        assert!(delete_by_deploy_id(&conn, 7).unwrap());
        assert!(!delete_by_deploy_id(&conn, 7).unwrap());
        assert!(get_by_deploy_id(&conn, 7).unwrap().is_none());
    }
}
