use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::types::{Deployment, DeploymentJoinRow};

fn row_to_deployment(row: &rusqlite::Row) -> rusqlite::Result<Deployment> {
    Ok(Deployment {
        id: row.get(0)?,
        deploy_id: row.get::<_, i64>(1)? as u64,
        server_id: row.get(2)?,
        application_id: row.get(3)?,
        content: row.get(4)?,
        status: row.get(5)?,
        created_at: row.get(6)?,
    })
}

const DEPLOYMENT_COLUMNS: &str =
    "id, deploy_id, server_id, application_id, content, status, created_at";

/// Records a deployment handed to an agent. The agent has already accepted
/// the workload by the time this row is written.
pub fn insert_deployment(
    conn: &Connection,
    deploy_id: u64,
    server_id: i64,
    application_id: i64,
    content: &str,
) -> Result<i64> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("System clock is before the unix epoch")?
        .as_secs() as i64;

    conn.execute(
        "INSERT INTO deployments (deploy_id, server_id, application_id, content, status, created_at)
         VALUES (?1, ?2, ?3, ?4, 'starting', ?5)",
        rusqlite::params![deploy_id as i64, server_id, application_id, content, now],
    )
    .context("Failed to insert deployment")?;

    Ok(conn.last_insert_rowid())
}

pub fn get_deployment(conn: &Connection, id: i64) -> Result<Option<Deployment>> {
    conn.query_row(
        &format!("SELECT {DEPLOYMENT_COLUMNS} FROM deployments WHERE id = ?1"),
        [id],
        row_to_deployment,
    )
    .optional()
    .context("Failed to query deployment")
}

pub fn get_by_deploy_id(conn: &Connection, deploy_id: u64) -> Result<Option<Deployment>> {
    conn.query_row(
        &format!("SELECT {DEPLOYMENT_COLUMNS} FROM deployments WHERE deploy_id = ?1"),
        [deploy_id as i64],
        row_to_deployment,
    )
    .optional()
    .context("Failed to query deployment by deploy id")
}

pub fn get_by_server_and_app(
    conn: &Connection,
    server_id: i64,
    application_id: i64,
) -> Result<Option<Deployment>> {
    conn.query_row(
        &format!(
            "SELECT {DEPLOYMENT_COLUMNS} FROM deployments
             WHERE server_id = ?1 AND application_id = ?2"
        ),
        [server_id, application_id],
        row_to_deployment,
    )
    .optional()
    .context("Failed to query deployment by server and application")
}

/// Last-write-wins status update keyed by the cluster-wide deploy id.
pub fn update_status_by_deploy_id(conn: &Connection, deploy_id: u64, status: &str) -> Result<bool> {
    let rows = conn
        .execute(
            "UPDATE deployments SET status = ?1 WHERE deploy_id = ?2",
            rusqlite::params![status, deploy_id as i64],
        )
        .context("Failed to update deployment status")?;

    Ok(rows > 0)
}

pub fn delete_deployment(conn: &Connection, id: i64) -> Result<bool> {
    let rows = conn
        .execute("DELETE FROM deployments WHERE id = ?1", [id])
        .context("Failed to delete deployment")?;

    Ok(rows > 0)
}

/// Lists deployments with application and server columns joined in.
/// Rows whose application or server has since been deleted come back with
/// None in those columns; the caller decides what to do with them.
pub fn list_joined(
    conn: &Connection,
    server_id: Option<i64>,
    application_id: Option<i64>,
) -> Result<Vec<DeploymentJoinRow>> {
    let mut sql = String::from(
        "SELECT d.id, d.deploy_id, d.server_id, d.application_id, d.content, d.status, d.created_at,
                a.name, a.version, s.name, s.address
         FROM deployments d
         LEFT JOIN applications a ON a.id = d.application_id
         LEFT JOIN servers s ON s.id = d.server_id",
    );

    let mut filter: Vec<i64> = Vec::new();
    if let Some(id) = server_id {
        sql.push_str(" WHERE d.server_id = ?1");
        filter.push(id);
    } else if let Some(id) = application_id {
        sql.push_str(" WHERE d.application_id = ?1");
        filter.push(id);
    }
    sql.push_str(" ORDER BY d.id");

    let mut stmt = conn
        .prepare(&sql)
        .context("Failed to prepare deployment list query")?;

    let rows = stmt
        .query_map(rusqlite::params_from_iter(filter), |row| {
            Ok(DeploymentJoinRow {
                deployment: row_to_deployment(row)?,
                application_name: row.get(7)?,
                application_version: row.get(8)?,
                server_name: row.get(9)?,
                server_address: row.get(10)?,
            })
        })
        .context("Failed to query deployments")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("Failed to read deployment rows")?;

    Ok(rows)
}
