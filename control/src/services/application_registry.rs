use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::types::{Application, CreateApplicationRequest};

fn row_to_application(row: &rusqlite::Row) -> rusqlite::Result<Application> {
    Ok(Application {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        app_type: row.get(3)?,
        content: row.get(4)?,
        version: row.get(5)?,
        created_at: row.get(6)?,
    })
}

const APPLICATION_COLUMNS: &str =
    "id, name, description, app_type, content, version, created_at";

pub fn create_application(conn: &Connection, req: &CreateApplicationRequest) -> Result<i64> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("System clock is before the unix epoch")?
        .as_secs() as i64;

    conn.execute(
        "INSERT INTO applications (name, description, app_type, content, version, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            req.name,
            req.description.as_deref().unwrap_or(""),
            req.app_type.as_deref().unwrap_or("compose"),
            req.content,
            req.version.as_deref().unwrap_or(""),
            now,
        ],
    )
    .context("Failed to insert application")?;

    Ok(conn.last_insert_rowid())
}

pub fn get_application(conn: &Connection, id: i64) -> Result<Option<Application>> {
    conn.query_row(
        &format!("SELECT {APPLICATION_COLUMNS} FROM applications WHERE id = ?1"),
        [id],
        row_to_application,
    )
    .optional()
    .context("Failed to query application")
}

pub fn list_applications(conn: &Connection) -> Result<Vec<Application>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {APPLICATION_COLUMNS} FROM applications ORDER BY id"
        ))
        .context("Failed to prepare application query")?;

    let apps = stmt
        .query_map([], row_to_application)
        .context("Failed to query applications")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("Failed to read application rows")?;

    Ok(apps)
}

pub fn update_application(conn: &Connection, app: &Application) -> Result<bool> {
    let rows = conn
        .execute(
            "UPDATE applications
             SET name = ?1, description = ?2, app_type = ?3, content = ?4, version = ?5
             WHERE id = ?6",
            rusqlite::params![
                app.name,
                app.description,
                app.app_type,
                app.content,
                app.version,
                app.id,
            ],
        )
        .context("Failed to update application")?;

    Ok(rows > 0)
}

pub fn delete_application(conn: &Connection, id: i64) -> Result<bool> {
    let rows = conn
        .execute("DELETE FROM applications WHERE id = ?1", [id])
        .context("Failed to delete application")?;

    Ok(rows > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_test_db;

    #[test]
    fn create_applies_defaults() {
        let pool = init_test_db().unwrap();
        let conn = pool.get().unwrap();

        let id = create_application(
            &conn,
            &CreateApplicationRequest {
                name: "redis".to_string(),
                description: None,
                app_type: None,
                content: "services:\n  redis:\n    image: redis:7".to_string(),
                version: None,
            },
        )
        .unwrap();

        let app = get_application(&conn, id).unwrap().unwrap();
        assert_eq!(app.app_type, "compose");
        assert_eq!(app.description, "");
        assert_eq!(app.version, "");
    }

    #[test]
    fn update_rewrites_full_row() {
        let pool = init_test_db().unwrap();
        let conn = pool.get().unwrap();

        let id = create_application(
            &conn,
            &CreateApplicationRequest {
                name: "redis".to_string(),
                description: None,
                app_type: None,
                content: "v1".to_string(),
                version: Some("1".to_string()),
            },
        )
        .unwrap();

        let mut app = get_application(&conn, id).unwrap().unwrap();
        app.content = "v2".to_string();
        app.version = "2".to_string();
        assert!(update_application(&conn, &app).unwrap());

        let app = get_application(&conn, id).unwrap().unwrap();
        assert_eq!(app.content, "v2");
        assert_eq!(app.version, "2");
    }
}
