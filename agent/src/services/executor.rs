use anyhow::{Context, Result};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{error, info, warn};

use crate::db::{execute_async, DbPool};
use crate::services::script_tasks;

/// Runs one admitted script task to its terminal state: materialize the
/// content, run it through `sh`, capture combined output, clean up the file
/// whatever happened.
pub async fn execute_task(db: DbPool, task_id: u64, content: String, work_dir: PathBuf) {
    if let Err(e) = execute_async(&db, move |conn| script_tasks::mark_running(conn, task_id)).await
    {
        error!("Failed to mark task {} running: {:#}", task_id, e);
    }

    let script_path = work_dir.join(format!("script_{task_id}.sh"));
    let outcome = match write_script(&script_path, &content) {
        Ok(()) => {
            let result = run_script(&script_path).await;
            if let Err(e) = std::fs::remove_file(&script_path) {
                warn!("Failed to remove {}: {}", script_path.display(), e);
            }
            result
        }
        Err(e) => Err(e),
    };

    let (status, output, error_message) = match outcome {
        Ok((exit, combined)) if exit.success() => ("success", combined, String::new()),
        Ok((exit, combined)) => ("failed", combined, exit.to_string()),
        Err(e) => ("failed", String::new(), format!("{e:#}")),
    };

    info!("Script task {} finished: {}", task_id, status);
    if let Err(e) = execute_async(&db, move |conn| {
        script_tasks::finish_task(conn, task_id, status, &output, &error_message)
    })
    .await
    {
        error!("Failed to record result for task {}: {:#}", task_id, e);
    }
}

fn write_script(path: &Path, content: &str) -> Result<()> {
    std::fs::write(path, content)
        .with_context(|| format!("Cannot write script file {:?}", path))?;
    let mut perms = std::fs::metadata(path)
        .context("Cannot stat script file")?
        .permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms).context("Cannot set script permissions")?;
    Ok(())
}

async fn run_script(path: &Path) -> Result<(std::process::ExitStatus, String)> {
    let output = Command::new("sh")
        .arg(path)
        .output()
        .await
        .context("Failed to spawn shell")?;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    Ok((output.status, combined))
}
