use anyhow::Result;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::control_client::ControlClient;
use crate::db::{execute_async, DbPool};
use crate::envelope::CODE_SUCCESS;
use crate::services::script_tasks;
use crate::types::ScriptResultReport;

const REPORT_INTERVAL: Duration = Duration::from_secs(5);

/// Result push loop - deliver finished script runs every 5s
pub async fn report_loop(db: DbPool, control: ControlClient) -> Result<()> {
    info!("Starting script result loop (every 5s)");

    loop {
        tokio::time::sleep(REPORT_INTERVAL).await;

        if let Err(e) = run_report_cycle(&db, &control).await {
            error!("Script result cycle failed: {:#}", e);
        }
    }
}

pub(crate) async fn run_report_cycle(db: &DbPool, control: &ControlClient) -> Result<()> {
    let tasks = execute_async(db, |conn| script_tasks::list_unreported(conn)).await?;

    for task in tasks {
        let report = ScriptResultReport {
            task_id: task.task_id,
            script_id: task.script_id,
            status: task.status.clone(),
            output: task.output.clone(),
            error_message: task.error_message.clone(),
        };

        match control.push_script_result(&report).await {
            Ok(code) => {
                // Only an acknowledged success is retired. Failed results are
                // re-sent every cycle so the control plane keeps seeing them.
                if task.status == "success" && code == CODE_SUCCESS {
                    let task_id = task.task_id;
                    let marked = execute_async(db, move |conn| {
                        script_tasks::mark_reported(conn, task_id)
                    })
                    .await;
                    if let Err(e) = marked {
                        error!("Cannot mark task {} reported: {:#}", task_id, e);
                    }
                }
            }
            Err(e) => {
                warn!("Cannot push result of task {}: {:#}", task.task_id, e);
            }
        }
    }

    Ok(())
}
