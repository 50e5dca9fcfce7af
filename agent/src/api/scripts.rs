use axum::extract::{Json, State};
use std::sync::Arc;
use tracing::{info, warn};

use crate::api::{db_error, ApiResult, AppState};
use crate::db::execute_async;
use crate::envelope::{Envelope, ERR_SCRIPT_ALREADY_RUNNING};
use crate::services::{executor, script_tasks};
use crate::types::ScriptExecuteRequest;

/// POST /api/v1/script/execute - Run a script if the host is idle
pub async fn execute(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ScriptExecuteRequest>,
) -> ApiResult<serde_json::Value> {
    let db = state.db.clone();
    let record = req.clone();
    let accepted = execute_async(&db, move |conn| {
        script_tasks::insert_task_if_idle(conn, &record)
    })
    .await
    .map_err(|e| db_error(&state, e))?;

    if !accepted {
        warn!(
            "Refusing script '{}' (task {}): another script is still in flight",
            req.name, req.task_id
        );
        return Err(state.catalog.error(ERR_SCRIPT_ALREADY_RUNNING));
    }

    info!("Accepted script '{}' as task {}", req.name, req.task_id);

    tokio::spawn(executor::execute_task(
        state.db.clone(),
        req.task_id,
        req.content.clone(),
        state.script_dir.clone(),
    ));

    Ok(Envelope::ok())
}
