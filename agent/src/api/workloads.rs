use axum::extract::{Json, Path, State};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::api::{db_error, ApiResult, AppState};
use crate::compose;
use crate::db::execute_async;
use crate::envelope::{
    Envelope, ERR_COMPOSE_FILE_CREATE_FAILED, ERR_COMPOSE_NOT_FOUND, ERR_COMPOSE_START_FAILED,
    ERR_COMPOSE_STOP_FAILED, ERR_DOCKER_NOT_INSTALLED, ERR_SQL_NOT_FOUND,
};
use crate::services::workloads;
use crate::types::DeployRequest;

/// POST /api/v1/application - Accept a workload and bring it up
pub async fn deploy(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DeployRequest>,
) -> ApiResult<serde_json::Value> {
    if !compose::docker_available().await {
        warn!(
            "Rejecting deployment of '{}': docker is not installed",
            req.name
        );
        return Err(state.catalog.error(ERR_DOCKER_NOT_INSTALLED));
    }

    let flavor = match compose::detect_compose().await {
        Some(f) => f,
        None => {
            warn!(
                "Rejecting deployment of '{}': no compose frontend found",
                req.name
            );
            return Err(state.catalog.error(ERR_COMPOSE_NOT_FOUND));
        }
    };

    let file = match state.compose.write_compose_file(&req.name, &req.content) {
        Ok(path) => path,
        Err(e) => {
            error!("Cannot materialize compose file for '{}': {:#}", req.name, e);
            return Err(state.catalog.error(ERR_COMPOSE_FILE_CREATE_FAILED));
        }
    };

    let db = state.db.clone();
    let record = req.clone();
    execute_async(&db, move |conn| workloads::insert_workload(conn, &record))
        .await
        .map_err(|e| db_error(&state, e))?;

    info!(
        "Deployment {} accepted: workload '{}' starting",
        req.deploy_id, req.name
    );

    // Bring the stack up off the request path. On failure the record flips to
    // failed and the compose file is withdrawn so a later start cannot pick
    // up a stack that never came up.
    let db = state.db.clone();
    let deploy_id = req.deploy_id;
    let name = req.name.clone();
    tokio::spawn(async move {
        if let Err(e) = compose::up(flavor, &file).await {
            error!("compose up for '{}' failed: {:#}", name, e);
            let update = execute_async(&db, move |conn| {
                workloads::update_status_by_deploy_id(conn, deploy_id, "failed")
            })
            .await;
            if let Err(e) = update {
                error!("Cannot record failure of deployment {}: {:#}", deploy_id, e);
            }
            if let Err(e) = std::fs::remove_file(&file) {
                warn!("Cannot remove compose file {:?}: {}", file, e);
            }
        }
    });

    Ok(Envelope::ok())
}

/// POST /api/v1/application/start/:deploy_id - Start a stopped workload
pub async fn start(
    State(state): State<Arc<AppState>>,
    Path(deploy_id): Path<u64>,
) -> ApiResult<serde_json::Value> {
    let db = state.db.clone();
    let workload = execute_async(&db, move |conn| {
        workloads::get_by_deploy_id(conn, deploy_id)
    })
    .await
    .map_err(|e| db_error(&state, e))?
    .ok_or_else(|| {
        warn!("Start request for unknown deployment {}", deploy_id);
        state.catalog.error(ERR_SQL_NOT_FOUND)
    })?;

    if workload.status != "stopped" {
        warn!(
            "Deployment {} is '{}', only stopped workloads can be started",
            deploy_id, workload.status
        );
        return Err(state.catalog.error(ERR_COMPOSE_START_FAILED));
    }

    let file = state.compose.compose_file(&workload.name);
    if !file.exists() {
        warn!(
            "Compose file {:?} is missing, cannot start deployment {}",
            file, deploy_id
        );
        return Err(state.catalog.error(ERR_COMPOSE_START_FAILED));
    }

    let flavor = match compose::detect_compose().await {
        Some(f) => f,
        None => {
            warn!("No compose frontend found");
            return Err(state.catalog.error(ERR_COMPOSE_NOT_FOUND));
        }
    };

    // Atomically claim the workload; a second start racing this one loses.
    let db = state.db.clone();
    let claimed = execute_async(&db, move |conn| {
        workloads::try_mark_starting(conn, deploy_id)
    })
    .await
    .map_err(|e| db_error(&state, e))?;
    if !claimed {
        warn!("Deployment {} is already being started", deploy_id);
        return Err(state.catalog.error(ERR_COMPOSE_START_FAILED));
    }

    let db = state.db.clone();
    tokio::spawn(async move {
        if let Err(e) = compose::start(flavor, &file).await {
            error!("compose start for deployment {} failed: {:#}", deploy_id, e);
            let update = execute_async(&db, move |conn| {
                workloads::update_status_by_deploy_id(conn, deploy_id, "failed")
            })
            .await;
            if let Err(e) = update {
                error!("Cannot record failure of deployment {}: {:#}", deploy_id, e);
            }
        }
    });

    Ok(Envelope::ok())
}

/// POST /api/v1/application/stop/:deploy_id - Stop a running workload
pub async fn stop(
    State(state): State<Arc<AppState>>,
    Path(deploy_id): Path<u64>,
) -> ApiResult<serde_json::Value> {
    let db = state.db.clone();
    let workload = execute_async(&db, move |conn| {
        workloads::get_by_deploy_id(conn, deploy_id)
    })
    .await
    .map_err(|e| db_error(&state, e))?
    .ok_or_else(|| {
        warn!("Stop request for unknown deployment {}", deploy_id);
        state.catalog.error(ERR_SQL_NOT_FOUND)
    })?;

    if workload.status != "running" {
        warn!(
            "Deployment {} is '{}', only running workloads can be stopped",
            deploy_id, workload.status
        );
        return Err(state.catalog.error(ERR_COMPOSE_STOP_FAILED));
    }

    let file = state.compose.compose_file(&workload.name);
    if !file.exists() {
        warn!(
            "Compose file {:?} is missing, cannot stop deployment {}",
            file, deploy_id
        );
        return Err(state.catalog.error(ERR_COMPOSE_STOP_FAILED));
    }

    let flavor = match compose::detect_compose().await {
        Some(f) => f,
        None => {
            warn!("No compose frontend found");
            return Err(state.catalog.error(ERR_COMPOSE_NOT_FOUND));
        }
    };

    // Stop synchronously; the caller wants to know the containers are down.
    if let Err(e) = compose::stop(flavor, &file).await {
        error!("compose stop for deployment {} failed: {:#}", deploy_id, e);
        return Err(state.catalog.error(ERR_COMPOSE_STOP_FAILED));
    }

    let db = state.db.clone();
    execute_async(&db, move |conn| {
        workloads::update_status_by_deploy_id(conn, deploy_id, "stopped")
    })
    .await
    .map_err(|e| db_error(&state, e))?;

    info!("Deployment {} stopped", deploy_id);
    Ok(Envelope::ok())
}

/// POST /api/v1/application/delete/:deploy_id - Remove a workload
pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(deploy_id): Path<u64>,
) -> ApiResult<serde_json::Value> {
    let db = state.db.clone();
    let workload = execute_async(&db, move |conn| {
        workloads::get_by_deploy_id(conn, deploy_id)
    })
    .await
    .map_err(|e| db_error(&state, e))?;

    let workload = match workload {
        Some(w) => w,
        None => {
            info!("Deployment {} is already absent, nothing to remove", deploy_id);
            return Ok(Envelope::ok());
        }
    };

    // Best-effort teardown; a broken docker must not block removal.
    if workload.status == "running" {
        match compose::detect_compose().await {
            Some(flavor) => {
                let file = state.compose.compose_file(&workload.name);
                if let Err(e) = compose::stop(flavor, &file).await {
                    warn!(
                        "Cannot stop deployment {} before removal: {:#}",
                        deploy_id, e
                    );
                }
            }
            None => {
                warn!(
                    "No compose frontend found, skipping teardown of deployment {}",
                    deploy_id
                );
            }
        }
    }

    let db = state.db.clone();
    execute_async(&db, move |conn| {
        workloads::delete_by_deploy_id(conn, deploy_id)
    })
    .await
    .map_err(|e| db_error(&state, e))?;

    info!("Deployment {} removed", deploy_id);
    Ok(Envelope::ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::ComposeRunner;
    use crate::db::init_test_db;
    use crate::envelope::{ErrorCatalog, CODE_SUCCESS};
    use tempfile::TempDir;

    fn test_state() -> (Arc<AppState>, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let state = Arc::new(AppState {
            db: init_test_db().unwrap(),
            compose: ComposeRunner::new(dir.path().join("compose")).unwrap(),
            catalog: ErrorCatalog::build(),
            script_dir: dir.path().join("scripts"),
        });
        (state, dir)
    }

    fn deploy_request(deploy_id: u64, name: &str) -> DeployRequest {
        DeployRequest {
            id: 7,
            name: name.to_string(),
            description: String::new(),
            app_type: "compose".to_string(),
            content: "services: {}".to_string(),
            version: String::new(),
            server_id: 3,
            deploy_id,
        }
    }

    fn seed_workload(state: &AppState, deploy_id: u64, name: &str, status: &str) {
        let conn = state.db.get().unwrap();
        workloads::insert_workload(&conn, &deploy_request(deploy_id, name)).unwrap();
        if status != "starting" {
            workloads::update_status_by_deploy_id(&conn, deploy_id, status).unwrap();
        }
    }

    #[tokio::test]
    async fn start_for_unknown_deployment_is_not_found() {
        let (state, _dir) = test_state();

        let err = start(State(state), Path(9218)).await.unwrap_err();
        assert_eq!(err.code, ERR_SQL_NOT_FOUND);
    }

    #[tokio::test]
    async fn start_requires_a_stopped_workload() {
        let (state, _dir) = test_state();
        seed_workload(&state, 11, "web", "starting");

        let err = start(State(state), Path(11)).await.unwrap_err();
        assert_eq!(err.code, ERR_COMPOSE_START_FAILED);
    }

    #[tokio::test]
    async fn start_without_compose_file_fails() {
        let (state, _dir) = test_state();
        seed_workload(&state, 12, "web", "stopped");

        // Record says stopped but nothing was ever materialized on disk.
        let err = start(State(state), Path(12)).await.unwrap_err();
        assert_eq!(err.code, ERR_COMPOSE_START_FAILED);
    }

    #[tokio::test]
    async fn stop_requires_a_running_workload() {
        let (state, _dir) = test_state();
        seed_workload(&state, 21, "web", "starting");

        let err = stop(State(state), Path(21)).await.unwrap_err();
        assert_eq!(err.code, ERR_COMPOSE_STOP_FAILED);
    }

    #[tokio::test]
    async fn stop_without_compose_file_fails() {
        let (state, _dir) = test_state();
        seed_workload(&state, 22, "web", "running");

        let err = stop(State(state), Path(22)).await.unwrap_err();
        assert_eq!(err.code, ERR_COMPOSE_STOP_FAILED);
    }

    #[tokio::test]
    async fn delete_of_unknown_deployment_is_idempotent() {
        let (state, _dir) = test_state();

        let ok = delete(State(state), Path(404)).await.unwrap();
        assert_eq!(ok.code, CODE_SUCCESS);
    }

    #[tokio::test]
    async fn delete_removes_the_stored_record() {
        let (state, _dir) = test_state();
        seed_workload(&state, 31, "web", "starting");

        let ok = delete(State(state.clone()), Path(31)).await.unwrap();
        assert_eq!(ok.code, CODE_SUCCESS);

        let conn = state.db.get().unwrap();
        assert!(workloads::get_by_deploy_id(&conn, 31).unwrap().is_none());
    }
}
