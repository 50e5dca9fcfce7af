use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::agent_rpc::AgentCallError;
use crate::api::{db_error, ApiResult, AppState};
use crate::db::execute_async;
use crate::envelope::{
    Envelope, ERR_EXEC_SERVER_NOT_FOUND, ERR_SCRIPT_EXECUTION_FAILED, ERR_SCRIPT_NOT_FOUND,
    ERR_SCRIPT_RESULT_NOT_FOUND,
};
use crate::services::{script_registry, server_registry};
use crate::types::{
    AgentScriptRequest, CreateScriptRequest, CreatedResponse, ExecuteScriptRequest,
    ExecuteScriptResponse, Script, ScriptResult, ScriptResultReport, UpdateScriptRequest,
};

/// POST /api/v1/scripts - Store a script for later execution
pub async fn create_script(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateScriptRequest>,
) -> ApiResult<CreatedResponse> {
    info!("Creating script: name={}", req.name);

    let db = state.db.clone();
    let body = req.clone();
    let id = execute_async(&db, move |conn| script_registry::create_script(conn, &body))
        .await
        .map_err(|e| db_error(&state, e))?;

    Ok(Envelope::with_data(CreatedResponse { id }))
}

/// GET /api/v1/scripts/:id - Fetch one script
pub async fn get_script(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Script> {
    let db = state.db.clone();
    let script = execute_async(&db, move |conn| script_registry::get_script(conn, id))
        .await
        .map_err(|e| db_error(&state, e))?
        .ok_or_else(|| state.catalog.error(ERR_SCRIPT_NOT_FOUND))?;

    Ok(Envelope::with_data(script))
}

/// GET /api/v1/scripts - List all stored scripts
pub async fn list_scripts(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Script>> {
    let db = state.db.clone();
    let scripts = execute_async(&db, move |conn| script_registry::list_scripts(conn))
        .await
        .map_err(|e| db_error(&state, e))?;

    Ok(Envelope::with_data(scripts))
}

/// POST /api/v1/scripts/:id - Update script fields that were provided
pub async fn update_script(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateScriptRequest>,
) -> ApiResult<Script> {
    let db = state.db.clone();
    let mut script = execute_async(&db, move |conn| script_registry::get_script(conn, id))
        .await
        .map_err(|e| db_error(&state, e))?
        .ok_or_else(|| state.catalog.error(ERR_SCRIPT_NOT_FOUND))?;

    if let Some(name) = req.name {
        script.name = name;
    }
    if let Some(description) = req.description {
        script.description = description;
    }
    if let Some(script_type) = req.script_type {
        script.script_type = script_type;
    }
    if let Some(content) = req.content {
        script.content = content;
    }

    let db = state.db.clone();
    let updated = script.clone();
    execute_async(&db, move |conn| {
        script_registry::update_script(conn, &updated)
    })
    .await
    .map_err(|e| db_error(&state, e))?;

    Ok(Envelope::with_data(script))
}

/// DELETE /api/v1/scripts/:id - Remove a stored script
pub async fn delete_script(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<serde_json::Value> {
    let db = state.db.clone();
    let deleted = execute_async(&db, move |conn| script_registry::delete_script(conn, id))
        .await
        .map_err(|e| db_error(&state, e))?;

    if !deleted {
        return Err(state.catalog.error(ERR_SCRIPT_NOT_FOUND));
    }

    info!("Script deleted: id={}", id);
    Ok(Envelope::ok())
}

/// GET /api/v1/scripts/:id/results - Execution history, newest first
pub async fn list_results(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Vec<ScriptResult>> {
    let db = state.db.clone();
    execute_async(&db, move |conn| script_registry::get_script(conn, id))
        .await
        .map_err(|e| db_error(&state, e))?
        .ok_or_else(|| state.catalog.error(ERR_SCRIPT_NOT_FOUND))?;

    let db = state.db.clone();
    let results = execute_async(&db, move |conn| {
        script_registry::list_results_by_script(conn, id)
    })
    .await
    .map_err(|e| db_error(&state, e))?;

    Ok(Envelope::with_data(results))
}

/// POST /api/v1/scripts/execute - Run a script on one server
///
/// The result row is written with status `running` before the agent is
/// contacted, so every dispatch attempt is visible in the history even when
/// the agent never hears about it.
pub async fn execute_script(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ExecuteScriptRequest>,
) -> ApiResult<ExecuteScriptResponse> {
    let script_id = req.script_id;
    let server_id = req.server_id;
    info!(
        "Script execution requested: script_id={}, server_id={}",
        script_id, server_id
    );

    let db = state.db.clone();
    let script = execute_async(&db, move |conn| script_registry::get_script(conn, script_id))
        .await
        .map_err(|e| db_error(&state, e))?
        .ok_or_else(|| state.catalog.error(ERR_SCRIPT_NOT_FOUND))?;

    let db = state.db.clone();
    let server = execute_async(&db, move |conn| server_registry::get_server(conn, server_id))
        .await
        .map_err(|e| db_error(&state, e))?
        .ok_or_else(|| state.catalog.error(ERR_EXEC_SERVER_NOT_FOUND))?;

    let task_id = match state.ids.next() {
        Ok(id) => id,
        Err(e) => {
            error!("Task ID generation failed: {:#}", e);
            return Err(state.catalog.error(ERR_SCRIPT_EXECUTION_FAILED));
        }
    };

    let db = state.db.clone();
    let address = server.address.clone();
    let agent_port = server.agent_port;
    execute_async(&db, move |conn| {
        script_registry::insert_script_result(conn, task_id, script_id, server_id, &address, agent_port)
    })
    .await
    .map_err(|e| db_error(&state, e))?;

    let push = AgentScriptRequest {
        id: script.id,
        name: script.name.clone(),
        content: script.content.clone(),
        task_id,
    };

    if let Err(e) = state
        .agent
        .post(&server.address, server.agent_port, "script/execute", &push)
        .await
    {
        error!("Script dispatch failed: task_id={}, {}", task_id, e);

        let message = match &e {
            AgentCallError::Transport { source, .. } => {
                format!("failed to send execution request: {source}")
            }
            AgentCallError::Decode { source, .. } => {
                format!("failed to parse agent response: {source}")
            }
            AgentCallError::Remote { message, .. } => {
                format!("agent returned error: {message}")
            }
        };

        let db = state.db.clone();
        if let Err(e) = execute_async(&db, move |conn| {
            script_registry::update_result_by_task_id(conn, task_id, "failed", "", &message)
        })
        .await
        {
            error!("Failed to record dispatch failure: {:#}", e);
        }

        return Err(state.catalog.error(ERR_SCRIPT_EXECUTION_FAILED));
    }

    info!("Script dispatched: task_id={}, server={}", task_id, server.name);
    Ok(Envelope::with_data(ExecuteScriptResponse { task_id }))
}

/// POST /api/v1/scripts/receive-result - Result push from an agent
///
/// Idempotent; agents re-send failed results every cycle and may re-send
/// successes until the acknowledgment gets through.
pub async fn receive_result(
    State(state): State<Arc<AppState>>,
    Json(report): Json<ScriptResultReport>,
) -> ApiResult<serde_json::Value> {
    let script_id = report.script_id;
    let db = state.db.clone();
    match execute_async(&db, move |conn| script_registry::get_script(conn, script_id)).await {
        Ok(None) => warn!(
            "Result for deleted script: script_id={}, task_id={}",
            report.script_id, report.task_id
        ),
        Err(e) => warn!("Script lookup failed while receiving result: {:#}", e),
        Ok(Some(_)) => {}
    }

    let task_id = report.task_id;
    let db = state.db.clone();
    let status = report.status.clone();
    let output = report.output.clone();
    let error_message = report.error_message.clone();
    let updated = execute_async(&db, move |conn| {
        script_registry::update_result_by_task_id(conn, task_id, &status, &output, &error_message)
    })
    .await
    .map_err(|e| db_error(&state, e))?;

    if !updated {
        warn!("Result for unknown task: task_id={}", task_id);
        return Err(state.catalog.error(ERR_SCRIPT_RESULT_NOT_FOUND));
    }

    info!(
        "Script result received: task_id={}, status={}",
        task_id, report.status
    );
    Ok(Envelope::ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_rpc::AgentClient;
    use crate::db::init_test_db;
    use crate::envelope::ErrorCatalog;
    use crate::idgen::IdGenerator;
    use crate::types::RegisterServerRequest;
    use axum::routing::post as axum_post;
    use axum::Router;
    use std::sync::Mutex;

    #[derive(Clone)]
    struct FakeAgent {
        calls: Arc<Mutex<Vec<String>>>,
        reply: Envelope,
    }

    async fn fake_handler(State(fake): State<FakeAgent>, Path(rest): Path<String>) -> Envelope {
        fake.calls.lock().unwrap().push(rest);
        fake.reply.clone()
    }

    async fn spawn_fake_agent(reply: Envelope) -> (u16, Arc<Mutex<Vec<String>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let fake = FakeAgent {
            calls: calls.clone(),
            reply,
        };
        let app = Router::new()
            .route("/api/v1/*rest", axum_post(fake_handler))
            .with_state(fake);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (port, calls)
    }

    fn test_state() -> Arc<AppState> {
        Arc::new(AppState {
            db: init_test_db().unwrap(),
            agent: AgentClient::new().unwrap(),
            ids: IdGenerator::new(1),
            catalog: ErrorCatalog::build(),
        })
    }

    fn seed(state: &AppState, agent_port: u16) -> (i64, i64) {
        let conn = state.db.get().unwrap();
        let server_id = server_registry::register_server(
            &conn,
            &RegisterServerRequest {
                name: "web-1".to_string(),
                address: "127.0.0.1".to_string(),
                agent_port: Some(agent_port),
                ssh_user: None,
                ssh_port: None,
                ssh_key: None,
            },
        )
        .unwrap();
        let script_id = script_registry::create_script(
            &conn,
            &CreateScriptRequest {
                name: "disk-usage".to_string(),
                description: None,
                script_type: None,
                content: "df -h".to_string(),
            },
        )
        .unwrap();
        (server_id, script_id)
    }

    #[tokio::test]
    async fn execute_dispatches_and_leaves_row_running() {
        let (port, calls) = spawn_fake_agent(Envelope::ok()).await;
        let state = test_state();
        let (server_id, script_id) = seed(&state, port);

        let resp = execute_script(
            State(state.clone()),
            Json(ExecuteScriptRequest {
                script_id,
                server_id,
            }),
        )
        .await
        .unwrap();

        let task_id = resp.data.unwrap().task_id;
        assert!(task_id > 0);
        assert_eq!(calls.lock().unwrap().as_slice(), ["script/execute"]);

        let conn = state.db.get().unwrap();
        let row = script_registry::get_result_by_task_id(&conn, task_id)
            .unwrap()
            .unwrap();
        assert_eq!(row.status, "running");
        assert_eq!(row.server_address, "127.0.0.1");
    }

    #[tokio::test]
    async fn dispatch_transport_failure_is_recorded_on_the_row() {
        let dead_port = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let state = test_state();
        let (server_id, script_id) = seed(&state, dead_port);

        let err = execute_script(
            State(state.clone()),
            Json(ExecuteScriptRequest {
                script_id,
                server_id,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, ERR_SCRIPT_EXECUTION_FAILED);

        // The pre-dispatch row exists and now carries the failure.
        let conn = state.db.get().unwrap();
        let rows = script_registry::list_results_by_script(&conn, script_id).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, "failed");
        assert!(rows[0]
            .error_message
            .starts_with("failed to send execution request:"));
    }

    #[tokio::test]
    async fn busy_agent_reply_is_recorded_with_its_message() {
        let reply = Envelope {
            code: 90002,
            message: "script is already running".to_string(),
            data: None,
        };
        let (port, _) = spawn_fake_agent(reply).await;
        let state = test_state();
        let (server_id, script_id) = seed(&state, port);

        let err = execute_script(
            State(state.clone()),
            Json(ExecuteScriptRequest {
                script_id,
                server_id,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, ERR_SCRIPT_EXECUTION_FAILED);

        let conn = state.db.get().unwrap();
        let rows = script_registry::list_results_by_script(&conn, script_id).unwrap();
        assert_eq!(rows[0].status, "failed");
        assert_eq!(
            rows[0].error_message,
            "agent returned error: script is already running"
        );
    }

    #[tokio::test]
    async fn missing_script_or_server_rejected_before_any_row() {
        let state = test_state();
        let (server_id, script_id) = seed(&state, 1);

        let err = execute_script(
            State(state.clone()),
            Json(ExecuteScriptRequest {
                script_id: 999,
                server_id,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, ERR_SCRIPT_NOT_FOUND);

        let err = execute_script(
            State(state.clone()),
            Json(ExecuteScriptRequest {
                script_id,
                server_id: 999,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, ERR_EXEC_SERVER_NOT_FOUND);

        let conn = state.db.get().unwrap();
        assert!(script_registry::list_results_by_script(&conn, script_id)
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn received_result_overwrites_the_pending_row() {
        let (port, _) = spawn_fake_agent(Envelope::ok()).await;
        let state = test_state();
        let (server_id, script_id) = seed(&state, port);

        let task_id = execute_script(
            State(state.clone()),
            Json(ExecuteScriptRequest {
                script_id,
                server_id,
            }),
        )
        .await
        .unwrap()
        .data
        .unwrap()
        .task_id;

        receive_result(
            State(state.clone()),
            Json(ScriptResultReport {
                task_id,
                script_id,
                status: "success".to_string(),
                output: "Filesystem ok\n".to_string(),
                error_message: String::new(),
            }),
        )
        .await
        .unwrap();

        let conn = state.db.get().unwrap();
        let row = script_registry::get_result_by_task_id(&conn, task_id)
            .unwrap()
            .unwrap();
        assert_eq!(row.status, "success");
        assert_eq!(row.output, "Filesystem ok\n");
    }

    #[tokio::test]
    async fn result_for_unknown_task_is_rejected() {
        let state = test_state();
        let (_, script_id) = seed(&state, 1);

        let err = receive_result(
            State(state.clone()),
            Json(ScriptResultReport {
                task_id: 777,
                script_id,
                status: "success".to_string(),
                output: String::new(),
                error_message: String::new(),
            }),
        )
        .await
        .unwrap_err();

        assert_eq!(err.code, ERR_SCRIPT_RESULT_NOT_FOUND);
    }

    #[tokio::test]
    async fn script_crud_roundtrip() {
        let state = test_state();

        let created = create_script(
            State(state.clone()),
            Json(CreateScriptRequest {
                name: "uptime".to_string(),
                description: Some("host uptime".to_string()),
                script_type: None,
                content: "uptime".to_string(),
            }),
        )
        .await
        .unwrap()
        .data
        .unwrap();

        let fetched = get_script(State(state.clone()), Path(created.id))
            .await
            .unwrap()
            .data
            .unwrap();
        assert_eq!(fetched.name, "uptime");
        assert_eq!(fetched.script_type, "shell");

        let updated = update_script(
            State(state.clone()),
            Path(created.id),
            Json(UpdateScriptRequest {
                name: None,
                description: None,
                script_type: None,
                content: Some("uptime -p".to_string()),
            }),
        )
        .await
        .unwrap()
        .data
        .unwrap();
        assert_eq!(updated.content, "uptime -p");
        assert_eq!(updated.name, "uptime");

        delete_script(State(state.clone()), Path(created.id))
            .await
            .unwrap();
        let err = get_script(State(state.clone()), Path(created.id))
            .await
            .unwrap_err();
        assert_eq!(err.code, ERR_SCRIPT_NOT_FOUND);
    }
}
