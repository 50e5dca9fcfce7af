use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::api::{db_error, ApiResult, AppState};
use crate::db::execute_async;
use crate::envelope::{Envelope, ERR_SERVER_NOT_FOUND};
use crate::services::server_registry;
use crate::types::{
    AgentInfo, CreatedResponse, RegisterServerRequest, Server, ServerDetail, UpdateServerRequest,
};

/// POST /api/v1/server - Register a server the controller may deploy to
pub async fn register_server(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterServerRequest>,
) -> ApiResult<CreatedResponse> {
    info!(
        "Registering server: name={}, address={}",
        req.name, req.address
    );

    let db = state.db.clone();
    let body = req.clone();
    let id = execute_async(&db, move |conn| {
        server_registry::register_server(conn, &body)
    })
    .await
    .map_err(|e| db_error(&state, e))?;

    info!("Server registered: id={}, name={}", id, req.name);
    Ok(Envelope::with_data(CreatedResponse { id }))
}

/// GET /api/v1/server/:id - Fetch one server, probing its agent for liveness
pub async fn get_server(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<ServerDetail> {
    let db = state.db.clone();
    let mut server = execute_async(&db, move |conn| server_registry::get_server(conn, id))
        .await
        .map_err(|e| db_error(&state, e))?
        .ok_or_else(|| state.catalog.error(ERR_SERVER_NOT_FOUND))?;

    let mut agent_info: Option<AgentInfo> = None;
    let alive = match state
        .agent
        .get(&server.address, server.agent_port, "server/info")
        .await
    {
        Ok(env) => {
            if let Some(data) = env.data {
                match serde_json::from_value::<AgentInfo>(data) {
                    Ok(info) => agent_info = Some(info),
                    Err(e) => warn!(
                        "Malformed server info from agent {}: {}",
                        server.address, e
                    ),
                }
            }
            true
        }
        Err(e) => {
            warn!("Liveness probe failed for server {}: {}", id, e);
            false
        }
    };

    let status = if alive { "online" } else { "offline" };
    if server.status != status {
        let db = state.db.clone();
        let new_status = status.to_string();
        if let Err(e) = execute_async(&db, move |conn| {
            server_registry::update_server_status(conn, id, &new_status)
        })
        .await
        {
            warn!("Failed to persist status for server {}: {:#}", id, e);
        }
        server.status = status.to_string();
    }

    Ok(Envelope::with_data(ServerDetail {
        server,
        agent: agent_info,
    }))
}

/// GET /api/v1/server - List all registered servers
pub async fn list_servers(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Server>> {
    let db = state.db.clone();
    let servers = execute_async(&db, move |conn| server_registry::list_servers(conn))
        .await
        .map_err(|e| db_error(&state, e))?;

    Ok(Envelope::with_data(servers))
}

/// PUT /api/v1/server/:id - Update server fields that were provided
pub async fn update_server(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateServerRequest>,
) -> ApiResult<Server> {
    let db = state.db.clone();
    let mut server = execute_async(&db, move |conn| server_registry::get_server(conn, id))
        .await
        .map_err(|e| db_error(&state, e))?
        .ok_or_else(|| state.catalog.error(ERR_SERVER_NOT_FOUND))?;

    if let Some(name) = req.name {
        server.name = name;
    }
    if let Some(address) = req.address {
        server.address = address;
    }
    if let Some(agent_port) = req.agent_port {
        server.agent_port = agent_port;
    }
    if let Some(ssh_user) = req.ssh_user {
        server.ssh_user = ssh_user;
    }
    if let Some(ssh_port) = req.ssh_port {
        server.ssh_port = ssh_port;
    }
    if let Some(ssh_key) = req.ssh_key {
        server.ssh_key = ssh_key;
    }

    let db = state.db.clone();
    let updated = server.clone();
    execute_async(&db, move |conn| {
        server_registry::update_server(conn, &updated)
    })
    .await
    .map_err(|e| db_error(&state, e))?;

    Ok(Envelope::with_data(server))
}

/// DELETE /api/v1/server/:id - Remove a server from the registry
pub async fn delete_server(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<serde_json::Value> {
    let db = state.db.clone();
    let deleted = execute_async(&db, move |conn| server_registry::delete_server(conn, id))
        .await
        .map_err(|e| db_error(&state, e))?;

    if !deleted {
        return Err(state.catalog.error(ERR_SERVER_NOT_FOUND));
    }

    info!("Server deleted: id={}", id);
    Ok(Envelope::ok())
}
