use axum::{
    extract::{Path, Query, State},
    Json,
};
use std::sync::Arc;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::{error, info, warn};

use crate::api::{db_error, ApiResult, AppState};
use crate::db::{self, execute_async};
use crate::envelope::{
    Envelope, ERR_AGENT_DELETE_FAILED, ERR_AGENT_DEPLOY_FAILED, ERR_AGENT_START_FAILED,
    ERR_AGENT_STOP_FAILED, ERR_ALREADY_DEPLOYED, ERR_APPLICATION_NOT_FOUND,
    ERR_CREATE_DEPLOYMENT_RECORD_FAILED, ERR_DEPLOYMENT_NOT_FOUND, ERR_DEPLOY_ID_GENERATE_FAILED,
    ERR_SERVER_NOT_FOUND,
};
use crate::services::{application_registry, deployment_registry, server_registry};
use crate::types::{
    AgentDeployRequest, DeployRequest, DeployResponse, DeployedServerView, Deployment,
    DeploymentJoinRow, DeploymentView, ListDeploymentsQuery, ReportStatusRequest, Server,
};

/// POST /api/v1/deployment/deploy/:id - Deploy an application to a server
///
/// The agent is asked to take the workload before anything is persisted; a
/// deployment row therefore always refers to a workload some agent accepted.
pub async fn deploy(
    State(state): State<Arc<AppState>>,
    Path(application_id): Path<i64>,
    Json(req): Json<DeployRequest>,
) -> ApiResult<DeployResponse> {
    let server_id = req.server_id;
    info!(
        "Deploy requested: application_id={}, server_id={}",
        application_id, server_id
    );

    let db = state.db.clone();
    let app = execute_async(&db, move |conn| {
        application_registry::get_application(conn, application_id)
    })
    .await
    .map_err(|e| db_error(&state, e))?
    .ok_or_else(|| state.catalog.error(ERR_APPLICATION_NOT_FOUND))?;

    let db = state.db.clone();
    let server = execute_async(&db, move |conn| server_registry::get_server(conn, server_id))
        .await
        .map_err(|e| db_error(&state, e))?
        .ok_or_else(|| state.catalog.error(ERR_SERVER_NOT_FOUND))?;

    // An application occupies a server at most once.
    let db = state.db.clone();
    let existing = execute_async(&db, move |conn| {
        deployment_registry::get_by_server_and_app(conn, server_id, application_id)
    })
    .await
    .map_err(|e| db_error(&state, e))?;
    if existing.is_some() {
        return Err(state.catalog.error(ERR_ALREADY_DEPLOYED));
    }

    let deploy_id = match state.ids.next() {
        Ok(id) => id,
        Err(e) => {
            error!("Deploy ID generation failed: {:#}", e);
            return Err(state.catalog.error(ERR_DEPLOY_ID_GENERATE_FAILED));
        }
    };

    let push = AgentDeployRequest {
        id: app.id,
        name: app.name.clone(),
        description: app.description.clone(),
        app_type: app.app_type.clone(),
        content: app.content.clone(),
        version: app.version.clone(),
        server_id,
        deploy_id,
    };

    if let Err(e) = state
        .agent
        .post(&server.address, server.agent_port, "application", &push)
        .await
    {
        error!("Agent rejected deployment {}: {}", deploy_id, e);
        return Err(state.catalog.error(ERR_AGENT_DEPLOY_FAILED));
    }

    // The agent holds the workload now. If the record cannot be written the
    // agent must be told to drop it again, or it would run unaccounted.
    let db = state.db.clone();
    let content = app.content.clone();
    let inserted = execute_async(&db, move |conn| {
        deployment_registry::insert_deployment(conn, deploy_id, server_id, application_id, &content)
    })
    .await;

    let row_id = match inserted {
        Ok(id) => id,
        Err(e) => {
            let duplicate = db::is_unique_violation(&e);
            error!("Failed to record deployment {}: {:#}", deploy_id, e);

            let path = format!("application/delete/{}", deploy_id);
            if let Err(comp) = state
                .agent
                .post_empty(&server.address, server.agent_port, &path)
                .await
            {
                warn!(
                    "Compensating delete for deployment {} failed: {}",
                    deploy_id, comp
                );
            }

            let code = if duplicate {
                ERR_ALREADY_DEPLOYED
            } else {
                ERR_CREATE_DEPLOYMENT_RECORD_FAILED
            };
            return Err(state.catalog.error(code));
        }
    };

    info!(
        "Deployment recorded: id={}, deploy_id={}, application={}, server={}",
        row_id, deploy_id, app.name, server.name
    );
    Ok(Envelope::with_data(DeployResponse {
        id: row_id,
        deploy_id,
    }))
}

/// DELETE /api/v1/deployment/deploy/:id - Remove a deployment
///
/// The agent is told first; the row is only deleted once the agent has
/// acknowledged, so a failed agent call leaves the deployment intact.
pub async fn undeploy(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<serde_json::Value> {
    let (dep, server) = load_deployment_and_server(&state, id).await?;

    let path = format!("application/delete/{}", dep.deploy_id);
    if let Err(e) = state
        .agent
        .post_empty(&server.address, server.agent_port, &path)
        .await
    {
        error!("Agent failed to delete deployment {}: {}", dep.deploy_id, e);
        return Err(state.catalog.error(ERR_AGENT_DELETE_FAILED));
    }

    let db = state.db.clone();
    execute_async(&db, move |conn| {
        deployment_registry::delete_deployment(conn, id)
    })
    .await
    .map_err(|e| db_error(&state, e))?;

    info!("Deployment removed: id={}, deploy_id={}", id, dep.deploy_id);
    Ok(Envelope::ok())
}

/// POST /api/v1/deployment/start/:id - Start a stopped workload
///
/// Pure relay. The local status is owned by the agent's status reports and
/// is deliberately not touched here.
pub async fn start(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<serde_json::Value> {
    let (dep, server) = load_deployment_and_server(&state, id).await?;

    let path = format!("application/start/{}", dep.deploy_id);
    if let Err(e) = state
        .agent
        .post_empty(&server.address, server.agent_port, &path)
        .await
    {
        error!("Agent failed to start deployment {}: {}", dep.deploy_id, e);
        return Err(state.catalog.error(ERR_AGENT_START_FAILED));
    }

    info!("Start accepted: id={}, deploy_id={}", id, dep.deploy_id);
    Ok(Envelope::ok())
}

/// POST /api/v1/deployment/stop/:id - Stop a running workload
pub async fn stop(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<serde_json::Value> {
    let (dep, server) = load_deployment_and_server(&state, id).await?;

    let path = format!("application/stop/{}", dep.deploy_id);
    if let Err(e) = state
        .agent
        .post_empty(&server.address, server.agent_port, &path)
        .await
    {
        error!("Agent failed to stop deployment {}: {}", dep.deploy_id, e);
        return Err(state.catalog.error(ERR_AGENT_STOP_FAILED));
    }

    info!("Stop accepted: id={}, deploy_id={}", id, dep.deploy_id);
    Ok(Envelope::ok())
}

/// GET /api/v1/deployment - List deployments with display columns joined in
pub async fn list_deployments(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListDeploymentsQuery>,
) -> ApiResult<Vec<DeploymentView>> {
    let db = state.db.clone();
    let rows = execute_async(&db, move |conn| {
        deployment_registry::list_joined(conn, query.server_id, None)
    })
    .await
    .map_err(|e| db_error(&state, e))?;

    let mut views = Vec::with_capacity(rows.len());
    for row in rows {
        let DeploymentJoinRow {
            deployment,
            application_name,
            application_version,
            server_name,
            server_address,
        } = row;

        let (Some(application_name), Some(server_name), Some(server_address)) =
            (application_name, server_name, server_address)
        else {
            warn!(
                "Skipping deployment {}: referenced application or server is gone",
                deployment.id
            );
            continue;
        };

        views.push(DeploymentView {
            id: deployment.id,
            deploy_id: deployment.deploy_id,
            application_id: deployment.application_id,
            application_name,
            version: application_version.unwrap_or_default(),
            server_id: deployment.server_id,
            server_name,
            server_address,
            status: deployment.status,
            deployed_at: format_deployed_at(deployment.created_at),
        });
    }

    Ok(Envelope::with_data(views))
}

/// GET /api/v1/deployment/:id/servers - Servers an application is deployed on
pub async fn list_servers(
    State(state): State<Arc<AppState>>,
    Path(application_id): Path<i64>,
) -> ApiResult<Vec<DeployedServerView>> {
    let db = state.db.clone();
    execute_async(&db, move |conn| {
        application_registry::get_application(conn, application_id)
    })
    .await
    .map_err(|e| db_error(&state, e))?
    .ok_or_else(|| state.catalog.error(ERR_APPLICATION_NOT_FOUND))?;

    let db = state.db.clone();
    let rows = execute_async(&db, move |conn| {
        deployment_registry::list_joined(conn, None, Some(application_id))
    })
    .await
    .map_err(|e| db_error(&state, e))?;

    let mut views = Vec::with_capacity(rows.len());
    for row in rows {
        let DeploymentJoinRow {
            deployment,
            server_name,
            server_address,
            ..
        } = row;

        let (Some(server_name), Some(server_address)) = (server_name, server_address) else {
            warn!(
                "Skipping deployment {}: referenced server is gone",
                deployment.id
            );
            continue;
        };

        views.push(DeployedServerView {
            server_id: deployment.server_id,
            server_name,
            server_address,
            deploy_id: deployment.deploy_id,
            status: deployment.status,
        });
    }

    Ok(Envelope::with_data(views))
}

/// POST /api/v1/deployment/report - Status push from an agent
///
/// Last write wins; reports are applied in arrival order without sequencing.
pub async fn report_status(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ReportStatusRequest>,
) -> ApiResult<serde_json::Value> {
    let deploy_id = req.deploy_id;

    let db = state.db.clone();
    let existing = execute_async(&db, move |conn| {
        deployment_registry::get_by_deploy_id(conn, deploy_id)
    })
    .await
    .map_err(|e| db_error(&state, e))?;

    if existing.is_none() {
        warn!("Status report for unknown deployment: deploy_id={}", deploy_id);
        return Err(state.catalog.error(ERR_DEPLOYMENT_NOT_FOUND));
    }

    let db = state.db.clone();
    let status = req.status.clone();
    execute_async(&db, move |conn| {
        deployment_registry::update_status_by_deploy_id(conn, deploy_id, &status)
    })
    .await
    .map_err(|e| db_error(&state, e))?;

    info!(
        "Deployment status updated: deploy_id={}, status={}",
        deploy_id, req.status
    );
    Ok(Envelope::ok())
}

async fn load_deployment_and_server(
    state: &Arc<AppState>,
    id: i64,
) -> Result<(Deployment, Server), Envelope> {
    let db = state.db.clone();
    let dep = execute_async(&db, move |conn| deployment_registry::get_deployment(conn, id))
        .await
        .map_err(|e| db_error(state, e))?
        .ok_or_else(|| state.catalog.error(ERR_DEPLOYMENT_NOT_FOUND))?;

    let server_id = dep.server_id;
    let db = state.db.clone();
    let server = execute_async(&db, move |conn| server_registry::get_server(conn, server_id))
        .await
        .map_err(|e| db_error(state, e))?
        .ok_or_else(|| state.catalog.error(ERR_SERVER_NOT_FOUND))?;

    Ok((dep, server))
}

const DEPLOYED_AT_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

fn format_deployed_at(unix_secs: i64) -> String {
    OffsetDateTime::from_unix_timestamp(unix_secs)
        .ok()
        .and_then(|t| t.format(DEPLOYED_AT_FORMAT).ok())
        .unwrap_or_default()
}
