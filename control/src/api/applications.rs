use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;
use tracing::info;

use crate::api::{db_error, ApiResult, AppState};
use crate::db::execute_async;
use crate::envelope::{Envelope, ERR_APPLICATION_NOT_FOUND};
use crate::services::application_registry;
use crate::types::{Application, CreateApplicationRequest, CreatedResponse, UpdateApplicationRequest};

/// POST /api/v1/application - Register an application definition
pub async fn create_application(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateApplicationRequest>,
) -> ApiResult<CreatedResponse> {
    info!("Creating application: name={}", req.name);

    let db = state.db.clone();
    let body = req.clone();
    let id = execute_async(&db, move |conn| {
        application_registry::create_application(conn, &body)
    })
    .await
    .map_err(|e| db_error(&state, e))?;

    Ok(Envelope::with_data(CreatedResponse { id }))
}

/// GET /api/v1/application/:id - Fetch one application
pub async fn get_application(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Application> {
    let db = state.db.clone();
    let app = execute_async(&db, move |conn| {
        application_registry::get_application(conn, id)
    })
    .await
    .map_err(|e| db_error(&state, e))?
    .ok_or_else(|| state.catalog.error(ERR_APPLICATION_NOT_FOUND))?;

    Ok(Envelope::with_data(app))
}

/// GET /api/v1/application - List all applications
pub async fn list_applications(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Application>> {
    let db = state.db.clone();
    let apps = execute_async(&db, move |conn| {
        application_registry::list_applications(conn)
    })
    .await
    .map_err(|e| db_error(&state, e))?;

    Ok(Envelope::with_data(apps))
}

/// PUT /api/v1/application/:id - Update application fields that were provided
pub async fn update_application(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateApplicationRequest>,
) -> ApiResult<Application> {
    let db = state.db.clone();
    let mut app = execute_async(&db, move |conn| {
        application_registry::get_application(conn, id)
    })
    .await
    .map_err(|e| db_error(&state, e))?
    .ok_or_else(|| state.catalog.error(ERR_APPLICATION_NOT_FOUND))?;

    if let Some(name) = req.name {
        app.name = name;
    }
    if let Some(description) = req.description {
        app.description = description;
    }
    if let Some(app_type) = req.app_type {
        app.app_type = app_type;
    }
    if let Some(content) = req.content {
        app.content = content;
    }
    if let Some(version) = req.version {
        app.version = version;
    }

    let db = state.db.clone();
    let updated = app.clone();
    execute_async(&db, move |conn| {
        application_registry::update_application(conn, &updated)
    })
    .await
    .map_err(|e| db_error(&state, e))?;

    Ok(Envelope::with_data(app))
}

/// DELETE /api/v1/application/:id - Remove an application definition
pub async fn delete_application(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<serde_json::Value> {
    let db = state.db.clone();
    let deleted = execute_async(&db, move |conn| {
        application_registry::delete_application(conn, id)
    })
    .await
    .map_err(|e| db_error(&state, e))?;

    if !deleted {
        return Err(state.catalog.error(ERR_APPLICATION_NOT_FOUND));
    }

    info!("Application deleted: id={}", id);
    Ok(Envelope::ok())
}
