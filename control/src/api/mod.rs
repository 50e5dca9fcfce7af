pub mod applications;
pub mod deployments;
pub mod scripts;
pub mod servers;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::agent_rpc::AgentClient;
use crate::db::{self, DbPool};
use crate::envelope::{Envelope, ErrorCatalog, ERR_DUPLICATED_KEY, ERR_SQL};
use crate::idgen::IdGenerator;
use crate::types::HealthResponse;

pub struct AppState {
    pub db: DbPool,
    pub agent: AgentClient,
    pub ids: IdGenerator,
    pub catalog: ErrorCatalog,
}

/// Handlers answer HTTP 200 with an envelope either way; the Err side is an
/// error envelope so `?` short-circuits straight to the wire.
pub type ApiResult<T> = Result<Envelope<T>, Envelope>;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health))
        // Server registry
        .route("/api/v1/server", post(servers::register_server))
        .route("/api/v1/server", get(servers::list_servers))
        .route("/api/v1/server/:id", get(servers::get_server))
        .route("/api/v1/server/:id", put(servers::update_server))
        .route("/api/v1/server/:id", delete(servers::delete_server))
        // Application registry
        .route("/api/v1/application", post(applications::create_application))
        .route("/api/v1/application", get(applications::list_applications))
        .route("/api/v1/application/:id", get(applications::get_application))
        .route("/api/v1/application/:id", put(applications::update_application))
        .route("/api/v1/application/:id", delete(applications::delete_application))
        // Deployment orchestration
        .route("/api/v1/deployment", get(deployments::list_deployments))
        .route("/api/v1/deployment/deploy/:id", post(deployments::deploy))
        .route("/api/v1/deployment/deploy/:id", delete(deployments::undeploy))
        .route("/api/v1/deployment/start/:id", post(deployments::start))
        .route("/api/v1/deployment/stop/:id", post(deployments::stop))
        .route("/api/v1/deployment/:id/servers", get(deployments::list_servers))
        .route("/api/v1/deployment/report", post(deployments::report_status))
        // Script dispatch
        .route("/api/v1/scripts", post(scripts::create_script))
        .route("/api/v1/scripts", get(scripts::list_scripts))
        .route("/api/v1/scripts/:id", get(scripts::get_script))
        .route("/api/v1/scripts/:id", post(scripts::update_script))
        .route("/api/v1/scripts/:id", delete(scripts::delete_script))
        .route("/api/v1/scripts/:id/results", get(scripts::list_results))
        .route("/api/v1/scripts/execute", post(scripts::execute_script))
        .route("/api/v1/scripts/receive-result", post(scripts::receive_result))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - Health check endpoint
async fn health() -> Envelope<HealthResponse> {
    Envelope::with_data(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Maps a storage-layer failure onto the envelope taxonomy. Uniqueness
/// violations get their own code; everything else is a generic sql error.
pub(crate) fn db_error(state: &AppState, err: anyhow::Error) -> Envelope {
    if db::is_unique_violation(&err) {
        warn!("Rejected by uniqueness constraint: {:#}", err);
        state.catalog.error(ERR_DUPLICATED_KEY)
    } else {
        error!("Database operation failed: {:#}", err);
        state.catalog.error(ERR_SQL)
    }
}
