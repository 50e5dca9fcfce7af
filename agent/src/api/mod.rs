pub mod scripts;
pub mod system;
pub mod workloads;

use axum::routing::{get, post};
use axum::Router;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::compose::ComposeRunner;
use crate::db::DbPool;
use crate::envelope::{Envelope, ErrorCatalog, ERR_SQL};

/// Shared state for all API handlers
pub struct AppState {
    pub db: DbPool,
    pub compose: ComposeRunner,
    pub catalog: ErrorCatalog,
    pub script_dir: PathBuf,
}

/// Handler result carrying an envelope on both sides. Errors are still
/// HTTP 200; the envelope code tells the caller what went wrong.
pub type ApiResult<T> = Result<Envelope<T>, Envelope>;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(system::health))
        // Host facts for the control plane
        .route("/api/v1/server/info", get(system::server_info))
        // Workload lifecycle
        .route("/api/v1/application", post(workloads::deploy))
        .route("/api/v1/application/start/:deploy_id", post(workloads::start))
        .route("/api/v1/application/stop/:deploy_id", post(workloads::stop))
        .route("/api/v1/application/delete/:deploy_id", post(workloads::delete))
        // Script execution
        .route("/api/v1/script/execute", post(scripts::execute))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Maps a storage failure to the generic SQL error envelope.
pub(crate) fn db_error(state: &AppState, err: anyhow::Error) -> Envelope {
    error!("Database operation failed: {:#}", err);
    state.catalog.error(ERR_SQL)
}
