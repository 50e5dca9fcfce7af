mod agent_rpc;
mod api;
mod db;
mod envelope;
mod idgen;
mod services;
mod types;

use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use agent_rpc::AgentClient;
use api::AppState;
use envelope::ErrorCatalog;
use idgen::IdGenerator;

#[derive(Parser, Debug)]
#[command(name = "flotilla-control")]
#[command(about = "Flotilla fleet controller", long_about = None)]
struct Args {
    /// Bind address for HTTP server
    #[arg(long, default_value = "0.0.0.0:8080")]
    bind: String,

    /// Database file path
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Machine id mixed into generated deploy and task ids; give every
    /// controller instance its own
    #[arg(long, env = "FLOTILLA_MACHINE_ID", default_value_t = 1)]
    machine_id: u16,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting Flotilla controller");

    // Initialize database
    let db = db::init_db(args.db_path)?;

    // Create application state
    let state = Arc::new(AppState {
        db,
        agent: AgentClient::new()?,
        ids: IdGenerator::new(args.machine_id),
        catalog: ErrorCatalog::build(),
    });

    // Create router
    let app = api::create_router(state);

    // Parse bind address
    let addr: SocketAddr = args.bind.parse()?;
    info!("Listening on http://{}", addr);

    // Start server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
