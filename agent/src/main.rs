mod api;
mod compose;
mod control_client;
mod db;
mod envelope;
mod reconcile;
mod reporter;
mod services;
mod types;

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use api::AppState;
use compose::ComposeRunner;
use control_client::ControlClient;
use envelope::ErrorCatalog;

#[derive(Parser, Debug)]
#[command(name = "flotilla-agent")]
#[command(about = "Flotilla host agent", long_about = None)]
struct Args {
    /// Address to bind the API server to
    #[arg(long, default_value = "0.0.0.0:10750")]
    bind: String,

    /// Control plane URL
    #[arg(
        long,
        env = "FLOTILLA_CONTROL_PLANE",
        default_value = "http://127.0.0.1:8080"
    )]
    control_plane: String,

    /// Path to the SQLite database (defaults to the user data directory)
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Directory compose files are materialized into
    #[arg(long)]
    compose_dir: Option<PathBuf>,

    /// Directory scripts are staged in before execution
    #[arg(long)]
    script_dir: Option<PathBuf>,

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

    info!("Starting Flotilla Agent");

    // Initialize database
    let db = db::init_db(args.db_path.clone()).context("Failed to initialize database")?;

    let compose_dir = match args.compose_dir {
        Some(dir) => dir,
        None => default_compose_dir()?,
    };
    let compose =
        ComposeRunner::new(compose_dir).context("Failed to prepare compose directory")?;

    let script_dir = args.script_dir.unwrap_or_else(std::env::temp_dir);
    std::fs::create_dir_all(&script_dir).context("Failed to prepare script directory")?;

    // Create control plane client
    let control = ControlClient::new(args.control_plane.clone())
        .context("Failed to create control plane client")?;
    info!("Reporting to control plane at {}", args.control_plane);

    // Spawn reconcile loop
    let reconcile_db = db.clone();
    let reconcile_control = control.clone();
    tokio::spawn(async move {
        if let Err(e) = reconcile::reconcile_loop(reconcile_db, reconcile_control).await {
            error!("Reconcile loop failed: {}", e);
        }
    });

    // Spawn script result loop
    let report_db = db.clone();
    let report_control = control.clone();
    tokio::spawn(async move {
        if let Err(e) = reporter::report_loop(report_db, report_control).await {
            error!("Script result loop failed: {}", e);
        }
    });

    // Create shared state
    let state = Arc::new(AppState {
        db,
        compose,
        catalog: ErrorCatalog::build(),
        script_dir,
    });

    // Build the router
    let app = api::create_router(state);

    // Start the server
    let addr: SocketAddr = args.bind.parse().context("Invalid bind address")?;
    info!("Agent API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind API server")?;

    axum::serve(listener, app)
        .await
        .context("API server failed")?;

    Ok(())
}

fn default_compose_dir() -> Result<PathBuf> {
    let mut path = dirs::data_local_dir().context("Cannot determine data directory")?;
    path.push("flotilla");
    path.push("compose");
    Ok(path)
}
