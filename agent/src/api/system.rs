use crate::envelope::Envelope;
use crate::types::{HealthResponse, ServerInfo};

/// GET /health - Health check
pub async fn health() -> Envelope<HealthResponse> {
    Envelope::with_data(HealthResponse {
        status: "ok".to_string(),
    })
}

/// GET /api/v1/server/info - Host facts for the control plane
pub async fn server_info() -> Envelope<ServerInfo> {
    Envelope::with_data(collect_server_info())
}

fn collect_server_info() -> ServerInfo {
    let hostname = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    ServerInfo {
        hostname,
        cpu_cores: num_cpus::get() as u32,
        ram_mb: get_total_memory_mb(),
    }
}

/// Get total system memory in MB (best effort)
fn get_total_memory_mb() -> u64 {
    use sysinfo::System;

    let mut sys = System::new_all();
    sys.refresh_memory();
    sys.total_memory() / 1024 / 1024 // Convert bytes to MB
}
