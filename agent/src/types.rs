use serde::{Deserialize, Serialize};

// ============================================================================
// Workloads
// ============================================================================

/// Deployment push from the controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployRequest {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default)]
    pub app_type: String,
    pub content: String,
    #[serde(default)]
    pub version: String,
    pub server_id: i64,
    pub deploy_id: u64,
}

/// Locally tracked compose workload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workload {
    pub id: i64,
    pub deploy_id: u64,
    pub application_id: i64,
    pub name: String,
    pub content: String,
    pub status: String,
    pub created_at: i64,
}

/// Status push to the controller after reconciliation persisted a change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub deploy_id: u64,
    pub status: String,
}

// ============================================================================
// Script Tasks
// ============================================================================

/// Execution request from the controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptExecuteRequest {
    pub id: i64,
    pub name: String,
    pub content: String,
    pub task_id: u64,
}

/// Locally tracked script run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptTask {
    pub id: i64,
    pub task_id: u64,
    pub script_id: i64,
    pub name: String,
    pub content: String,
    pub status: String,
    pub output: String,
    pub error_message: String,
    pub reported: bool,
    pub created_at: i64,
    pub executed_at: Option<i64>,
}

/// Result push to the controller's receive endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptResultReport {
    pub task_id: u64,
    pub script_id: i64,
    pub status: String,
    pub output: String,
    pub error_message: String,
}

// ============================================================================
// Host Facts
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub hostname: String,
    pub cpu_cores: u32,
    pub ram_mb: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}
