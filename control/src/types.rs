use serde::{Deserialize, Serialize};

// ============================================================================
// Server Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub id: i64,
    pub name: String,
    pub address: String,
    pub agent_port: u16,
    pub ssh_user: String,
    pub ssh_port: u16,
    pub ssh_key: String,
    pub status: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterServerRequest {
    pub name: String,
    pub address: String,
    pub agent_port: Option<u16>,
    pub ssh_user: Option<String>,
    pub ssh_port: Option<u16>,
    pub ssh_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateServerRequest {
    pub name: Option<String>,
    pub address: Option<String>,
    pub agent_port: Option<u16>,
    pub ssh_user: Option<String>,
    pub ssh_port: Option<u16>,
    pub ssh_key: Option<String>,
}

/// Host facts returned by an agent's `server/info` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInfo {
    pub hostname: String,
    pub cpu_cores: u32,
    pub ram_mb: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerDetail {
    #[serde(flatten)]
    pub server: Server,
    pub agent: Option<AgentInfo>,
}

// ============================================================================
// Application Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub id: i64,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub app_type: String,
    pub content: String,
    pub version: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateApplicationRequest {
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub app_type: Option<String>,
    pub content: String,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateApplicationRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub app_type: Option<String>,
    pub content: Option<String>,
    pub version: Option<String>,
}

// ============================================================================
// Deployment Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    pub id: i64,
    pub deploy_id: u64,
    pub server_id: i64,
    pub application_id: i64,
    pub content: String,
    pub status: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployRequest {
    pub server_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployResponse {
    pub id: i64,
    pub deploy_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportStatusRequest {
    pub deploy_id: u64,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListDeploymentsQuery {
    pub server_id: Option<i64>,
}

/// One row of the deployment list, joined for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentView {
    pub id: i64,
    pub deploy_id: u64,
    pub application_id: i64,
    pub application_name: String,
    pub version: String,
    pub server_id: i64,
    pub server_name: String,
    pub server_address: String,
    pub status: String,
    pub deployed_at: String,
}

/// Deployment row plus whatever joined display columns still resolve.
/// Missing joins surface as None so the caller can skip-and-warn.
#[derive(Debug, Clone)]
pub struct DeploymentJoinRow {
    pub deployment: Deployment,
    pub application_name: Option<String>,
    pub application_version: Option<String>,
    pub server_name: Option<String>,
    pub server_address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployedServerView {
    pub server_id: i64,
    pub server_name: String,
    pub server_address: String,
    pub deploy_id: u64,
    pub status: String,
}

// ============================================================================
// Script Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Script {
    pub id: i64,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub script_type: String,
    pub content: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateScriptRequest {
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub script_type: Option<String>,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateScriptRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub script_type: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteScriptRequest {
    pub script_id: i64,
    pub server_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteScriptResponse {
    pub task_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptResult {
    pub id: i64,
    pub task_id: u64,
    pub script_id: i64,
    pub server_id: i64,
    pub server_address: String,
    pub agent_port: u16,
    pub status: String,
    pub output: String,
    pub error_message: String,
    pub created_at: i64,
}

/// Result report pushed by an agent's reporting loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptResultReport {
    pub task_id: u64,
    pub script_id: i64,
    pub status: String,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub error_message: String,
}

// ============================================================================
// Agent Wire Types (controller -> agent)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDeployRequest {
    pub id: i64,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub app_type: String,
    pub content: String,
    pub version: String,
    pub server_id: i64,
    pub deploy_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentScriptRequest {
    pub id: i64,
    pub name: String,
    pub content: String,
    pub task_id: u64,
}

// ============================================================================
// Health Check
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedResponse {
    pub id: i64,
}
