use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// Base codes shared by every surface
pub const CODE_SUCCESS: u32 = 0;
pub const ERR_PARAMETER: u32 = 41001;
pub const ERR_SQL: u32 = 50000;
pub const ERR_SQL_NOT_FOUND: u32 = 50001;
pub const ERR_DUPLICATED_KEY: u32 = 50003;

// Compose workloads
pub const ERR_DOCKER_NOT_INSTALLED: u32 = 10001;
pub const ERR_COMPOSE_NOT_FOUND: u32 = 10002;
pub const ERR_COMPOSE_START_FAILED: u32 = 10003;
pub const ERR_COMPOSE_FILE_CREATE_FAILED: u32 = 10004;
pub const ERR_COMPOSE_STOP_FAILED: u32 = 10005;

// Script execution
pub const ERR_SCRIPT_EXECUTION_FAILED: u32 = 90001;
pub const ERR_SCRIPT_ALREADY_RUNNING: u32 = 90002;

/// Uniform wire envelope, same shape the controller speaks.
/// `code == 0` is success; anything else is a domain error code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T = serde_json::Value> {
    pub code: u32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    pub fn ok() -> Self {
        Self {
            code: CODE_SUCCESS,
            message: "success".to_string(),
            data: None,
        }
    }

    pub fn with_data(data: T) -> Self {
        Self {
            code: CODE_SUCCESS,
            message: "success".to_string(),
            data: Some(data),
        }
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Error-code to message catalog, built once at startup.
#[derive(Debug, Clone)]
pub struct ErrorCatalog {
    messages: HashMap<u32, &'static str>,
}

impl ErrorCatalog {
    pub fn build() -> Self {
        let mut m = HashMap::new();

        m.insert(CODE_SUCCESS, "success");
        m.insert(ERR_PARAMETER, "parameter error");
        m.insert(ERR_SQL, "sql error");
        m.insert(ERR_SQL_NOT_FOUND, "sql not found");
        m.insert(ERR_DUPLICATED_KEY, "duplicated key");

        m.insert(ERR_DOCKER_NOT_INSTALLED, "docker is not installed");
        m.insert(ERR_COMPOSE_NOT_FOUND, "docker-compose command not found");
        m.insert(ERR_COMPOSE_START_FAILED, "docker-compose start failed");
        m.insert(ERR_COMPOSE_FILE_CREATE_FAILED, "docker-compose file creation failed");
        m.insert(ERR_COMPOSE_STOP_FAILED, "docker-compose stop failed");

        m.insert(ERR_SCRIPT_EXECUTION_FAILED, "script execution failed");
        m.insert(ERR_SCRIPT_ALREADY_RUNNING, "script is already running");

        Self { messages: m }
    }

    pub fn message(&self, code: u32) -> &'static str {
        self.messages.get(&code).copied().unwrap_or("unknown error")
    }

    /// Error envelope with the catalog message for `code`.
    pub fn error<T>(&self, code: u32) -> Envelope<T> {
        Envelope {
            code,
            message: self.message(code).to_string(),
            data: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_covers_workload_codes() {
        let catalog = ErrorCatalog::build();
        assert_eq!(catalog.message(ERR_DOCKER_NOT_INSTALLED), "docker is not installed");
        assert_eq!(catalog.message(ERR_SCRIPT_ALREADY_RUNNING), "script is already running");
        assert_eq!(catalog.message(12345), "unknown error");
    }

    #[test]
    fn test_error_envelope_has_no_data() {
        let catalog = ErrorCatalog::build();
        let env: Envelope = catalog.error(ERR_COMPOSE_START_FAILED);
        assert_eq!(env.code, ERR_COMPOSE_START_FAILED);
        let json = serde_json::to_string(&env).unwrap();
        assert!(!json.contains("data"));
    }
}
