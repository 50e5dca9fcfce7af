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

// Server registry
pub const ERR_SERVER_NOT_FOUND: u32 = 60001;

// Application registry
pub const ERR_APPLICATION_NOT_FOUND: u32 = 70001;

// Deployment orchestration
pub const ERR_DEPLOYMENT_NOT_FOUND: u32 = 72001;
pub const ERR_ALREADY_DEPLOYED: u32 = 72002;
pub const ERR_DEPLOY_ID_GENERATE_FAILED: u32 = 72004;
pub const ERR_CREATE_DEPLOYMENT_RECORD_FAILED: u32 = 72005;
pub const ERR_AGENT_REQUEST_FAILED: u32 = 72021;
pub const ERR_AGENT_RESPONSE_PARSE_FAILED: u32 = 72022;
pub const ERR_AGENT_DEPLOY_FAILED: u32 = 72023;
pub const ERR_AGENT_DELETE_FAILED: u32 = 72024;
pub const ERR_AGENT_STOP_FAILED: u32 = 72025;
pub const ERR_AGENT_START_FAILED: u32 = 72026;

// Script dispatch
pub const ERR_SCRIPT_NOT_FOUND: u32 = 80001;
pub const ERR_SCRIPT_EXECUTION_FAILED: u32 = 80021;
pub const ERR_EXEC_SERVER_NOT_FOUND: u32 = 80023;
pub const ERR_SCRIPT_RESULT_NOT_FOUND: u32 = 80024;

/// Uniform wire envelope used by every HTTP surface, in both directions.
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

/// Error-code to message catalog. Built once in `main` and handed to the
/// router state; there is no process-global registration.
#[derive(Debug, Clone)]
pub struct ErrorCatalog {
    messages: HashMap<u32, &'static str>,
}

impl ErrorCatalog {
    /// One-time build of the full controller catalog.
    pub fn build() -> Self {
        let mut m = HashMap::new();

        m.insert(CODE_SUCCESS, "success");
        m.insert(ERR_PARAMETER, "parameter error");
        m.insert(ERR_SQL, "sql error");
        m.insert(ERR_SQL_NOT_FOUND, "sql not found");
        m.insert(ERR_DUPLICATED_KEY, "duplicated key");

        m.insert(ERR_SERVER_NOT_FOUND, "server not found");

        m.insert(ERR_APPLICATION_NOT_FOUND, "application not found");

        m.insert(ERR_DEPLOYMENT_NOT_FOUND, "deployment not found");
        m.insert(ERR_ALREADY_DEPLOYED, "application already deployed to this server");
        m.insert(ERR_DEPLOY_ID_GENERATE_FAILED, "failed to generate deploy ID");
        m.insert(ERR_CREATE_DEPLOYMENT_RECORD_FAILED, "failed to create deployment record");
        m.insert(ERR_AGENT_REQUEST_FAILED, "failed to send request to agent");
        m.insert(ERR_AGENT_RESPONSE_PARSE_FAILED, "failed to parse agent response");
        m.insert(ERR_AGENT_DEPLOY_FAILED, "agent deployment failed");
        m.insert(ERR_AGENT_DELETE_FAILED, "agent delete application failed");
        m.insert(ERR_AGENT_STOP_FAILED, "agent stop application failed");
        m.insert(ERR_AGENT_START_FAILED, "agent start application failed");

        m.insert(ERR_SCRIPT_NOT_FOUND, "script not found");
        m.insert(ERR_SCRIPT_EXECUTION_FAILED, "script execution failed");
        m.insert(ERR_EXEC_SERVER_NOT_FOUND, "server not found");
        m.insert(ERR_SCRIPT_RESULT_NOT_FOUND, "script result not found");

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
    fn test_success_envelope_shape() {
        let env = Envelope::with_data(serde_json::json!({"id": 7}));
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["code"], 0);
        assert_eq!(json["message"], "success");
        assert_eq!(json["data"]["id"], 7);
    }

    #[test]
    fn test_empty_data_is_omitted() {
        let env: Envelope = Envelope::ok();
        let json = serde_json::to_string(&env).unwrap();
        assert!(!json.contains("data"));
    }

    #[test]
    fn test_catalog_known_and_unknown_codes() {
        let catalog = ErrorCatalog::build();
        assert_eq!(catalog.message(ERR_ALREADY_DEPLOYED), "application already deployed to this server");
        assert_eq!(catalog.message(99999), "unknown error");

        let env: Envelope = catalog.error(ERR_DEPLOYMENT_NOT_FOUND);
        assert_eq!(env.code, ERR_DEPLOYMENT_NOT_FOUND);
        assert_eq!(env.message, "deployment not found");
        assert!(env.data.is_none());
    }

    #[test]
    fn test_envelope_roundtrip_with_data() {
        let raw = r#"{"code":0,"message":"success","data":[1,2,3]}"#;
        let env: Envelope = serde_json::from_str(raw).unwrap();
        assert_eq!(env.code, 0);
        assert_eq!(env.data.unwrap(), serde_json::json!([1, 2, 3]));
    }
}
