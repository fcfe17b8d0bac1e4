//! JSON-RPC request handlers, split by domain.

mod artifacts;
mod directory;
mod shared;

use crate::server::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use qrlink_core::QrLinkError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

// ============================================================================
// JSON-RPC types
// ============================================================================

/// JSON-RPC 2.0 request structure.
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    pub id: Option<Value>,
}

/// JSON-RPC 2.0 response structure.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Option<Value>,
}

/// JSON-RPC 2.0 error structure.
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(id: Option<Value>, code: i32, message: String, data: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(JsonRpcError {
                code,
                message,
                data,
            }),
            id,
        }
    }

    /// Error response carrying the machine-readable kind in `data.kind`.
    pub fn from_error(id: Option<Value>, err: &QrLinkError) -> Self {
        let mut data = json!({
            "kind": err.kind(),
            "retryable": err.is_retryable(),
        });
        if let QrLinkError::Security { violations, .. } = err {
            data["violations"] = json!(violations);
        }
        Self::error(id, err.to_rpc_error_code(), err.to_string(), Some(data))
    }
}

/// Standard JSON-RPC code for an unknown method.
const METHOD_NOT_FOUND: i32 = -32601;

// ============================================================================
// HTTP endpoints
// ============================================================================

/// Health check endpoint.
pub async fn handle_health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// Main JSON-RPC handler.
pub async fn handle_rpc(
    State(state): State<Arc<AppState>>,
    Json(request): Json<JsonRpcRequest>,
) -> impl IntoResponse {
    let method = request.method.as_str();
    let params = request.params.unwrap_or(Value::Object(Default::default()));
    let id = request.id;

    debug!("RPC call: {}({:?})", method, params);

    if method == "health_check" {
        return (
            StatusCode::OK,
            Json(JsonRpcResponse::success(id, json!({"status": "ok"}))),
        );
    }

    let Some(result) = dispatch_method(&state, method, &params).await else {
        warn!("Unknown RPC method: {}", method);
        return (
            StatusCode::OK,
            Json(JsonRpcResponse::error(
                id,
                METHOD_NOT_FOUND,
                format!("Method not found: {}", method),
                None,
            )),
        );
    };

    match result {
        Ok(value) => (StatusCode::OK, Json(JsonRpcResponse::success(id, value))),
        Err(e) => {
            warn!("RPC error for {}: {}", method, e);
            (StatusCode::OK, Json(JsonRpcResponse::from_error(id, &e)))
        }
    }
}

// ============================================================================
// Method dispatcher
// ============================================================================

/// Dispatch a method call to the appropriate domain handler.
///
/// Returns `None` for unknown methods.
async fn dispatch_method(
    state: &AppState,
    method: &str,
    params: &Value,
) -> Option<qrlink_core::Result<Value>> {
    let result = match method {
        // Directory configuration
        "list_allowed_directories" => directory::list_allowed_directories(state, params).await,
        "get_qr_directory" => directory::get_qr_directory(state, params).await,
        "set_qr_directory" => directory::set_qr_directory(state, params).await,
        "reset_qr_directory" => directory::reset_qr_directory(state, params).await,
        "roots_changed" => directory::roots_changed(state, params).await,

        // Artifacts
        "generate_qr" => artifacts::generate_qr(state, params).await,
        "validate_qr" => artifacts::validate_qr(state, params).await,
        "compare_qr_configs" => artifacts::compare_qr_configs(state, params).await,
        "get_directory_stats" => artifacts::get_directory_stats(state, params).await,
        "cleanup_qr_directory" => artifacts::cleanup_qr_directory(state, params).await,

        _ => return None,
    };
    Some(result)
}
