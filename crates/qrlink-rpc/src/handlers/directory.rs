//! Directory configuration handlers.

use super::shared::require_str_param;
use crate::server::AppState;
use qrlink_core::ConfigurationStatus;
use serde_json::{json, Value};

fn status_json(status: &ConfigurationStatus) -> Value {
    json!({
        "currentDirectory": status.current_directory,
        "source": status.source,
        "isValid": status.is_valid,
        "updatedAt": status.last_updated,
        "offeredRoots": status.offered_roots,
    })
}

pub async fn list_allowed_directories(state: &AppState, _params: &Value) -> qrlink_core::Result<Value> {
    Ok(serde_json::to_value(state.api.list_allowed_directories())?)
}

pub async fn get_qr_directory(state: &AppState, _params: &Value) -> qrlink_core::Result<Value> {
    Ok(status_json(&state.api.get_qr_directory()))
}

pub async fn set_qr_directory(state: &AppState, params: &Value) -> qrlink_core::Result<Value> {
    let path = require_str_param(params, "path", "path")?;
    let status = state.api.set_qr_directory(&path).await?;
    Ok(status_json(&status))
}

pub async fn reset_qr_directory(state: &AppState, _params: &Value) -> qrlink_core::Result<Value> {
    let status = state.api.reset_qr_directory().await;
    Ok(status_json(&status))
}

/// Rejections are reported in the result, not as RPC errors.
pub async fn roots_changed(state: &AppState, params: &Value) -> qrlink_core::Result<Value> {
    let result = state.api.roots_changed(params).await;
    Ok(serde_json::to_value(result)?)
}
