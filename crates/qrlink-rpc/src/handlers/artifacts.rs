//! Artifact generation and QR scoring handlers.

use super::shared::{get_str_param, get_u32_param, parse_param, require_str_param};
use crate::server::AppState;
use qrlink_core::{
    ArtifactRequest, ErrorCorrectionLevel, QrHybridConfig, QrLinkError, ViewingContext,
};
use serde_json::Value;

pub async fn generate_qr(state: &AppState, params: &Value) -> qrlink_core::Result<Value> {
    let request = ArtifactRequest {
        payload: require_str_param(params, "payload", "payload")?,
        size: get_u32_param(params, "size", "size")?,
        quality: parse_param::<ErrorCorrectionLevel>(params, "quality", "quality")?,
        context: parse_param::<ViewingContext>(params, "context", "context")?,
        output_dir: get_str_param(params, "output_dir", "outputDir").map(String::from),
    };
    let response = state.api.generate_qr(&request).await?;
    Ok(serde_json::to_value(response)?)
}

pub async fn validate_qr(state: &AppState, params: &Value) -> qrlink_core::Result<Value> {
    let payload = require_str_param(params, "payload", "payload")?;
    let context = parse_param::<ViewingContext>(params, "context", "context")?;
    let quality = parse_param::<ErrorCorrectionLevel>(params, "quality", "quality")?;
    let report = state.api.validate_qr(&payload, context, quality)?;
    Ok(serde_json::to_value(report)?)
}

/// Candidates are `{ level, margin?, darkColor?, lightColor? }`; omitted
/// fields take the context defaults.
pub async fn compare_qr_configs(state: &AppState, params: &Value) -> qrlink_core::Result<Value> {
    let payload = require_str_param(params, "payload", "payload")?;
    let context = parse_param::<ViewingContext>(params, "context", "context")?;

    let candidates = match params.get("candidates") {
        None | Some(Value::Null) => None,
        Some(Value::Array(items)) => Some(
            items
                .iter()
                .map(|item| parse_candidate(item, context.unwrap_or_default()))
                .collect::<qrlink_core::Result<Vec<_>>>()?,
        ),
        Some(_) => {
            return Err(QrLinkError::InvalidParams {
                message: "candidates must be an array".to_string(),
            })
        }
    };

    let comparison = state.api.compare_qr_configs(&payload, candidates, context)?;
    Ok(serde_json::to_value(comparison)?)
}

pub async fn get_directory_stats(state: &AppState, _params: &Value) -> qrlink_core::Result<Value> {
    let stats = state.api.get_directory_stats().await?;
    Ok(serde_json::to_value(stats)?)
}

pub async fn cleanup_qr_directory(state: &AppState, _params: &Value) -> qrlink_core::Result<Value> {
    let result = state.api.cleanup_qr_directory().await?;
    Ok(serde_json::to_value(result)?)
}

fn parse_candidate(item: &Value, context: ViewingContext) -> qrlink_core::Result<QrHybridConfig> {
    let level = parse_param::<ErrorCorrectionLevel>(item, "level", "level")?.ok_or_else(|| {
        QrLinkError::InvalidParams {
            message: "each candidate needs a level".to_string(),
        }
    })?;
    let mut config = QrHybridConfig::for_context(context, level);
    if let Some(margin) = get_u32_param(item, "margin", "margin")? {
        config = config.with_margin(margin);
    }
    let dark = get_str_param(item, "dark_color", "darkColor");
    let light = get_str_param(item, "light_color", "lightColor");
    if dark.is_some() || light.is_some() {
        let dark = dark.unwrap_or(config.dark_color.as_str()).to_string();
        let light = light.unwrap_or(config.light_color.as_str()).to_string();
        config = config.with_colors(dark, light);
    }
    Ok(config)
}
