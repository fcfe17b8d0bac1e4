//! Shared handler utilities used across RPC domains.

use qrlink_core::{QrLinkError, Result};
use serde_json::Value;
use std::str::FromStr;

/// Extract an optional string parameter, supporting both snake_case and camelCase.
pub(crate) fn get_str_param<'a>(params: &'a Value, snake: &str, camel: &str) -> Option<&'a str> {
    params
        .get(snake)
        .or_else(|| params.get(camel))
        .and_then(|v| v.as_str())
}

/// Extract a required string parameter or return an error.
pub(crate) fn require_str_param(params: &Value, snake: &str, camel: &str) -> Result<String> {
    get_str_param(params, snake, camel)
        .map(String::from)
        .ok_or_else(|| QrLinkError::InvalidParams {
            message: format!("Missing required parameter: {}", snake),
        })
}

/// Extract an optional u32 parameter. Present but out of range is an error.
pub(crate) fn get_u32_param(params: &Value, snake: &str, camel: &str) -> Result<Option<u32>> {
    let Some(value) = params.get(snake).or_else(|| params.get(camel)) else {
        return Ok(None);
    };
    if value.is_null() {
        return Ok(None);
    }
    value
        .as_u64()
        .and_then(|v| u32::try_from(v).ok())
        .map(Some)
        .ok_or_else(|| QrLinkError::InvalidParams {
            message: format!("Parameter {} must be a non-negative integer", snake),
        })
}

/// Parse an optional string parameter through `FromStr`.
pub(crate) fn parse_param<T>(params: &Value, snake: &str, camel: &str) -> Result<Option<T>>
where
    T: FromStr<Err = String>,
{
    get_str_param(params, snake, camel)
        .map(|raw| {
            raw.parse::<T>().map_err(|message| QrLinkError::InvalidParams {
                message: format!("Invalid {}: {}", snake, message),
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use qrlink_core::{ErrorCorrectionLevel, ErrorKind};
    use serde_json::json;

    #[test]
    fn test_accepts_both_casings() {
        let params = json!({"output_dir": "/a", "outputDir": "/b", "targetSize": 300});
        assert_eq!(get_str_param(&params, "output_dir", "outputDir"), Some("/a"));
        assert_eq!(get_u32_param(&params, "target_size", "targetSize").unwrap(), Some(300));
        assert!(require_str_param(&params, "payload", "payload").is_err());
    }

    #[test]
    fn test_rejects_bad_values() {
        let params = json!({"size": -1, "quality": "ultra"});
        let err = get_u32_param(&params, "size", "size").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParams);

        let err = parse_param::<ErrorCorrectionLevel>(&params, "quality", "quality").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParams);

        let ok = parse_param::<ErrorCorrectionLevel>(&json!({"quality": "high"}), "quality", "quality");
        assert_eq!(ok.unwrap(), Some(ErrorCorrectionLevel::H));
    }
}
