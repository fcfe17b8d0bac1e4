//! Error types for qrlink.
//!
//! Every error carries a machine-readable [`ErrorKind`] plus a human-readable
//! message. Kinds are grouped into classes that drive the propagation policy:
//! transient remote failures are retried, validation and security failures
//! are surfaced immediately.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Machine-readable error classification exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    DirectoryError,
    PermissionError,
    FileError,
    GenerationError,
    SecurityError,
    NetworkError,
    Timeout,
    RateLimit,
    GatewayError,
    InvalidAddress,
    EntityNotFound,
    InvalidAmount,
    InsufficientBalance,
    ConfigError,
    InvalidParams,
    #[serde(rename = "INTERNAL_ERROR")]
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::DirectoryError => "DIRECTORY_ERROR",
            ErrorKind::PermissionError => "PERMISSION_ERROR",
            ErrorKind::FileError => "FILE_ERROR",
            ErrorKind::GenerationError => "GENERATION_ERROR",
            ErrorKind::SecurityError => "SECURITY_ERROR",
            ErrorKind::NetworkError => "NETWORK_ERROR",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::RateLimit => "RATE_LIMIT",
            ErrorKind::GatewayError => "GATEWAY_ERROR",
            ErrorKind::InvalidAddress => "INVALID_ADDRESS",
            ErrorKind::EntityNotFound => "ENTITY_NOT_FOUND",
            ErrorKind::InvalidAmount => "INVALID_AMOUNT",
            ErrorKind::InsufficientBalance => "INSUFFICIENT_BALANCE",
            ErrorKind::ConfigError => "CONFIG_ERROR",
            ErrorKind::InvalidParams => "INVALID_PARAMS",
            ErrorKind::Internal => "INTERNAL_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for the qrlink library.
#[derive(Debug, Error)]
pub enum QrLinkError {
    // Filesystem errors
    #[error("Directory error at {path:?}: {message}")]
    Directory { path: PathBuf, message: String },

    #[error("Directory is not writable: {0}")]
    PermissionDenied(PathBuf),

    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Generation errors
    #[error("QR generation failed: {message}")]
    Generation { message: String },

    // Security errors
    #[error("Path rejected: {}", .violations.join("; "))]
    Security {
        path: String,
        violations: Vec<String>,
    },

    // Remote call errors (transient)
    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Request timeout after {0:?}")]
    Timeout(Duration),

    #[error("Rate limited by {service}, retry after {retry_after_secs:?} seconds")]
    RateLimited {
        service: String,
        retry_after_secs: Option<u64>,
    },

    #[error("Gateway error ({status}): {message}")]
    Gateway { status: u16, message: String },

    // Remote call errors (validation)
    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Entity not found: {entity}")]
    EntityNotFound { entity: String },

    #[error("Invalid amount: {message}")]
    InvalidAmount { message: String },

    // Business rule failures
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: String, available: String },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid parameters: {message}")]
    InvalidParams { message: String },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for qrlink operations.
pub type Result<T> = std::result::Result<T, QrLinkError>;

impl From<std::io::Error> for QrLinkError {
    fn from(err: std::io::Error) -> Self {
        QrLinkError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for QrLinkError {
    fn from(err: serde_json::Error) -> Self {
        QrLinkError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl QrLinkError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        QrLinkError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Create a generation error.
    pub fn generation(message: impl Into<String>) -> Self {
        QrLinkError::Generation {
            message: message.into(),
        }
    }

    /// Machine-readable classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            QrLinkError::Directory { .. } => ErrorKind::DirectoryError,
            QrLinkError::PermissionDenied(_) => ErrorKind::PermissionError,
            QrLinkError::Io { .. } => ErrorKind::FileError,
            QrLinkError::Generation { .. } => ErrorKind::GenerationError,
            QrLinkError::Security { .. } => ErrorKind::SecurityError,
            QrLinkError::Network { .. } => ErrorKind::NetworkError,
            QrLinkError::Timeout(_) => ErrorKind::Timeout,
            QrLinkError::RateLimited { .. } => ErrorKind::RateLimit,
            QrLinkError::Gateway { .. } => ErrorKind::GatewayError,
            QrLinkError::InvalidAddress { .. } => ErrorKind::InvalidAddress,
            QrLinkError::EntityNotFound { .. } => ErrorKind::EntityNotFound,
            QrLinkError::InvalidAmount { .. } => ErrorKind::InvalidAmount,
            QrLinkError::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            QrLinkError::Json { .. } | QrLinkError::Config { .. } => ErrorKind::ConfigError,
            QrLinkError::InvalidParams { .. } => ErrorKind::InvalidParams,
            QrLinkError::Other(_) => ErrorKind::Internal,
        }
    }

    /// Convert to a JSON-RPC error code.
    ///
    /// Custom error codes (application-defined, -32000 to -32099):
    /// - -32000: Transient remote failure
    /// - -32001: Security rejection
    /// - -32002: Filesystem error
    /// - -32003: Generation error
    /// - -32005: Validation error
    /// - -32006: Business rule failure
    pub fn to_rpc_error_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::NetworkError
            | ErrorKind::Timeout
            | ErrorKind::RateLimit
            | ErrorKind::GatewayError => -32000,

            ErrorKind::SecurityError => -32001,

            ErrorKind::DirectoryError | ErrorKind::PermissionError | ErrorKind::FileError => {
                -32002
            }

            ErrorKind::GenerationError => -32003,

            ErrorKind::InvalidAddress | ErrorKind::EntityNotFound | ErrorKind::InvalidAmount => {
                -32005
            }

            ErrorKind::InvalidParams => -32602,

            ErrorKind::InsufficientBalance => -32006,

            ErrorKind::ConfigError | ErrorKind::Internal => -32603,
        }
    }

    /// Check if this error should trigger a retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::NetworkError | ErrorKind::Timeout | ErrorKind::RateLimit | ErrorKind::GatewayError
        )
    }
}
