//! Centralized configuration for qrlink.
//!
//! This module provides configuration constants for directory negotiation,
//! artifact retention, remote-call retries and lookup caching.

use std::time::Duration;

/// Application-level configuration.
pub struct AppConfig;

impl AppConfig {
    pub const APP_NAME: &'static str = "qrlink";
    /// Environment variable carrying the ENVIRONMENT precedence input.
    pub const QR_DIR_ENV_VAR: &'static str = "QRLINK_QR_DIR";
}

/// Shared directory and path configurations.
pub struct PathsConfig;

impl PathsConfig {
    pub const CONFIG_DIR_NAME: &'static str = "qrlink";
    pub const CONFIG_FILENAME: &'static str = "qr-config.json";
    /// Built-in default, relative to the process working directory.
    pub const DEFAULT_QR_DIR: &'static str = "qrimages";
    pub const MAX_PATH_LENGTH: usize = 4096;
    pub const PROBE_FILE_PREFIX: &'static str = ".qrlink-probe";
    pub const TEMP_SUFFIX: &'static str = ".tmp";
}

/// Directory negotiation (roots) configuration.
pub struct RootsConfig;

impl RootsConfig {
    /// Minimum spacing between two processed roots notifications.
    pub const MIN_INTERVAL: Duration = Duration::from_millis(1000);
    pub const MAX_CANDIDATES: usize = 32;
}

/// Artifact retention defaults.
pub struct RetentionConfig;

impl RetentionConfig {
    pub const MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);
    pub const MAX_TOTAL_BYTES: u64 = 100 * 1024 * 1024; // 100MB
}

/// Artifact naming and generation defaults.
pub struct ArtifactConfig;

impl ArtifactConfig {
    pub const FILENAME_PREFIX: &'static str = "qr";
    pub const EXTENSION: &'static str = "png";
    /// Hex characters kept from the payload digest.
    pub const HASH_LENGTH: usize = 16;
    pub const MAX_PAYLOAD_LENGTH: usize = 4096;
    pub const MIN_TARGET_SIZE: u32 = 64;
    pub const MAX_TARGET_SIZE: u32 = 4096;
    pub const DEFAULT_TARGET_SIZE: u32 = 512;
    pub const DARK_COLOR: &'static str = "#000000";
    pub const LIGHT_COLOR: &'static str = "#FFFFFF";
}

/// Scoring thresholds for QR validation.
pub struct ValidationConfig;

impl ValidationConfig {
    pub const CONTENT_WEIGHT: f64 = 0.30;
    pub const GENERATION_WEIGHT: f64 = 0.40;
    pub const CONTEXT_WEIGHT: f64 = 0.30;
    pub const MIN_VALID_SCORE: f64 = 60.0;
    /// Capacity utilization (percent) above which a warning is raised.
    pub const HIGH_UTILIZATION: f64 = 85.0;
    /// Payloads at or below this many characters never get a fallback config.
    pub const TRIVIAL_PAYLOAD_LENGTH: usize = 50;
    pub const MAX_ALTERNATIVES: usize = 3;
}

/// Retry defaults for remote lookups.
pub struct RetryDefaults;

impl RetryDefaults {
    pub const MAX_ATTEMPTS: u32 = 3;
    pub const BASE_DELAY: Duration = Duration::from_secs(1);
    pub const MAX_DELAY: Duration = Duration::from_secs(8);
}

/// Lookup cache defaults.
pub struct CacheDefaults;

impl CacheDefaults {
    pub const TTL: Duration = Duration::from_secs(15);
    pub const MAX_ENTRIES: usize = 1000;
    pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);
}
