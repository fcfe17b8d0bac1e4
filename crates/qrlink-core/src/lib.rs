//! QrLink Core - Headless library for issuing wallet deep-link QR artifacts.
//!
//! This crate negotiates a secure output directory (from externally offered
//! roots, the environment, the command line or a built-in default), chooses
//! QR parameters for each payload, and writes content-addressed PNG artifacts
//! into that directory. It can be used programmatically without any RPC layer.
//!
//! # Example
//!
//! ```rust,ignore
//! use qrlink_core::{ArtifactRequest, QrLinkApi};
//!
//! #[tokio::main]
//! async fn main() -> qrlink_core::Result<()> {
//!     let api = QrLinkApi::new().await?;
//!
//!     let artifact = api
//!         .generate_qr(&ArtifactRequest::new("radixwallet://transaction?id=42"))
//!         .await?;
//!     println!("Wrote {}", artifact.file_path.display());
//!
//!     Ok(())
//! }
//! ```

pub mod artifact;
pub mod config;
pub mod configuration;
pub mod error;
pub mod lookup;
pub mod qr;
pub mod roots;
pub mod security;
pub mod storage;

mod api;

// Re-export commonly used types
pub use api::{AllowedDirectories, QrLinkApiBuilder, QrValidationReport};
pub use artifact::{
    ArtifactManagerOptions, ArtifactMetadata, ArtifactRequest, ArtifactResponse,
    GenerationTimings, LocalArtifactManager,
};
pub use configuration::{
    ConfigChangeCallback, ConfigSource, ConfigurationProvider, ConfigurationStatus,
    StartupSources, Subscription,
};
pub use error::{ErrorKind, QrLinkError, Result};
pub use lookup::{
    Amount, BalanceInfo, BalanceLookup, LedgerAddress, LedgerSource, LookupCache, RetryConfig,
    VersionedValue,
};
pub use qr::{
    ErrorCorrectionLevel, OptimalQrConfig, PngQrEncoder, QrComparison, QrEncoder,
    QrHybridConfig, QrValidationResult, ViewingContext,
};
pub use roots::{RootsErrorReason, RootsManager, RootsNotification, RootsState, RootsValidationResult};
pub use security::{SecurityReport, SecurityValidator, SecurityViolation};
pub use storage::{CleanupResult, DirectoryInfo, DirectoryStats, RetentionPolicy};

use std::sync::Arc;

use api::ApiState;

/// Main API struct for QrLink operations.
///
/// Owns one configuration provider, the roots manager that renegotiates it,
/// and the artifact manager that follows it. Cloning is cheap; clones share
/// the same state.
#[derive(Clone)]
pub struct QrLinkApi {
    state: Arc<ApiState>,
}

impl QrLinkApi {
    /// Create a builder for QrLinkApi.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let api = QrLinkApi::builder()
    ///     .with_allowed_root("/srv/qr")
    ///     .with_command_line_dir(Some("/srv/qr/out".into()))
    ///     .build()
    ///     .await?;
    /// ```
    pub fn builder() -> QrLinkApiBuilder {
        QrLinkApiBuilder::new()
    }

    /// Create an instance with default roots, no persistence and the
    /// `QRLINK_QR_DIR` environment input.
    pub async fn new() -> Result<Self> {
        Self::builder().build().await
    }

    /// The shared configuration provider.
    pub fn configuration(&self) -> &Arc<ConfigurationProvider> {
        &self.state.provider
    }
}
