//! Directory configuration methods.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::configuration::{ConfigChangeCallback, ConfigSource, ConfigurationStatus, Subscription};
use crate::error::Result;
use crate::roots::{RootsState, RootsValidationResult};
use crate::QrLinkApi;

/// Directories output may be written to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllowedDirectories {
    /// Canonical allow-listed roots.
    pub allowed_roots: Vec<PathBuf>,
    /// Every directory the external source has offered.
    pub offered_roots: Vec<String>,
    pub current_directory: PathBuf,
    pub source: ConfigSource,
}

impl QrLinkApi {
    /// Allow-listed roots plus every directory ever offered.
    pub fn list_allowed_directories(&self) -> AllowedDirectories {
        let status = self.state.provider.status();
        AllowedDirectories {
            allowed_roots: self.state.provider.validator().allowed_roots().to_vec(),
            offered_roots: status.offered_roots,
            current_directory: status.current_directory,
            source: status.source,
        }
    }

    /// The active directory with its source and validity.
    pub fn get_qr_directory(&self) -> ConfigurationStatus {
        self.state.provider.status()
    }

    /// Explicitly set the output directory.
    ///
    /// The path goes through the same security validation as a roots
    /// candidate and is recorded with the EXTERNAL_ROOTS source.
    pub async fn set_qr_directory(&self, path: &str) -> Result<ConfigurationStatus> {
        self.state.provider.update_qr_directory(path).await
    }

    /// Drop any external override and fall back to environment, command line or default.
    pub async fn reset_qr_directory(&self) -> ConfigurationStatus {
        self.state.provider.reset_to_default().await
    }

    /// Handle a raw `{ roots, timestamp? }` notification.
    pub async fn roots_changed(&self, notification: &Value) -> RootsValidationResult {
        self.state.roots.handle_roots_changed(notification).await
    }

    pub fn roots_state(&self) -> RootsState {
        self.state.roots.state()
    }

    /// Register a callback for directory changes. Dropping the token unsubscribes.
    pub fn on_configuration_changed(&self, callback: ConfigChangeCallback) -> Subscription {
        self.state.provider.on_configuration_changed(callback)
    }

    /// Path of the persisted configuration file, if persistence is enabled.
    pub fn config_path(&self) -> Option<&PathBuf> {
        self.state.config_path.as_ref()
    }
}
