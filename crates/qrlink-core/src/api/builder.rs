//! Builder for configuring QrLinkApi initialization.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::api::state::ApiState;
use crate::artifact::{ArtifactManagerOptions, LocalArtifactManager};
use crate::config::{AppConfig, PathsConfig, RootsConfig};
use crate::configuration::{ConfigurationProvider, StartupSources};
use crate::error::{QrLinkError, Result};
use crate::qr::{PngQrEncoder, QrEncoder};
use crate::roots::RootsManager;
use crate::security::{default_allowed_roots, SecurityValidator};
use crate::storage::{FilenameGenerator, RetentionPolicy};
use crate::QrLinkApi;

/// Where the ENVIRONMENT precedence input comes from.
#[derive(Debug, Clone)]
enum EnvironmentInput {
    Variable(String),
    Value(Option<String>),
}

/// Builder for configuring QrLinkApi initialization.
///
/// # Example
///
/// ```rust,ignore
/// use qrlink_core::QrLinkApi;
///
/// let api = QrLinkApi::builder()
///     .with_command_line_dir(Some("./qrimages".into()))
///     .with_config_dir(QrLinkApiBuilder::default_config_dir())
///     .build()
///     .await?;
/// ```
pub struct QrLinkApiBuilder {
    command_line_dir: Option<String>,
    environment: EnvironmentInput,
    config_dir: Option<PathBuf>,
    base_dir: Option<PathBuf>,
    default_dir: Option<PathBuf>,
    allowed_roots: Vec<PathBuf>,
    include_default_roots: bool,
    retention: RetentionPolicy,
    naming: FilenameGenerator,
    background_cleanup: bool,
    encoder: Option<Arc<dyn QrEncoder>>,
    roots_min_interval: Duration,
    check_writable: bool,
}

impl Default for QrLinkApiBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl QrLinkApiBuilder {
    pub fn new() -> Self {
        Self {
            command_line_dir: None,
            environment: EnvironmentInput::Variable(AppConfig::QR_DIR_ENV_VAR.to_string()),
            config_dir: None,
            base_dir: None,
            default_dir: None,
            allowed_roots: Vec::new(),
            include_default_roots: true,
            retention: RetentionPolicy::default(),
            naming: FilenameGenerator::default(),
            background_cleanup: true,
            encoder: None,
            roots_min_interval: RootsConfig::MIN_INTERVAL,
            check_writable: true,
        }
    }

    /// `<platform config dir>/qrlink`, falling back to the temp directory.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(PathsConfig::CONFIG_DIR_NAME)
    }

    /// The COMMAND_LINE precedence input.
    pub fn with_command_line_dir(mut self, dir: Option<String>) -> Self {
        self.command_line_dir = dir;
        self
    }

    /// Read the ENVIRONMENT input from `var` at build time.
    ///
    /// Default: `QRLINK_QR_DIR`
    pub fn with_environment_var(mut self, var: impl Into<String>) -> Self {
        self.environment = EnvironmentInput::Variable(var.into());
        self
    }

    /// Supply the ENVIRONMENT input directly instead of reading a variable.
    pub fn with_environment(mut self, value: Option<String>) -> Self {
        self.environment = EnvironmentInput::Value(value);
        self
    }

    /// Persist the configuration status to `<dir>/qr-config.json`.
    ///
    /// Default: not persisted
    pub fn with_config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_dir = Some(dir.into());
        self
    }

    /// Directory relative paths are resolved against.
    ///
    /// Default: the process working directory
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// The DEFAULT precedence input.
    ///
    /// Default: `<base dir>/qrimages`
    pub fn with_default_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.default_dir = Some(dir.into());
        self
    }

    /// Add a directory under which output may live.
    pub fn with_allowed_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.allowed_roots.push(root.into());
        self
    }

    pub fn with_allowed_roots(mut self, roots: impl IntoIterator<Item = PathBuf>) -> Self {
        self.allowed_roots.extend(roots);
        self
    }

    /// Include the home, temp and base directories in the allow-list.
    ///
    /// Default: `true`
    pub fn with_default_roots(mut self, enable: bool) -> Self {
        self.include_default_roots = enable;
        self
    }

    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_naming(mut self, naming: FilenameGenerator) -> Self {
        self.naming = naming;
        self
    }

    /// Run retention in the background after each new artifact.
    ///
    /// Default: `true`
    pub fn with_background_cleanup(mut self, enable: bool) -> Self {
        self.background_cleanup = enable;
        self
    }

    /// Replace the PNG encoder.
    pub fn with_encoder(mut self, encoder: Arc<dyn QrEncoder>) -> Self {
        self.encoder = Some(encoder);
        self
    }

    /// Minimum spacing between processed roots notifications.
    ///
    /// Default: 1 second
    pub fn with_roots_min_interval(mut self, interval: Duration) -> Self {
        self.roots_min_interval = interval;
        self
    }

    /// Create and probe roots candidates before accepting them.
    ///
    /// Default: `true`
    pub fn with_writability_check(mut self, enable: bool) -> Self {
        self.check_writable = enable;
        self
    }

    /// Build the QrLinkApi instance.
    pub async fn build(self) -> Result<QrLinkApi> {
        let base_dir = match self.base_dir {
            Some(dir) => dir,
            None => std::env::current_dir().map_err(|e| QrLinkError::Config {
                message: format!("Cannot determine working directory: {}", e),
            })?,
        };

        let mut roots = self.allowed_roots;
        if self.include_default_roots {
            roots.extend(default_allowed_roots(&base_dir));
        }
        let validator = SecurityValidator::new(roots, base_dir.clone());
        if validator.allowed_roots().is_empty() {
            return Err(QrLinkError::Config {
                message: "No allowed root directory could be resolved".to_string(),
            });
        }

        let environment = match self.environment {
            EnvironmentInput::Variable(var) => std::env::var(var).ok(),
            EnvironmentInput::Value(value) => value,
        };
        let default_dir = self
            .default_dir
            .unwrap_or_else(|| base_dir.join(PathsConfig::DEFAULT_QR_DIR));
        let sources = StartupSources::new(default_dir)
            .with_environment(environment)
            .with_command_line(self.command_line_dir);

        let config_path = match self.config_dir {
            Some(dir) => {
                if dir.is_file() {
                    return Err(QrLinkError::Config {
                        message: format!("Config directory is a file: {}", dir.display()),
                    });
                }
                Some(dir.join(PathsConfig::CONFIG_FILENAME))
            }
            None => None,
        };

        let provider = Arc::new(ConfigurationProvider::new(
            validator,
            sources,
            config_path.clone(),
        ));

        let roots = RootsManager::new(provider.clone())
            .with_min_interval(self.roots_min_interval)
            .with_writability_check(self.check_writable);

        let encoder = self
            .encoder
            .unwrap_or_else(|| Arc::new(PngQrEncoder));
        let artifacts = LocalArtifactManager::new(
            provider.clone(),
            encoder,
            ArtifactManagerOptions {
                retention: self.retention,
                naming: self.naming,
                background_cleanup: self.background_cleanup,
            },
        );

        tracing::info!(
            "QrLink API ready: directory {} (source: {})",
            provider.get_qr_directory().display(),
            provider.get_configuration_source()
        );

        Ok(QrLinkApi {
            state: Arc::new(ApiState {
                provider,
                roots,
                artifacts,
                config_path,
            }),
        })
    }
}
