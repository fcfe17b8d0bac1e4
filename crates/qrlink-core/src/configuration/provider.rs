//! Resolution of the active QR output directory.
//!
//! Precedence on first resolution, highest first:
//! externally negotiated roots > environment > command line > built-in default.
//! After startup only [`ConfigurationProvider::update_qr_directory`] and
//! [`ConfigurationProvider::reset_to_default`] change the directory.

use super::observer::{ConfigChangeCallback, ObserverRegistry, Subscription};
use super::status::{ConfigSource, ConfigurationStatus, StartupSources};
use crate::error::{QrLinkError, Result};
use crate::security::SecurityValidator;
use crate::storage::{atomic_read_json, atomic_write_json};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Owner of the process-wide [`ConfigurationStatus`].
pub struct ConfigurationProvider {
    validator: SecurityValidator,
    sources: StartupSources,
    persist_path: Option<PathBuf>,
    state: RwLock<ConfigurationStatus>,
    observers: Arc<ObserverRegistry>,
    persist_lock: tokio::sync::Mutex<()>,
}

impl ConfigurationProvider {
    /// Resolve the initial directory.
    ///
    /// # Arguments
    ///
    /// * `validator` - Applied to every candidate from every source
    /// * `sources` - Environment, command-line and default inputs
    /// * `persist_path` - Where the status is persisted; a persisted external
    ///   directory that still validates outranks the environment
    pub fn new(
        validator: SecurityValidator,
        sources: StartupSources,
        persist_path: Option<PathBuf>,
    ) -> Self {
        let persisted = persist_path.as_deref().and_then(|path| {
            match atomic_read_json::<ConfigurationStatus>(path) {
                Ok(status) => status,
                Err(e) => {
                    warn!("Ignoring unreadable persisted configuration: {}", e);
                    None
                }
            }
        });

        let offered_roots = persisted
            .as_ref()
            .map(|s| s.offered_roots.clone())
            .unwrap_or_default();

        let restored = persisted
            .filter(|s| s.source == ConfigSource::ExternalRoots)
            .and_then(|s| {
                let raw = s.current_directory.to_string_lossy().into_owned();
                validator.validate(&raw).sanitized_path
            });

        let mut status = match restored {
            Some(dir) => {
                info!("Restored externally negotiated QR directory {}", dir.display());
                ConfigurationStatus {
                    source: ConfigSource::ExternalRoots,
                    current_directory: dir,
                    offered_roots: Vec::new(),
                    is_valid: true,
                    last_updated: Utc::now(),
                }
            }
            None => resolve_fallback(&validator, &sources),
        };
        status.offered_roots = offered_roots;

        info!(
            "QR directory resolved to {} (source: {})",
            status.current_directory.display(),
            status.source
        );

        Self {
            validator,
            sources,
            persist_path,
            state: RwLock::new(status),
            observers: Arc::new(ObserverRegistry::default()),
            persist_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn validator(&self) -> &SecurityValidator {
        &self.validator
    }

    /// The active output directory.
    pub fn get_qr_directory(&self) -> PathBuf {
        self.status().current_directory
    }

    /// The source of the active output directory.
    pub fn get_configuration_source(&self) -> ConfigSource {
        self.status().source
    }

    /// Snapshot of the full status.
    pub fn status(&self) -> ConfigurationStatus {
        match self.state.read() {
            Ok(state) => state.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Remember directories offered by the external source.
    pub fn record_offered_roots(&self, roots: &[String]) {
        self.mutate(|state| {
            for root in roots {
                if !state.offered_roots.contains(root) {
                    state.offered_roots.push(root.clone());
                }
            }
        });
    }

    /// Switch to an externally negotiated directory.
    ///
    /// The path is re-checked by the security validator. On success every
    /// subscriber is notified synchronously and the new status is persisted.
    pub async fn update_qr_directory(&self, path: &str) -> Result<ConfigurationStatus> {
        let dir = self.validator.validate(path).into_result(path)?;

        let status = self.mutate(|state| {
            state.source = ConfigSource::ExternalRoots;
            state.current_directory = dir.clone();
            state.is_valid = true;
            state.last_updated = Utc::now();
            if !state.offered_roots.iter().any(|r| r == path) {
                state.offered_roots.push(path.to_string());
            }
        });

        info!("QR directory updated to {} (source: {})", dir.display(), status.source);
        self.observers.notify(&status);
        self.persist().await;
        Ok(status)
    }

    /// Drop any external override and re-derive the precedence chain.
    pub async fn reset_to_default(&self) -> ConfigurationStatus {
        let fallback = resolve_fallback(&self.validator, &self.sources);
        let previous_dir = self.get_qr_directory();

        let status = self.mutate(|state| {
            state.source = fallback.source;
            state.current_directory = fallback.current_directory.clone();
            state.is_valid = fallback.is_valid;
            state.last_updated = fallback.last_updated;
        });

        info!(
            "QR directory reset to {} (source: {})",
            status.current_directory.display(),
            status.source
        );
        if previous_dir != status.current_directory {
            self.observers.notify(&status);
        }
        self.persist().await;
        status
    }

    /// Register a change callback. Dropping the returned token unsubscribes.
    pub fn on_configuration_changed(&self, callback: ConfigChangeCallback) -> Subscription {
        self.observers.subscribe(callback)
    }

    pub fn subscriber_count(&self) -> usize {
        self.observers.len()
    }

    fn mutate(&self, f: impl FnOnce(&mut ConfigurationStatus)) -> ConfigurationStatus {
        let mut state = match self.state.write() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut state);
        state.clone()
    }

    /// Persist the latest status. Failures are logged, not propagated.
    async fn persist(&self) {
        let Some(path) = self.persist_path.clone() else {
            return;
        };
        let _guard = self.persist_lock.lock().await;
        let snapshot = self.status();

        let written = tokio::task::spawn_blocking(move || atomic_write_json(&path, &snapshot))
            .await
            .map_err(|e| QrLinkError::Other(format!("Persistence task failed: {}", e)))
            .and_then(|r| r);

        match written {
            Ok(()) => debug!("Persisted configuration status"),
            Err(e) => warn!("Failed to persist configuration status: {}", e),
        }
    }
}

/// Environment > command line > default, skipping candidates that fail validation.
fn resolve_fallback(validator: &SecurityValidator, sources: &StartupSources) -> ConfigurationStatus {
    let candidates = [
        (ConfigSource::Environment, sources.environment.as_deref()),
        (ConfigSource::CommandLine, sources.command_line.as_deref()),
    ];

    for (source, candidate) in candidates {
        let Some(raw) = candidate else { continue };
        let report = validator.validate(raw);
        match report.sanitized_path {
            Some(dir) => {
                return ConfigurationStatus {
                    source,
                    current_directory: dir,
                    offered_roots: Vec::new(),
                    is_valid: true,
                    last_updated: Utc::now(),
                };
            }
            None => warn!(
                "Ignoring {} QR directory {}: {}",
                source,
                raw,
                report.violation_messages().join("; ")
            ),
        }
    }

    let default_raw = sources.default_dir.to_string_lossy().into_owned();
    let report = validator.validate(&default_raw);
    let is_valid = report.is_secure;
    ConfigurationStatus {
        source: ConfigSource::Default,
        current_directory: report
            .sanitized_path
            .unwrap_or_else(|| sources.default_dir.clone()),
        offered_roots: Vec::new(),
        is_valid,
        last_updated: Utc::now(),
    }
}
