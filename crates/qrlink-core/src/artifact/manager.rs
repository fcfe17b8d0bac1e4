//! Request-level orchestration of artifact generation.
//!
//! Pipeline: validate payload, resolve directory, ensure directory, compute
//! name and hash, choose and score parameters, reuse a matching artifact or
//! generate a new one, then trigger background retention. Concurrent
//! requests share no lock; the atomic write and content-addressed names make
//! duplicate work harmless.

use crate::artifact::dedup::find_reusable;
use crate::artifact::generator::LocalArtifactGenerator;
use crate::config::ArtifactConfig;
use crate::configuration::{ConfigSource, ConfigurationProvider, Subscription};
use crate::error::{QrLinkError, Result};
use crate::qr::{
    ErrorCorrectionLevel, OptimalQrConfig, QrEncoder, QrHybridConfig, QrHybridConfigManager,
    QrValidationEngine, QrValidationResult, ViewingContext,
};
use crate::storage::{
    hash_payload, CleanupResult, DirectoryConfig, DirectoryManager, DirectoryStats,
    FilenameGenerator, RetentionPolicy,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tracing::{debug, info, warn};

/// One generation request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactRequest {
    pub payload: String,
    /// Target image side in pixels.
    #[serde(default)]
    pub size: Option<u32>,
    /// Preferred error-correction level.
    #[serde(default)]
    pub quality: Option<ErrorCorrectionLevel>,
    #[serde(default)]
    pub context: Option<ViewingContext>,
    /// Write here instead of the configured directory.
    #[serde(default)]
    pub output_dir: Option<String>,
}

impl ArtifactRequest {
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            ..Default::default()
        }
    }
}

/// Per-phase wall time in milliseconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationTimings {
    pub validate_ms: u64,
    pub resolve_ms: u64,
    pub ensure_directory_ms: u64,
    pub config_ms: u64,
    pub dedup_ms: u64,
    pub encode_ms: u64,
    pub write_ms: u64,
    pub verify_ms: u64,
    pub total_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactMetadata {
    /// True when an existing file was returned unchanged.
    pub reused: bool,
    pub created_at: DateTime<Utc>,
    pub directory_source: Option<ConfigSource>,
    pub config: QrHybridConfig,
    pub expected_capacity: usize,
    pub recommendation: String,
    pub validation: QrValidationResult,
    pub timings: GenerationTimings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactResponse {
    pub file_path: PathBuf,
    pub filename: String,
    pub size_bytes: u64,
    pub hash: String,
    pub width: u32,
    pub height: u32,
    pub metadata: ArtifactMetadata,
}

/// Options for [`LocalArtifactManager`].
#[derive(Debug, Clone)]
pub struct ArtifactManagerOptions {
    pub retention: RetentionPolicy,
    pub naming: FilenameGenerator,
    /// Run retention in the background after each new artifact.
    pub background_cleanup: bool,
}

impl Default for ArtifactManagerOptions {
    fn default() -> Self {
        Self {
            retention: RetentionPolicy::default(),
            naming: FilenameGenerator::default(),
            background_cleanup: true,
        }
    }
}

type SharedDirectory = Arc<RwLock<Arc<DirectoryManager>>>;

/// Produces artifacts into the configured directory.
pub struct LocalArtifactManager {
    provider: Arc<ConfigurationProvider>,
    directory: SharedDirectory,
    generator: LocalArtifactGenerator,
    hybrid: QrHybridConfigManager,
    validation: QrValidationEngine,
    options: ArtifactManagerOptions,
    cleanup_running: Arc<AtomicBool>,
    _subscription: Subscription,
}

impl LocalArtifactManager {
    /// Build a manager bound to `provider`.
    ///
    /// The manager follows configuration changes: each change replaces its
    /// directory manager with one for the new directory.
    pub fn new(
        provider: Arc<ConfigurationProvider>,
        encoder: Arc<dyn QrEncoder>,
        options: ArtifactManagerOptions,
    ) -> Self {
        let initial = directory_manager_for(provider.get_qr_directory(), &options);
        let directory: SharedDirectory = Arc::new(RwLock::new(Arc::new(initial)));

        let swap_target = directory.clone();
        let swap_options = options.clone();
        let subscription = provider.on_configuration_changed(Arc::new(move |status| {
            let replacement = directory_manager_for(status.current_directory.clone(), &swap_options);
            match swap_target.write() {
                Ok(mut current) => *current = Arc::new(replacement),
                Err(poisoned) => *poisoned.into_inner() = Arc::new(replacement),
            }
            debug!("Artifact directory switched to {}", status.current_directory.display());
        }));

        Self {
            provider,
            directory,
            generator: LocalArtifactGenerator::new(encoder),
            hybrid: QrHybridConfigManager::new(),
            validation: QrValidationEngine::new(),
            options,
            cleanup_running: Arc::new(AtomicBool::new(false)),
            _subscription: subscription,
        }
    }

    /// Directory manager for the configured directory.
    pub fn directory(&self) -> Arc<DirectoryManager> {
        match self.directory.read() {
            Ok(current) => current.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn hybrid_config(&self) -> &QrHybridConfigManager {
        &self.hybrid
    }

    pub fn validation_engine(&self) -> &QrValidationEngine {
        &self.validation
    }

    /// Generate an artifact for `request`, reusing an identical one if present.
    pub async fn generate(&self, request: &ArtifactRequest) -> Result<ArtifactResponse> {
        let started = Instant::now();
        let mut timings = GenerationTimings::default();

        let phase = Instant::now();
        let payload = validate_payload(&request.payload)?;
        let target_size = validate_size(request.size)?;
        timings.validate_ms = elapsed_ms(phase);

        let phase = Instant::now();
        let (directory, directory_source) = self.resolve_directory(request.output_dir.as_deref())?;
        timings.resolve_ms = elapsed_ms(phase);

        let phase = Instant::now();
        directory.ensure_directory().await?;
        timings.ensure_directory_ms = elapsed_ms(phase);

        let phase = Instant::now();
        let context = request.context.unwrap_or_default();
        let (optimal, validation) = self.choose_config(payload, context, request.quality)?;
        timings.config_ms = elapsed_ms(phase);

        let hash = hash_payload(payload);

        let phase = Instant::now();
        let existing = find_reusable(&directory, &hash).await?;
        timings.dedup_ms = elapsed_ms(phase);

        if let Some(existing) = existing {
            let (width, height) = existing.dimensions.unwrap_or_default();
            directory.protect(&existing.artifact.path);
            timings.total_ms = elapsed_ms(started);
            info!("Reusing artifact {}", existing.artifact.path.display());
            return Ok(ArtifactResponse {
                filename: file_name_of(&existing.artifact.path),
                file_path: existing.artifact.path,
                size_bytes: existing.artifact.size,
                hash,
                width,
                height,
                metadata: ArtifactMetadata {
                    reused: true,
                    created_at: existing.artifact.created,
                    directory_source,
                    config: optimal.config,
                    expected_capacity: optimal.expected_capacity,
                    recommendation: optimal.recommendation,
                    validation,
                    timings,
                },
            });
        }

        let name = self
            .options
            .naming
            .generate_unique_filename(payload, directory.path());
        let generated = self
            .generator
            .generate(payload, &optimal.config, target_size, &name.full_path)
            .await?;
        timings.encode_ms = generated.encode_ms;
        timings.write_ms = generated.write_ms;
        timings.verify_ms = generated.verify_ms;

        directory.protect(&generated.path);
        if self.options.background_cleanup {
            self.spawn_cleanup(directory.clone());
        }

        timings.total_ms = elapsed_ms(started);
        info!(
            "Generated artifact {} in {} ms",
            generated.path.display(),
            timings.total_ms
        );

        Ok(ArtifactResponse {
            file_path: generated.path,
            filename: name.filename,
            size_bytes: generated.size_bytes,
            hash,
            width: generated.width,
            height: generated.height,
            metadata: ArtifactMetadata {
                reused: false,
                created_at: name.timestamp,
                directory_source,
                config: optimal.config,
                expected_capacity: optimal.expected_capacity,
                recommendation: optimal.recommendation,
                validation,
                timings,
            },
        })
    }

    /// Statistics for the configured directory.
    pub async fn get_directory_stats(&self) -> Result<DirectoryStats> {
        self.directory().get_stats().await
    }

    /// Run retention on the configured directory now.
    pub async fn cleanup(&self) -> Result<CleanupResult> {
        self.directory().cleanup_old_files().await
    }

    fn resolve_directory(
        &self,
        override_dir: Option<&str>,
    ) -> Result<(Arc<DirectoryManager>, Option<ConfigSource>)> {
        match override_dir.filter(|d| !d.trim().is_empty()) {
            Some(raw) => {
                let dir = self.provider.validator().validate(raw).into_result(raw)?;
                Ok((Arc::new(directory_manager_for(dir, &self.options)), None))
            }
            None => {
                let status = self.provider.status();
                let directory = self.directory();
                if directory.path() != status.current_directory {
                    // A change raced with this request; follow the provider.
                    let fresh = directory_manager_for(status.current_directory, &self.options);
                    return Ok((Arc::new(fresh), Some(status.source)));
                }
                Ok((directory, Some(status.source)))
            }
        }
    }

    /// Optimal configuration, falling back one level when it does not validate.
    fn choose_config(
        &self,
        payload: &str,
        context: ViewingContext,
        preferred: Option<ErrorCorrectionLevel>,
    ) -> Result<(OptimalQrConfig, QrValidationResult)> {
        let mut optimal = self.hybrid.get_optimal_qr_config(payload, context, preferred)?;
        let validation = self.validation.validate_qr(payload, &optimal.config, Some(context));
        if validation.is_valid {
            return Ok((optimal, validation));
        }

        if let Some(fallback) = optimal.fallback_config.take() {
            let fallback_validation = self.validation.validate_qr(payload, &fallback, Some(context));
            if fallback_validation.is_valid {
                debug!("Primary QR config failed validation, using level {}", fallback.level);
                optimal.expected_capacity = fallback.level.max_capacity();
                optimal.config = fallback;
                return Ok((optimal, fallback_validation));
            }
        }

        Err(QrLinkError::generation(format!(
            "No valid QR configuration: {}",
            validation.errors.join("; ")
        )))
    }

    fn spawn_cleanup(&self, directory: Arc<DirectoryManager>) {
        if self
            .cleanup_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        let running = self.cleanup_running.clone();
        tokio::spawn(async move {
            match directory.cleanup_old_files().await {
                Ok(result) if result.removed_files > 0 => info!(
                    "Background cleanup removed {} file(s), {} bytes",
                    result.removed_files, result.freed_bytes
                ),
                Ok(_) => {}
                Err(e) => warn!("Background cleanup failed: {}", e),
            }
            running.store(false, Ordering::Release);
        });
    }
}

fn directory_manager_for(path: PathBuf, options: &ArtifactManagerOptions) -> DirectoryManager {
    DirectoryManager::new(
        DirectoryConfig::new(path).with_retention(options.retention),
        options.naming.clone(),
    )
}

fn validate_payload(payload: &str) -> Result<&str> {
    let trimmed = payload.trim();
    if trimmed.is_empty() {
        return Err(QrLinkError::generation("Payload is empty"));
    }
    let chars = trimmed.chars().count();
    if chars > ArtifactConfig::MAX_PAYLOAD_LENGTH {
        return Err(QrLinkError::generation(format!(
            "Payload length {} exceeds maximum of {}",
            chars,
            ArtifactConfig::MAX_PAYLOAD_LENGTH
        )));
    }
    Ok(trimmed)
}

fn validate_size(size: Option<u32>) -> Result<u32> {
    match size {
        None => Ok(ArtifactConfig::DEFAULT_TARGET_SIZE),
        Some(s) if (ArtifactConfig::MIN_TARGET_SIZE..=ArtifactConfig::MAX_TARGET_SIZE).contains(&s) => {
            Ok(s)
        }
        Some(s) => Err(QrLinkError::InvalidParams {
            message: format!(
                "size {} is outside {}..={}",
                s,
                ArtifactConfig::MIN_TARGET_SIZE,
                ArtifactConfig::MAX_TARGET_SIZE
            ),
        }),
    }
}

fn file_name_of(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}
