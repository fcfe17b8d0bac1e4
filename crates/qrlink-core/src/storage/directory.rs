//! Output directory lifecycle: creation, writability and retention.

use crate::config::{PathsConfig, RetentionConfig};
use crate::error::{QrLinkError, Result};
use crate::storage::atomic::temp_target_name;
use crate::storage::filename::FilenameGenerator;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

/// Age and size limits for stored artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub max_age: Duration,
    pub max_total_bytes: u64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_age: RetentionConfig::MAX_AGE,
            max_total_bytes: RetentionConfig::MAX_TOTAL_BYTES,
        }
    }
}

/// Settings for one output directory. Replaced wholesale on reconfiguration.
#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    pub base_path: PathBuf,
    pub auto_create: bool,
    pub check_permissions: bool,
    pub retention: RetentionPolicy,
}

impl DirectoryConfig {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            auto_create: true,
            check_permissions: true,
            retention: RetentionPolicy::default(),
        }
    }

    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_auto_create(mut self, auto_create: bool) -> Self {
        self.auto_create = auto_create;
        self
    }
}

/// Point-in-time view of the output directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryInfo {
    pub path: PathBuf,
    pub exists: bool,
    pub writable: bool,
    pub artifact_count: usize,
    pub total_bytes: u64,
}

/// Directory statistics including artifact age range.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryStats {
    #[serde(flatten)]
    pub info: DirectoryInfo,
    pub oldest_artifact: Option<DateTime<Utc>>,
    pub newest_artifact: Option<DateTime<Utc>>,
    pub max_total_bytes: u64,
    pub max_age_secs: u64,
}

/// Outcome of a retention sweep.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupResult {
    pub removed_files: usize,
    pub freed_bytes: u64,
}

/// An artifact file found on disk.
#[derive(Debug, Clone)]
pub struct StoredArtifact {
    pub path: PathBuf,
    pub hash: String,
    pub size: u64,
    pub created: DateTime<Utc>,
}

/// Manages one output directory.
pub struct DirectoryManager {
    config: DirectoryConfig,
    naming: FilenameGenerator,
    /// Artifact produced by the last completed request; exempt from cleanup.
    protected: Mutex<Option<PathBuf>>,
}

impl DirectoryManager {
    pub fn new(config: DirectoryConfig, naming: FilenameGenerator) -> Self {
        Self {
            config,
            naming,
            protected: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    pub fn path(&self) -> &Path {
        &self.config.base_path
    }

    /// Exempt `path` from cleanup until another artifact is protected.
    pub fn protect(&self, path: &Path) {
        if let Ok(mut guard) = self.protected.lock() {
            *guard = Some(path.to_path_buf());
        }
    }

    fn is_protected(&self, path: &Path) -> bool {
        self.protected
            .lock()
            .map(|guard| guard.as_deref() == Some(path))
            .unwrap_or(false)
    }

    /// Make sure the directory exists and is writable.
    ///
    /// Creates it when `auto_create` is set; otherwise a missing directory
    /// is a `DIRECTORY_ERROR`. A directory that exists but fails the write
    /// probe is a `PERMISSION_ERROR`.
    pub async fn ensure_directory(&self) -> Result<DirectoryInfo> {
        let path = &self.config.base_path;

        match tokio::fs::metadata(path).await {
            Ok(meta) if !meta.is_dir() => {
                return Err(QrLinkError::Directory {
                    path: path.clone(),
                    message: "path exists but is not a directory".to_string(),
                });
            }
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if !self.config.auto_create {
                    return Err(QrLinkError::Directory {
                        path: path.clone(),
                        message: "directory does not exist and auto-create is disabled".to_string(),
                    });
                }
                tokio::fs::create_dir_all(path)
                    .await
                    .map_err(|e| QrLinkError::Directory {
                        path: path.clone(),
                        message: format!("failed to create directory: {}", e),
                    })?;
                info!("Created QR directory {}", path.display());
            }
            Err(e) => {
                return Err(QrLinkError::Directory {
                    path: path.clone(),
                    message: e.to_string(),
                });
            }
        }

        let writable = if self.config.check_permissions {
            if !probe_writable(path).await {
                return Err(QrLinkError::PermissionDenied(path.clone()));
            }
            true
        } else {
            probe_writable(path).await
        };

        let artifacts = self.scan_artifacts().await?;
        Ok(DirectoryInfo {
            path: path.clone(),
            exists: true,
            writable,
            artifact_count: artifacts.len(),
            total_bytes: artifacts.iter().map(|a| a.size).sum(),
        })
    }

    /// Current statistics. Never creates the directory.
    pub async fn get_stats(&self) -> Result<DirectoryStats> {
        let path = &self.config.base_path;
        let exists = tokio::fs::metadata(path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);

        let (artifacts, writable) = if exists {
            (self.scan_artifacts().await?, probe_writable(path).await)
        } else {
            (Vec::new(), false)
        };

        Ok(DirectoryStats {
            info: DirectoryInfo {
                path: path.clone(),
                exists,
                writable,
                artifact_count: artifacts.len(),
                total_bytes: artifacts.iter().map(|a| a.size).sum(),
            },
            oldest_artifact: artifacts.iter().map(|a| a.created).min(),
            newest_artifact: artifacts.iter().map(|a| a.created).max(),
            max_total_bytes: self.config.retention.max_total_bytes,
            max_age_secs: self.config.retention.max_age.as_secs(),
        })
    }

    /// List artifacts named by this directory's naming scheme.
    pub async fn scan_artifacts(&self) -> Result<Vec<StoredArtifact>> {
        let dir = &self.config.base_path;
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| QrLinkError::io_with_path(e, dir))?;

        let mut artifacts = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| QrLinkError::io_with_path(e, dir))?
        {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(parsed) = self.naming.parse_filename(name) else {
                continue;
            };
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            let created = self
                .naming
                .timestamp_of(name)
                .unwrap_or_else(|| modified_or_now(&meta));
            artifacts.push(StoredArtifact {
                path: entry.path(),
                hash: parsed.hash,
                size: meta.len(),
                created,
            });
        }

        Ok(artifacts)
    }

    /// Enforce the retention policy.
    ///
    /// Phase one removes artifacts older than `max_age`. If the directory is
    /// still over `max_total_bytes`, phase two removes the oldest remaining
    /// artifacts until it fits. The protected artifact is never removed.
    /// Individual removal failures are logged and skipped.
    pub async fn cleanup_old_files(&self) -> Result<CleanupResult> {
        let retention = self.config.retention;
        let now = Utc::now();
        let max_age = chrono::Duration::from_std(retention.max_age)
            .unwrap_or_else(|_| chrono::Duration::days(36_500));

        let mut result = CleanupResult::default();
        let mut artifacts = self.scan_artifacts().await?;
        artifacts.sort_by_key(|a| a.created);

        // Phase 1: age
        let mut remaining = Vec::with_capacity(artifacts.len());
        for artifact in artifacts {
            if now - artifact.created > max_age && !self.is_protected(&artifact.path) {
                if self.remove(&artifact.path).await {
                    result.removed_files += 1;
                    result.freed_bytes += artifact.size;
                    continue;
                }
            }
            remaining.push(artifact);
        }

        // Phase 2: size, oldest first
        let mut total: u64 = remaining.iter().map(|a| a.size).sum();
        for artifact in &remaining {
            if total <= retention.max_total_bytes {
                break;
            }
            if self.is_protected(&artifact.path) {
                continue;
            }
            if self.remove(&artifact.path).await {
                total = total.saturating_sub(artifact.size);
                result.removed_files += 1;
                result.freed_bytes += artifact.size;
            }
        }

        self.remove_stale_temp_files(retention.max_age).await;

        if result.removed_files > 0 {
            info!(
                "Cleanup removed {} artifact(s), freed {} bytes in {}",
                result.removed_files,
                result.freed_bytes,
                self.config.base_path.display()
            );
        }
        Ok(result)
    }

    async fn remove(&self, path: &Path) -> bool {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                debug!("Removed artifact {}", path.display());
                true
            }
            Err(e) => {
                warn!("Failed to remove artifact {}: {}", path.display(), e);
                false
            }
        }
    }

    async fn remove_stale_temp_files(&self, max_age: Duration) {
        let Ok(mut entries) = tokio::fs::read_dir(&self.config.base_path).await else {
            return;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            let ours = temp_target_name(&path)
                .map(|target| self.naming.parse_filename(target).is_some())
                .unwrap_or(false);
            if !ours {
                continue;
            }
            let stale = entry
                .metadata()
                .await
                .ok()
                .and_then(|m| m.modified().ok())
                .and_then(|t| SystemTime::now().duration_since(t).ok())
                .map(|age| age > max_age)
                .unwrap_or(false);
            if stale {
                let _ = self.remove(&path).await;
            }
        }
    }
}

/// Verify writability empirically by creating and deleting a probe file.
pub async fn probe_writable(dir: &Path) -> bool {
    let probe = dir.join(format!(
        "{}-{}",
        PathsConfig::PROBE_FILE_PREFIX,
        uuid::Uuid::new_v4().simple()
    ));
    match tokio::fs::write(&probe, b"probe").await {
        Ok(()) => {
            if let Err(e) = tokio::fs::remove_file(&probe).await {
                warn!("Failed to remove probe file {}: {}", probe.display(), e);
            }
            true
        }
        Err(e) => {
            debug!("Directory {} is not writable: {}", dir.display(), e);
            false
        }
    }
}

fn modified_or_now(meta: &std::fs::Metadata) -> DateTime<Utc> {
    meta.modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn write_artifact(dir: &Path, payload: &str, created: DateTime<Utc>, size: usize) -> PathBuf {
        let name = FilenameGenerator::default().generate_at(payload, dir, created);
        std::fs::write(&name.full_path, vec![0u8; size]).unwrap();
        name.full_path
    }

    fn manager(dir: &Path, retention: RetentionPolicy) -> DirectoryManager {
        DirectoryManager::new(
            DirectoryConfig::new(dir).with_retention(retention),
            FilenameGenerator::default(),
        )
    }

    #[tokio::test]
    async fn test_ensure_creates_directory() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("a").join("b");
        let mgr = manager(&target, RetentionPolicy::default());

        let info = mgr.ensure_directory().await.unwrap();
        assert!(info.exists);
        assert!(info.writable);
        assert_eq!(info.artifact_count, 0);
        assert!(target.is_dir());
        // Probe file is gone
        assert_eq!(std::fs::read_dir(&target).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_ensure_without_auto_create_fails() {
        let temp = TempDir::new().unwrap();
        let mgr = DirectoryManager::new(
            DirectoryConfig::new(temp.path().join("missing")).with_auto_create(false),
            FilenameGenerator::default(),
        );

        let err = mgr.ensure_directory().await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::DirectoryError);
    }

    #[tokio::test]
    async fn test_ensure_rejects_file_path() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("file");
        std::fs::write(&file, b"x").unwrap();

        let err = manager(&file, RetentionPolicy::default())
            .ensure_directory()
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::DirectoryError);
    }

    #[tokio::test]
    async fn test_cleanup_removes_old_artifacts_only() {
        let temp = TempDir::new().unwrap();
        let old = write_artifact(temp.path(), "old", Utc.timestamp_millis_opt(1_000).unwrap(), 10);
        let fresh = write_artifact(temp.path(), "fresh", Utc::now(), 10);
        std::fs::write(temp.path().join("notes.txt"), b"keep").unwrap();

        let result = manager(temp.path(), RetentionPolicy::default())
            .cleanup_old_files()
            .await
            .unwrap();

        assert_eq!(result.removed_files, 1);
        assert_eq!(result.freed_bytes, 10);
        assert!(!old.exists());
        assert!(fresh.exists());
        assert!(temp.path().join("notes.txt").exists());
    }

    #[tokio::test]
    async fn test_cleanup_keeps_foreign_temp_files() {
        let temp = TempDir::new().unwrap();
        let three_days_ago = SystemTime::now() - Duration::from_secs(3 * 24 * 60 * 60);
        let age = |path: &Path| {
            std::fs::File::options()
                .write(true)
                .open(path)
                .unwrap()
                .set_modified(three_days_ago)
                .unwrap();
        };

        let foreign = temp.path().join(".my-editor-session.tmp");
        std::fs::write(&foreign, b"unsaved").unwrap();
        age(&foreign);

        let artifact = FilenameGenerator::default().generate_at("p", temp.path(), Utc::now());
        let ours = crate::storage::atomic::temp_path_for(&artifact.full_path);
        std::fs::write(&ours, b"partial").unwrap();
        age(&ours);

        manager(temp.path(), RetentionPolicy::default())
            .cleanup_old_files()
            .await
            .unwrap();

        assert!(foreign.exists());
        assert!(!ours.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_ensure_read_only_directory_is_permission_error() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("ro");
        std::fs::create_dir(&dir).unwrap();
        std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o555)).unwrap();
        if probe_writable(&dir).await {
            // Mode bits are not enforced for this user (root).
            return;
        }

        let result = manager(&dir, RetentionPolicy::default()).ensure_directory().await;
        std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(
            result.unwrap_err().kind(),
            crate::error::ErrorKind::PermissionError
        );
    }

    #[tokio::test]
    async fn test_cleanup_enforces_size_oldest_first() {
        let temp = TempDir::new().unwrap();
        let now = Utc::now();
        let a = write_artifact(temp.path(), "a", now - chrono::Duration::seconds(30), 100);
        let b = write_artifact(temp.path(), "b", now - chrono::Duration::seconds(20), 100);
        let c = write_artifact(temp.path(), "c", now - chrono::Duration::seconds(10), 100);

        let retention = RetentionPolicy {
            max_age: Duration::from_secs(3600),
            max_total_bytes: 150,
        };
        let result = manager(temp.path(), retention).cleanup_old_files().await.unwrap();

        assert_eq!(result.removed_files, 2);
        assert!(!a.exists());
        assert!(!b.exists());
        assert!(c.exists());
    }

    #[tokio::test]
    async fn test_cleanup_spares_protected_artifact() {
        let temp = TempDir::new().unwrap();
        let old = write_artifact(temp.path(), "old", Utc.timestamp_millis_opt(1_000).unwrap(), 10);
        let mgr = manager(temp.path(), RetentionPolicy::default());
        mgr.protect(&old);

        let result = mgr.cleanup_old_files().await.unwrap();
        assert_eq!(result.removed_files, 0);
        assert!(old.exists());
    }

    #[tokio::test]
    async fn test_stats_on_missing_directory() {
        let temp = TempDir::new().unwrap();
        let stats = manager(&temp.path().join("nope"), RetentionPolicy::default())
            .get_stats()
            .await
            .unwrap();
        assert!(!stats.info.exists);
        assert_eq!(stats.info.artifact_count, 0);
        assert!(stats.oldest_artifact.is_none());
    }

    #[tokio::test]
    async fn test_stats_reports_age_range() {
        let temp = TempDir::new().unwrap();
        let early = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let late = Utc.timestamp_millis_opt(1_700_000_500_000).unwrap();
        write_artifact(temp.path(), "one", early, 5);
        write_artifact(temp.path(), "two", late, 7);

        let stats = manager(temp.path(), RetentionPolicy::default())
            .get_stats()
            .await
            .unwrap();
        assert_eq!(stats.info.artifact_count, 2);
        assert_eq!(stats.info.total_bytes, 12);
        assert_eq!(stats.oldest_artifact, Some(early));
        assert_eq!(stats.newest_artifact, Some(late));
    }
}
