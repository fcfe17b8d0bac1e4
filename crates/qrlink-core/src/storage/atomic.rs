//! Atomic file operations.
//!
//! Writes go to a uniquely named sibling temp file, are synced to disk and
//! then renamed over the target, so a partially written file is never
//! observable under its final name. A failed write removes its temp file
//! before the error is returned.

use crate::config::PathsConfig;
use crate::error::{QrLinkError, Result};
use regex::Regex;
use serde::{de::DeserializeOwned, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Read and parse a JSON file.
///
/// Returns `None` if the file doesn't exist, or an error if parsing fails.
pub fn atomic_read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }

    let mut file = File::open(path).map_err(|e| QrLinkError::Io {
        message: format!("Failed to open {}", path.display()),
        path: Some(path.to_path_buf()),
        source: Some(e),
    })?;

    let mut contents = String::new();
    file.read_to_string(&mut contents)
        .map_err(|e| QrLinkError::Io {
            message: format!("Failed to read {}", path.display()),
            path: Some(path.to_path_buf()),
            source: Some(e),
        })?;

    let data: T = serde_json::from_str(&contents).map_err(|e| QrLinkError::Json {
        message: format!("Failed to parse {}: {}", path.display(), e),
        source: Some(e),
    })?;

    Ok(Some(data))
}

/// Write data to a JSON file atomically.
pub fn atomic_write_json<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| QrLinkError::Io {
                message: format!("Failed to create directory {}", parent.display()),
                path: Some(parent.to_path_buf()),
                source: Some(e),
            })?;
        }
    }

    let serialized = serde_json::to_string_pretty(data).map_err(|e| QrLinkError::Json {
        message: format!("Failed to serialize data: {}", e),
        source: Some(e),
    })?;

    let temp_path = temp_path_for(path);
    let written = (|| -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)?;
        file.write_all(serialized.as_bytes())?;
        file.flush()?;
        file.sync_all()?;
        fs::rename(&temp_path, path)
    })();

    if let Err(e) = written {
        discard_temp_sync(&temp_path);
        return Err(QrLinkError::Io {
            message: format!("Failed to write {}", path.display()),
            path: Some(path.to_path_buf()),
            source: Some(e),
        });
    }

    debug!("Atomically wrote {}", path.display());
    Ok(())
}

/// Write bytes to `path` atomically.
///
/// The parent directory must already exist.
pub async fn atomic_write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    let temp_path = temp_path_for(path);

    if let Err(e) = write_and_rename(&temp_path, path, bytes).await {
        discard_temp(&temp_path).await;
        return Err(QrLinkError::Io {
            message: format!("Failed to write {}", path.display()),
            path: Some(path.to_path_buf()),
            source: Some(e),
        });
    }

    debug!("Atomically wrote {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}

async fn write_and_rename(temp_path: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(temp_path)
        .await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(temp_path, path).await
}

/// `.<target>.<32 hex uuid><suffix>`, as produced by [`temp_path_for`].
static TEMP_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"^\.(?P<target>.+)\.[0-9a-f]{{32}}{}$",
        regex::escape(PathsConfig::TEMP_SUFFIX)
    ))
    .expect("temp name regex must compile")
});

/// Sibling temp path unique per call: `.<name>.<uuid>.tmp`.
pub fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_name = format!(
        ".{}.{}{}",
        name,
        uuid::Uuid::new_v4().simple(),
        PathsConfig::TEMP_SUFFIX
    );
    path.with_file_name(temp_name)
}

/// Name of the file a temp file produced by [`temp_path_for`] was meant to
/// replace, or `None` if `path` is not such a temp file.
pub fn temp_target_name(path: &Path) -> Option<&str> {
    let name = path.file_name()?.to_str()?;
    TEMP_NAME
        .captures(name)
        .and_then(|c| c.name("target"))
        .map(|m| m.as_str())
}

/// Whether `path` names a temp file produced by [`temp_path_for`].
pub fn is_temp_file(path: &Path) -> bool {
    temp_target_name(path).is_some()
}

async fn discard_temp(temp_path: &Path) {
    match tokio::fs::remove_file(temp_path).await {
        Ok(()) => debug!("Removed temp file {}", temp_path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove temp file {}: {}", temp_path.display(), e),
    }
}

fn discard_temp_sync(temp_path: &Path) {
    if let Err(e) = fs::remove_file(temp_path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove temp file {}: {}", temp_path.display(), e);
        }
    }
}
