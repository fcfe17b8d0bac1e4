//! Path safety checks for externally supplied output directories.
//!
//! A candidate path goes through three stages, in order:
//! 1. Shape: non-empty, bounded length, no control or reserved characters.
//! 2. Containment: no `..` components, and the canonical form (symlinks
//!    resolved on the longest existing prefix) must sit under an allow-listed root.
//! 3. System areas: the canonical form must not land in an OS-owned subtree.
//!
//! Validation never fails with an error; callers receive a [`SecurityReport`]
//! and decide whether to abort or fall back.

use crate::config::PathsConfig;
use crate::error::{QrLinkError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Characters rejected anywhere in a candidate path.
const DISALLOWED_CHARS: &[char] = &['<', '>', '"', '|', '?', '*'];

/// OS-owned subtrees that are never valid output directories.
#[cfg(unix)]
const SYSTEM_PREFIXES: &[&str] = &[
    "/etc",
    "/proc",
    "/sys",
    "/dev",
    "/boot",
    "/bin",
    "/sbin",
    "/lib",
    "/lib64",
    "/usr/bin",
    "/usr/sbin",
    "/usr/lib",
    "/run",
    "/var/run",
    "/private/etc",
    "/System",
];

#[cfg(windows)]
const SYSTEM_PREFIXES: &[&str] = &[
    r"C:\Windows",
    r"C:\Program Files",
    r"C:\Program Files (x86)",
];

#[cfg(not(any(unix, windows)))]
const SYSTEM_PREFIXES: &[&str] = &[];

/// A single reason a path was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SecurityViolation {
    EmptyPath,
    TooLong { length: usize, max: usize },
    DisallowedCharacter { character: char },
    Traversal,
    Unresolvable { message: String },
    OutsideAllowedRoots { path: PathBuf },
    SystemDirectory { path: PathBuf },
}

impl std::fmt::Display for SecurityViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecurityViolation::EmptyPath => write!(f, "path is empty"),
            SecurityViolation::TooLong { length, max } => {
                write!(f, "path length {} exceeds maximum {}", length, max)
            }
            SecurityViolation::DisallowedCharacter { character } => {
                write!(f, "path contains disallowed character {:?}", character)
            }
            SecurityViolation::Traversal => write!(f, "path contains a traversal sequence"),
            SecurityViolation::Unresolvable { message } => {
                write!(f, "path cannot be resolved: {}", message)
            }
            SecurityViolation::OutsideAllowedRoots { path } => {
                write!(f, "{} is outside the allowed roots", path.display())
            }
            SecurityViolation::SystemDirectory { path } => {
                write!(f, "{} is inside a system directory", path.display())
            }
        }
    }
}

/// Outcome of validating one candidate path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityReport {
    pub is_secure: bool,
    /// Canonical absolute form, present only when the path is secure.
    pub sanitized_path: Option<PathBuf>,
    pub violations: Vec<SecurityViolation>,
}

impl SecurityReport {
    fn rejected(violations: Vec<SecurityViolation>) -> Self {
        Self {
            is_secure: false,
            sanitized_path: None,
            violations,
        }
    }

    /// Human-readable violation descriptions.
    pub fn violation_messages(&self) -> Vec<String> {
        self.violations.iter().map(|v| v.to_string()).collect()
    }

    /// Convert into the sanitized path, or a `SECURITY_ERROR` for `original`.
    pub fn into_result(self, original: &str) -> Result<PathBuf> {
        match self.sanitized_path {
            Some(path) if self.is_secure => Ok(path),
            _ => Err(QrLinkError::Security {
                path: original.to_string(),
                violations: self.violation_messages(),
            }),
        }
    }
}

/// Classifies candidate directories as safe or unsafe against an allow-list.
#[derive(Debug, Clone)]
pub struct SecurityValidator {
    allowed_roots: Vec<PathBuf>,
    base_dir: PathBuf,
    max_path_length: usize,
}

impl SecurityValidator {
    /// Create a validator.
    ///
    /// # Arguments
    ///
    /// * `allowed_roots` - Directories under which output may live
    /// * `base_dir` - Directory relative candidates are resolved against
    pub fn new(allowed_roots: impl IntoIterator<Item = PathBuf>, base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        let allowed_roots = allowed_roots
            .into_iter()
            .filter_map(|root| {
                let absolute = if root.is_absolute() {
                    root
                } else {
                    base_dir.join(root)
                };
                match resolve_lenient(&absolute) {
                    Ok(resolved) => Some(resolved),
                    Err(e) => {
                        debug!("Dropping unresolvable allowed root {}: {}", absolute.display(), e);
                        None
                    }
                }
            })
            .collect();

        Self {
            allowed_roots,
            base_dir,
            max_path_length: PathsConfig::MAX_PATH_LENGTH,
        }
    }

    /// Validator allowing the home directory, the temp directory and the
    /// working directory.
    pub fn with_default_roots() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| std::env::temp_dir());
        Self::new(default_allowed_roots(&cwd), cwd)
    }

    /// Canonical allow-listed roots.
    pub fn allowed_roots(&self) -> &[PathBuf] {
        &self.allowed_roots
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Validate a candidate directory.
    pub fn validate(&self, candidate: &str) -> SecurityReport {
        // Stage 1: shape
        let mut violations = Vec::new();
        if candidate.trim().is_empty() {
            return SecurityReport::rejected(vec![SecurityViolation::EmptyPath]);
        }
        if candidate.len() > self.max_path_length {
            violations.push(SecurityViolation::TooLong {
                length: candidate.len(),
                max: self.max_path_length,
            });
        }
        if let Some(character) = candidate
            .chars()
            .find(|c| c.is_control() || DISALLOWED_CHARS.contains(c))
        {
            violations.push(SecurityViolation::DisallowedCharacter { character });
        }
        if !violations.is_empty() {
            return SecurityReport::rejected(violations);
        }

        // Stage 2: containment
        let expanded = expand_home(candidate.trim());
        if expanded
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return SecurityReport::rejected(vec![SecurityViolation::Traversal]);
        }

        let absolute: PathBuf = if expanded.is_absolute() {
            expanded
        } else {
            self.base_dir.join(expanded)
        }
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();

        let canonical = match resolve_lenient(&absolute) {
            Ok(path) => path,
            Err(e) => {
                return SecurityReport::rejected(vec![SecurityViolation::Unresolvable {
                    message: e.to_string(),
                }]);
            }
        };

        if !self.allowed_roots.iter().any(|root| canonical.starts_with(root)) {
            violations.push(SecurityViolation::OutsideAllowedRoots {
                path: canonical.clone(),
            });
        }

        // Stage 3: system areas
        if is_system_path(&canonical) {
            violations.push(SecurityViolation::SystemDirectory {
                path: canonical.clone(),
            });
        }

        if violations.is_empty() {
            SecurityReport {
                is_secure: true,
                sanitized_path: Some(canonical),
                violations,
            }
        } else {
            debug!("Rejected path {}: {:?}", candidate, violations);
            SecurityReport::rejected(violations)
        }
    }
}

/// Home, temp and the given working directory.
pub fn default_allowed_roots(cwd: &Path) -> Vec<PathBuf> {
    let mut roots = Vec::new();
    if let Some(home) = dirs::home_dir() {
        roots.push(home);
    }
    roots.push(std::env::temp_dir());
    roots.push(cwd.to_path_buf());
    roots
}

fn expand_home(raw: &str) -> PathBuf {
    if raw == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(raw)
}

/// Canonicalize the longest existing prefix of `path` and re-append the rest.
///
/// `path` must be absolute and free of `..` components.
fn resolve_lenient(path: &Path) -> std::io::Result<PathBuf> {
    let mut existing = path.to_path_buf();
    let mut remainder: Vec<std::ffi::OsString> = Vec::new();

    loop {
        match existing.canonicalize() {
            Ok(mut resolved) => {
                for part in remainder.iter().rev() {
                    resolved.push(part);
                }
                return Ok(resolved);
            }
            Err(e) => {
                let Some(name) = existing.file_name().map(|n| n.to_os_string()) else {
                    return Err(e);
                };
                remainder.push(name);
                if !existing.pop() {
                    return Err(e);
                }
            }
        }
    }
}

fn is_system_path(canonical: &Path) -> bool {
    if canonical.parent().is_none() {
        return true;
    }
    SYSTEM_PREFIXES
        .iter()
        .any(|prefix| canonical.starts_with(prefix))
}
