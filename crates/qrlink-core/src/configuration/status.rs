//! Configuration status value types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where the active output directory came from, highest precedence first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfigSource {
    ExternalRoots,
    Environment,
    CommandLine,
    Default,
}

impl ConfigSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigSource::ExternalRoots => "EXTERNAL_ROOTS",
            ConfigSource::Environment => "ENVIRONMENT",
            ConfigSource::CommandLine => "COMMAND_LINE",
            ConfigSource::Default => "DEFAULT",
        }
    }
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The live output-directory configuration of the process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationStatus {
    pub source: ConfigSource,
    pub current_directory: PathBuf,
    /// Every directory the external source has offered, in arrival order.
    #[serde(default)]
    pub offered_roots: Vec<String>,
    pub is_valid: bool,
    pub last_updated: DateTime<Utc>,
}

/// Lower-precedence inputs, read once at startup.
#[derive(Debug, Clone)]
pub struct StartupSources {
    pub environment: Option<String>,
    pub command_line: Option<String>,
    pub default_dir: PathBuf,
}

impl StartupSources {
    pub fn new(default_dir: impl Into<PathBuf>) -> Self {
        Self {
            environment: None,
            command_line: None,
            default_dir: default_dir.into(),
        }
    }

    /// Read the environment input from `var`, ignoring blank values.
    pub fn with_environment_var(mut self, var: &str) -> Self {
        self.environment = std::env::var(var).ok().filter(|v| !v.trim().is_empty());
        self
    }

    pub fn with_environment(mut self, value: Option<String>) -> Self {
        self.environment = value.filter(|v| !v.trim().is_empty());
        self
    }

    pub fn with_command_line(mut self, value: Option<String>) -> Self {
        self.command_line = value.filter(|v| !v.trim().is_empty());
        self
    }
}
