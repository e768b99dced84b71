//! Adapter configuration file parsing and validation.
//!
//! ```toml
//! command = "/usr/local/bin/my-dictionary"
//! args = ["--strict"]
//! working_dir = "/srv/dictionaries"
//! startup_timeout_seconds = 30
//! shutdown_grace_ms = 2000
//!
//! [env]
//! DICTIONARY_LANG = "en"
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::stdio::spawner::SpawnConfig;
use crate::{AppError, Result};

fn default_startup_timeout_seconds() -> u64 {
    30
}

fn default_shutdown_grace_ms() -> u64 {
    2000
}

/// Adapter configuration parsed from a TOML file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct AdapterConfig {
    /// Backend program to launch.
    pub command: PathBuf,
    /// Arguments passed to the backend.
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment variables for the backend.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Working directory for the backend.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// Handshake timeout; 0 means wait forever.
    #[serde(default = "default_startup_timeout_seconds")]
    pub startup_timeout_seconds: u64,
    /// Grace period between closing stdin and killing the backend.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

impl AdapterConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read, contains
    /// invalid TOML, or fails validation.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Launch description for this configuration.
    #[must_use]
    pub fn to_spawn_config(&self) -> SpawnConfig {
        SpawnConfig {
            command: self.command.clone(),
            args: self.args.clone(),
            env: self.env.clone(),
            working_dir: self.working_dir.clone(),
            startup_timeout: (self.startup_timeout_seconds > 0)
                .then(|| Duration::from_secs(self.startup_timeout_seconds)),
            shutdown_grace: Duration::from_millis(self.shutdown_grace_ms),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.command.as_os_str().is_empty() {
            return Err(AppError::Config("command must not be empty".into()));
        }

        if let Some(dir) = &self.working_dir {
            if !dir.is_dir() {
                return Err(AppError::Config(format!(
                    "working_dir is not a directory: {}",
                    dir.display()
                )));
            }
        }

        Ok(())
    }
}
