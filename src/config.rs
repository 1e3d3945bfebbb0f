//! Configuration model for muster.
//!
//! This module defines the Config struct that represents
//! `.muster/config.yaml`. It supports forward-compatible YAML parsing
//! (unknown fields are ignored) and sensible defaults for every field, so
//! a missing or empty config file yields a usable configuration.

use crate::error::{MusterError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for a muster workspace.
///
/// This struct represents the contents of `.muster/config.yaml`.
/// Unknown fields in the YAML are ignored for forward compatibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // =========================================================================
    // Scheduling settings
    // =========================================================================
    /// Worker-count ceiling applied when a convoy carries no
    /// `max-workers:<n>` label.
    #[serde(default = "default_max_workers")]
    pub default_max_workers: u32,

    /// Mode name applied to new convoys when no `--mode` is given.
    #[serde(default = "default_mode")]
    pub default_mode: String,

    // =========================================================================
    // Respawn settings
    // =========================================================================
    /// Resource-usage percentage above which a worker hands off to a
    /// fresh instance. The boundary is exclusive: usage equal to the
    /// threshold does not trigger a respawn.
    #[serde(default = "default_respawn_threshold")]
    pub respawn_threshold: f64,

    // =========================================================================
    // External tool settings
    // =========================================================================
    /// Name or path of the ledger CLI binary.
    #[serde(default = "default_ledger_bin")]
    pub ledger_bin: String,

    /// Name or path of the agent runtime binary launched in each pane.
    #[serde(default = "default_runtime_bin")]
    pub runtime_bin: String,

    /// Prefix for tmux session names created by muster.
    #[serde(default = "default_session_prefix")]
    pub session_prefix: String,
}

fn default_max_workers() -> u32 {
    3
}

fn default_mode() -> String {
    "standard".to_string()
}

fn default_respawn_threshold() -> f64 {
    80.0
}

fn default_ledger_bin() -> String {
    "ldg".to_string()
}

fn default_runtime_bin() -> String {
    "agentd".to_string()
}

fn default_session_prefix() -> String {
    "muster".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_max_workers: default_max_workers(),
            default_mode: default_mode(),
            respawn_threshold: default_respawn_threshold(),
            ledger_bin: default_ledger_bin(),
            runtime_bin: default_runtime_bin(),
            session_prefix: default_session_prefix(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file.
    ///
    /// Returns the default configuration if the file does not exist.
    /// A file that exists but cannot be read or parsed is an error:
    /// silently falling back to defaults would mask typos in a config
    /// the user intended to take effect.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            MusterError::User(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_yaml::from_str(&content).map_err(|e| {
            MusterError::User(format!(
                "failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Serialize the configuration to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| MusterError::User(format!("failed to serialize config: {}", e)))
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.default_max_workers == 0 {
            return Err(MusterError::User(
                "config error: default_max_workers must be at least 1".to_string(),
            ));
        }

        if !self.respawn_threshold.is_finite() || self.respawn_threshold < 0.0 {
            return Err(MusterError::User(format!(
                "config error: respawn_threshold must be a non-negative number, got {}",
                self.respawn_threshold
            )));
        }

        if self.ledger_bin.trim().is_empty() {
            return Err(MusterError::User(
                "config error: ledger_bin must not be empty".to_string(),
            ));
        }

        if self.runtime_bin.trim().is_empty() {
            return Err(MusterError::User(
                "config error: runtime_bin must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}
