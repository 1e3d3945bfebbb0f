//! Workspace and execution context resolution for muster.
//!
//! This module provides the "environment resolution" layer that finds the
//! muster workspace root from any working directory and carries everything
//! a core entry point needs: resolved paths, loaded configuration, and the
//! convoy the invocation targets.
//!
//! The convoy id is always carried explicitly in the context. Resolving it
//! from the ambient `MUSTER_CONVOY` environment variable happens only at
//! the command-dispatch boundary (see `commands::resolve_convoy_arg`);
//! nothing below that layer reads the environment.

use crate::config::Config;
use crate::error::{MusterError, Result};
use std::env;
use std::path::{Path, PathBuf};

/// Name of the workspace state directory.
pub const STATE_DIR: &str = ".muster";

/// Environment variable consulted at the dispatch boundary (only) to
/// resolve a convoy id when no `--convoy` flag is given.
pub const CONVOY_ENV_VAR: &str = "MUSTER_CONVOY";

/// Resolved execution context for a muster invocation.
///
/// All paths are absolute.
#[derive(Debug, Clone)]
pub struct ExecContext {
    /// Absolute path to the workspace root (the directory containing `.muster/`).
    pub workspace_root: PathBuf,

    /// Absolute path to the state directory (`{workspace_root}/.muster/`).
    pub state_dir: PathBuf,

    /// Loaded configuration.
    pub config: Config,

    /// The convoy this invocation targets, if any.
    ///
    /// Set by the command layer from the `--convoy` flag or the ambient
    /// fallback; core components never resolve this themselves.
    pub convoy_id: Option<String>,
}

impl ExecContext {
    /// Resolve the execution context from the current working directory.
    ///
    /// Walks up from the working directory looking for a `.muster/`
    /// directory, then loads configuration from it.
    pub fn resolve() -> Result<Self> {
        let cwd = env::current_dir().map_err(|e| {
            MusterError::User(format!("failed to get current working directory: {}", e))
        })?;

        Self::resolve_from(&cwd)
    }

    /// Resolve the execution context from a specific directory.
    ///
    /// This is useful for testing or when the working directory is known.
    pub fn resolve_from<P: AsRef<Path>>(cwd: P) -> Result<Self> {
        let workspace_root = find_workspace_root(cwd.as_ref())?;
        let state_dir = workspace_root.join(STATE_DIR);

        let config = Config::load(state_dir.join("config.yaml"))?;
        config.validate()?;

        Ok(Self {
            workspace_root,
            state_dir,
            config,
            convoy_id: None,
        })
    }

    /// Return a copy of this context targeting the given convoy.
    pub fn with_convoy(mut self, convoy_id: impl Into<String>) -> Self {
        self.convoy_id = Some(convoy_id.into());
        self
    }

    /// The convoy id this invocation targets, or a user error telling the
    /// caller how to provide one.
    ///
    /// Use this in commands that cannot proceed without a convoy. The
    /// work-availability trigger deliberately does NOT use it: absence of
    /// a convoy there is an empty result, not an error.
    pub fn require_convoy(&self) -> Result<&str> {
        self.convoy_id.as_deref().ok_or_else(|| {
            MusterError::User(format!(
                "no convoy specified.\n\
                 Pass --convoy <id> or set the {} environment variable.",
                CONVOY_ENV_VAR
            ))
        })
    }

    /// Get the path to the config file.
    pub fn config_path(&self) -> PathBuf {
        self.state_dir.join("config.yaml")
    }

    /// Get the path to the events directory.
    pub fn events_dir(&self) -> PathBuf {
        self.state_dir.join("events")
    }

    /// Get the path to the main events log file.
    pub fn events_file(&self) -> PathBuf {
        self.events_dir().join("events.ndjson")
    }
}

/// Find the workspace root by walking up from `start` until a directory
/// containing `.muster/` is found.
fn find_workspace_root(start: &Path) -> Result<PathBuf> {
    let mut current = Some(start);

    while let Some(dir) = current {
        if dir.join(STATE_DIR).is_dir() {
            return Ok(dir.to_path_buf());
        }
        current = dir.parent();
    }

    Err(MusterError::User(format!(
        "no muster workspace found.\n\
         Expected a {} directory in '{}' or one of its parents.\n\n\
         Run `muster init` to initialize a workspace.",
        STATE_DIR,
        start.display()
    )))
}

/// Convenience function to resolve context for commands that require an
/// initialized workspace (every command except `init`).
pub fn require_workspace() -> Result<ExecContext> {
    ExecContext::resolve()
}
