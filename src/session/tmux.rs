//! tmux-backed session manager.
//!
//! Provides a safe wrapper around tmux commands with captured output and
//! structured error handling, mirroring the ledger CLI wrapper. A
//! non-zero exit from `has-session` is "no such session", not an error;
//! every other non-zero exit surfaces as `MusterError::Launch`.

use super::{SessionManager, SplitDirection};
use crate::error::{MusterError, Result};
use std::process::{Command, Output};

/// Session manager backed by the `tmux` binary.
#[derive(Debug, Clone, Default)]
pub struct TmuxSessions;

impl TmuxSessions {
    /// Create a tmux-backed session manager.
    pub fn new() -> Self {
        Self
    }
}

fn run_tmux(args: &[&str]) -> Result<Output> {
    Command::new("tmux").args(args).output().map_err(|e| {
        MusterError::Launch(format!(
            "failed to execute tmux {}: {} (is tmux installed?)",
            args.first().unwrap_or(&""),
            e
        ))
    })
}

fn check_status(args: &[&str], output: &Output) -> Result<()> {
    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    Err(MusterError::Launch(format!(
        "tmux {} failed (exit code {}): {}",
        args.first().unwrap_or(&""),
        output.status.code().unwrap_or(-1),
        stderr
    )))
}

impl SessionManager for TmuxSessions {
    fn session_exists(&self, name: &str) -> Result<bool> {
        // `has-session` exits non-zero when the session is absent; only a
        // spawn failure is an actual error here.
        let output = run_tmux(&["has-session", "-t", name])?;
        Ok(output.status.success())
    }

    fn create_session(&self, name: &str, command: &str) -> Result<()> {
        let args = ["new-session", "-d", "-s", name, command];
        let output = run_tmux(&args)?;
        check_status(&args, &output)
    }

    fn split_pane(&self, name: &str, command: &str, direction: SplitDirection) -> Result<()> {
        let flag = match direction {
            SplitDirection::Horizontal => "-v",
            SplitDirection::Vertical => "-h",
        };
        let args = ["split-window", flag, "-t", name, command];
        let output = run_tmux(&args)?;
        check_status(&args, &output)
    }

    fn kill_session(&self, name: &str) -> Result<()> {
        let args = ["kill-session", "-t", name];
        let output = run_tmux(&args)?;
        check_status(&args, &output)
    }

    fn list_sessions(&self) -> Result<Vec<String>> {
        let args = ["list-sessions", "-F", "#{session_name}"];
        let output = run_tmux(&args)?;

        // tmux exits non-zero when no server is running; that simply
        // means there are no sessions.
        if !output.status.success() {
            return Ok(Vec::new());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }
}
