//! Command implementations for muster.
//!
//! This module provides the dispatcher that routes CLI commands to their
//! implementations. It is also the ONLY place where the ambient
//! `MUSTER_CONVOY` environment variable is consulted: the fallback
//! happens here at the dispatch boundary, and everything below receives
//! the convoy id explicitly through the execution context.

mod agent;
mod check;
mod complete;
mod convoy;
mod init;
mod schedule;
mod status;

use crate::cli::{AgentAction, Command, ConvoyAction};
use crate::context::{CONVOY_ENV_VAR, ExecContext, require_workspace};
use crate::error::Result;

/// Dispatch a command to its implementation.
pub fn dispatch(command: Command) -> Result<()> {
    match command {
        Command::Init => init::cmd_init(),
        Command::Convoy(cmd) => match cmd.action {
            ConvoyAction::New(args) => convoy::cmd_new(args),
            ConvoyAction::Close(args) => convoy::cmd_close(args),
        },
        Command::Schedule(args) => schedule::cmd_schedule(args),
        Command::Complete(args) => complete::cmd_complete(args),
        Command::Check(args) => check::cmd_check(args),
        Command::Status(args) => status::cmd_status(args),
        Command::Agent(cmd) => match cmd.action {
            AgentAction::Spawn(args) => agent::cmd_spawn(args),
            AgentAction::Heartbeat(args) => agent::cmd_heartbeat(args),
            AgentAction::RespawnCheck(args) => agent::cmd_respawn_check(args),
            AgentAction::Respawn(args) => agent::cmd_respawn(args),
        },
    }
}

/// Resolve the target convoy: the explicit `--convoy` flag, else the
/// ambient `MUSTER_CONVOY` environment variable.
///
/// This fallback exists only at this boundary; core components never
/// read the environment.
pub(crate) fn resolve_convoy(explicit: Option<String>) -> Option<String> {
    explicit.or_else(|| {
        std::env::var(CONVOY_ENV_VAR)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

/// Resolve the workspace context, targeting the convoy from the flag or
/// the ambient fallback when either is present.
pub(crate) fn target_context(convoy_flag: Option<String>) -> Result<ExecContext> {
    let ctx = require_workspace()?;
    Ok(match resolve_convoy(convoy_flag) {
        Some(id) => ctx.with_convoy(id),
        None => ctx,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn explicit_convoy_wins_over_ambient() {
        // SAFETY: guarded by #[serial]; no other test observes this
        // variable concurrently.
        unsafe { std::env::set_var(CONVOY_ENV_VAR, "cv-ambient") };
        let resolved = resolve_convoy(Some("cv-explicit".to_string()));
        unsafe { std::env::remove_var(CONVOY_ENV_VAR) };
        assert_eq!(resolved.as_deref(), Some("cv-explicit"));
    }

    #[test]
    #[serial]
    fn ambient_fallback_applies_when_no_flag() {
        unsafe { std::env::set_var(CONVOY_ENV_VAR, "cv-ambient") };
        let resolved = resolve_convoy(None);
        unsafe { std::env::remove_var(CONVOY_ENV_VAR) };
        assert_eq!(resolved.as_deref(), Some("cv-ambient"));
    }

    #[test]
    #[serial]
    fn empty_ambient_value_is_ignored() {
        unsafe { std::env::set_var(CONVOY_ENV_VAR, "  ") };
        let resolved = resolve_convoy(None);
        unsafe { std::env::remove_var(CONVOY_ENV_VAR) };
        assert_eq!(resolved, None);
    }

    #[test]
    #[serial]
    fn no_flag_and_no_ambient_is_none() {
        unsafe { std::env::remove_var(CONVOY_ENV_VAR) };
        assert_eq!(resolve_convoy(None), None);
    }
}
