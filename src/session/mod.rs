//! Terminal-session manager adapter for muster.
//!
//! Worker processes live in externally managed tmux sessions; this module
//! is the typed boundary to that world. The core depends only on the
//! [`SessionManager`] trait, so tests substitute the recording fake in
//! `test_support` and never touch a real terminal.

pub mod tmux;

use crate::error::Result;

/// Direction for splitting a pane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitDirection {
    /// Split into top/bottom panes.
    Horizontal,
    /// Split into left/right panes.
    Vertical,
}

/// Typed access to the terminal-session manager.
///
/// Every operation is a blocking round-trip; failures surface as
/// `MusterError::Launch` and are recoverable at the call site (the task
/// moves to Blocked or the agent to Dead, the convoy continues).
pub trait SessionManager {
    /// Whether a session with this name exists.
    fn session_exists(&self, name: &str) -> Result<bool>;

    /// Create a detached session running the given shell command.
    fn create_session(&self, name: &str, command: &str) -> Result<()>;

    /// Split a pane in an existing session, running the given command in
    /// the new pane.
    fn split_pane(&self, name: &str, command: &str, direction: SplitDirection) -> Result<()>;

    /// Kill a session.
    fn kill_session(&self, name: &str) -> Result<()>;

    /// List the names of all live sessions.
    fn list_sessions(&self) -> Result<Vec<String>>;
}

/// The session name muster uses for a convoy's agent.
///
/// Session names must be unique per live process, so the agent id (not
/// the role) goes into the name: a respawned agent reuses its id and
/// therefore reclaims the same session identity.
pub fn session_name(prefix: &str, convoy_id: &str, agent_id: &str) -> String {
    format!("{}-{}-{}", prefix, convoy_id, agent_id)
}

/// The session name prefix shared by every agent of a convoy.
pub fn convoy_session_prefix(prefix: &str, convoy_id: &str) -> String {
    format!("{}-{}-", prefix, convoy_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_names_embed_convoy_and_agent() {
        let name = session_name("muster", "cv-7", "ag-3");
        assert_eq!(name, "muster-cv-7-ag-3");
        assert!(name.starts_with(&convoy_session_prefix("muster", "cv-7")));
    }

    #[test]
    fn different_agents_get_different_sessions() {
        let a = session_name("muster", "cv-7", "ag-1");
        let b = session_name("muster", "cv-7", "ag-2");
        assert_ne!(a, b);
    }
}
