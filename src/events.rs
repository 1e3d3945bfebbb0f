//! Event logging subsystem for muster.
//!
//! This module implements append-only event logging to support audit and
//! reconstruction of scheduling decisions. Events are stored in NDJSON
//! format (one JSON object per line) in `.muster/events/events.ndjson`.
//!
//! # Event Format
//!
//! Each event is a JSON object with the following fields:
//! - `ts`: RFC3339 timestamp
//! - `action`: The action performed (schedule, launch, respawn, etc.)
//! - `actor`: The owner string (e.g., `user@HOST`)
//! - `convoy`: Optional convoy ID
//! - `task`: Optional task name for task-specific events
//! - `agent`: Optional agent ID for agent-specific events
//! - `details`: Freeform object with action-specific details
//!
//! Event logging is ambient observability, not durable state: the ledger
//! remains the source of truth, and a failed append in a non-critical path
//! degrades to a warning at the call site.

use crate::context::ExecContext;
use crate::error::{MusterError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;

/// Actions that can be logged as events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    /// Workspace initialization
    Init,
    /// Convoy created
    ConvoyNew,
    /// Convoy closed
    ConvoyClose,
    /// Scheduling pass ran
    Schedule,
    /// Worker launch requested
    Launch,
    /// Worker launch failed (task moved to Blocked)
    LaunchFailed,
    /// Task completed
    Complete,
    /// Work-availability trigger acted
    Trigger,
    /// Checkpoint recorded ahead of a respawn
    Checkpoint,
    /// Agent respawned into a fresh instance
    Respawn,
    /// Respawn launch failed (agent moved to Dead)
    RespawnFailed,
}

impl std::fmt::Display for EventAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventAction::Init => write!(f, "init"),
            EventAction::ConvoyNew => write!(f, "convoy_new"),
            EventAction::ConvoyClose => write!(f, "convoy_close"),
            EventAction::Schedule => write!(f, "schedule"),
            EventAction::Launch => write!(f, "launch"),
            EventAction::LaunchFailed => write!(f, "launch_failed"),
            EventAction::Complete => write!(f, "complete"),
            EventAction::Trigger => write!(f, "trigger"),
            EventAction::Checkpoint => write!(f, "checkpoint"),
            EventAction::Respawn => write!(f, "respawn"),
            EventAction::RespawnFailed => write!(f, "respawn_failed"),
        }
    }
}

/// An event record for the audit log.
///
/// Events are serialized as single-line JSON objects and appended to
/// the events.ndjson file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// RFC3339 timestamp when the event occurred.
    pub ts: DateTime<Utc>,

    /// The action that was performed.
    pub action: EventAction,

    /// The actor who performed the action (e.g., `user@HOST`).
    pub actor: String,

    /// Optional convoy ID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub convoy: Option<String>,

    /// Optional task name for task-specific events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,

    /// Optional agent ID for agent-specific events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,

    /// Freeform details object with action-specific information.
    pub details: Value,
}

impl Event {
    /// Create a new event with the given action.
    ///
    /// The timestamp is set to the current time, and the actor is
    /// determined from the environment (USER@HOSTNAME).
    pub fn new(action: EventAction) -> Self {
        Self {
            ts: Utc::now(),
            action,
            actor: get_actor_string(),
            convoy: None,
            task: None,
            agent: None,
            details: Value::Object(serde_json::Map::new()),
        }
    }

    /// Set the convoy ID for this event.
    pub fn with_convoy(mut self, convoy_id: impl Into<String>) -> Self {
        self.convoy = Some(convoy_id.into());
        self
    }

    /// Set the task name for this event.
    pub fn with_task(mut self, task: impl Into<String>) -> Self {
        self.task = Some(task.into());
        self
    }

    /// Set the agent ID for this event.
    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent = Some(agent_id.into());
        self
    }

    /// Set the details object for this event.
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    /// Serialize the event to a single-line JSON string.
    pub fn to_ndjson_line(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| MusterError::User(format!("failed to serialize event to JSON: {}", e)))
    }
}

/// Get the actor string for event metadata.
fn get_actor_string() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    format!("{}@{}", user, host)
}

/// Append an event to the events log.
///
/// Appends the event as a single JSON line to the events.ndjson file,
/// creating the file and its directory if needed.
pub fn append_event(ctx: &ExecContext, event: &Event) -> Result<()> {
    let events_file = ctx.events_file();
    let json_line = event.to_ndjson_line()?;

    let events_dir = ctx.events_dir();
    if !events_dir.exists() {
        fs::create_dir_all(&events_dir).map_err(|e| {
            MusterError::User(format!(
                "failed to create events directory '{}': {}",
                events_dir.display(),
                e
            ))
        })?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&events_file)
        .map_err(|e| {
            MusterError::User(format!(
                "failed to open events file '{}': {}",
                events_file.display(),
                e
            ))
        })?;

    writeln!(file, "{}", json_line).map_err(|e| {
        MusterError::User(format!(
            "failed to write event to '{}': {}",
            events_file.display(),
            e
        ))
    })?;

    file.sync_all().map_err(|e| {
        MusterError::User(format!(
            "failed to sync events file '{}': {}",
            events_file.display(),
            e
        ))
    })?;

    Ok(())
}

/// Append an event, downgrading any failure to a warning on stderr.
///
/// Use this at call sites where the state transition has already been
/// persisted and losing the audit line must not fail the operation.
pub fn append_event_best_effort(ctx: &ExecContext, event: &Event) {
    if let Err(e) = append_event(ctx, event) {
        eprintln!("Warning: failed to log {} event: {}", event.action, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::workspace_fixture;
    use serde_json::json;

    #[test]
    fn event_builder_sets_fields() {
        let event = Event::new(EventAction::Schedule)
            .with_convoy("cv-1")
            .with_task("worker-2")
            .with_agent("ag-7")
            .with_details(json!({"admitted": 2}));

        assert_eq!(event.action, EventAction::Schedule);
        assert_eq!(event.convoy.as_deref(), Some("cv-1"));
        assert_eq!(event.task.as_deref(), Some("worker-2"));
        assert_eq!(event.agent.as_deref(), Some("ag-7"));
        assert!(event.actor.contains('@'));
    }

    #[test]
    fn ndjson_line_is_single_line() {
        let event = Event::new(EventAction::Launch).with_details(json!({
            "session": "muster-cv-1",
            "role": "worker",
        }));

        let line = event.to_ndjson_line().unwrap();
        assert!(!line.contains('\n'));
        assert!(line.contains("\"launch\""));
    }

    #[test]
    fn optional_ids_are_omitted_when_absent() {
        let event = Event::new(EventAction::Init);
        let line = event.to_ndjson_line().unwrap();
        assert!(!line.contains("\"convoy\""));
        assert!(!line.contains("\"task\""));
        assert!(!line.contains("\"agent\""));
    }

    #[test]
    fn append_event_creates_file_and_appends() {
        let (_tmp, ctx) = workspace_fixture();

        let first = Event::new(EventAction::ConvoyNew).with_convoy("cv-1");
        let second = Event::new(EventAction::Schedule).with_convoy("cv-1");
        append_event(&ctx, &first).unwrap();
        append_event(&ctx, &second).unwrap();

        let content = std::fs::read_to_string(ctx.events_file()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: Event = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed.action, EventAction::ConvoyNew);
        let parsed: Event = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(parsed.action, EventAction::Schedule);
    }

    #[test]
    fn action_display_matches_serde() {
        let event = Event::new(EventAction::LaunchFailed);
        let line = event.to_ndjson_line().unwrap();
        assert!(line.contains(&format!("\"{}\"", EventAction::LaunchFailed)));
    }
}
