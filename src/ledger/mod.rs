//! Task ledger adapter for muster.
//!
//! The ledger is the external durable store of convoys, tasks, agents,
//! and comments. This module is a typed access layer over it, not a store
//! itself: every other component depends on the [`Ledger`] trait and never
//! on the store's transport, which keeps the core testable against the
//! in-memory fake in `test_support`.
//!
//! The production implementation ([`cli::CliLedger`]) shells out to the
//! ledger CLI configured as `ledger_bin` and parses its JSON output.
//!
//! Task ledger ids are deterministic: `<convoy-id>/<task-name>`. Slot
//! values and checkpoint comments carry these ids, so any component can
//! address a task without re-deriving its convoy.

pub mod cli;

use crate::agent::{AgentState, Role};
use crate::error::Result;
use crate::plan::{Notes, Plan, Section, Task};
use chrono::{DateTime, Utc};

/// Status of a convoy. Closed is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvoyStatus {
    /// Created, not yet executing.
    Open,
    /// Actively executing tasks.
    InProgress,
    /// Finished or abandoned; never reopened.
    Closed,
}

impl ConvoyStatus {
    /// The lowercase name of this status.
    pub fn name(self) -> &'static str {
        match self {
            ConvoyStatus::Open => "open",
            ConvoyStatus::InProgress => "in_progress",
            ConvoyStatus::Closed => "closed",
        }
    }

    /// Parse a status from its lowercase name.
    pub fn parse(s: &str) -> Option<ConvoyStatus> {
        match s.to_ascii_lowercase().as_str() {
            "open" => Some(ConvoyStatus::Open),
            "in_progress" => Some(ConvoyStatus::InProgress),
            "closed" => Some(ConvoyStatus::Closed),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConvoyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A convoy record as stored in the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvoyRecord {
    /// Ledger-assigned convoy id.
    pub id: String,
    /// Human-readable title.
    pub title: String,
    /// Freeform description of the unit of work.
    pub description: String,
    /// Current status.
    pub status: ConvoyStatus,
    /// Labels carrying out-of-band configuration.
    pub labels: Vec<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Label prefix for the worker-count ceiling.
const MAX_WORKERS_LABEL: &str = "max-workers:";
/// Label prefix for the convoy mode.
const MODE_LABEL: &str = "mode:";
/// Label prefix for the external context path.
const CONTEXT_LABEL: &str = "context:";

impl ConvoyRecord {
    /// The worker-count ceiling from the `max-workers:<n>` label.
    ///
    /// Falls back to `default` when the label is absent or malformed;
    /// a bad label must never stall a convoy.
    pub fn max_workers(&self, default: u32) -> u32 {
        self.label_value(MAX_WORKERS_LABEL)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// The mode name from the `mode:<name>` label.
    pub fn mode(&self) -> Option<&str> {
        self.label_value(MODE_LABEL)
    }

    /// The external context path from the `context:<path>` label.
    pub fn context_path(&self) -> Option<&str> {
        self.label_value(CONTEXT_LABEL)
    }

    fn label_value(&self, prefix: &str) -> Option<&str> {
        self.labels
            .iter()
            .find_map(|l| l.strip_prefix(prefix))
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    /// Build the label set for a new convoy.
    pub fn build_labels(
        max_workers: u32,
        mode: &str,
        context_path: Option<&str>,
    ) -> Vec<String> {
        let mut labels = vec![
            format!("{}{}", MAX_WORKERS_LABEL, max_workers),
            format!("{}{}", MODE_LABEL, mode),
        ];
        if let Some(path) = context_path {
            labels.push(format!("{}{}", CONTEXT_LABEL, path));
        }
        labels
    }
}

/// A task record as stored in the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRecord {
    /// Ledger task id: `<convoy-id>/<task-name>`.
    pub id: String,
    /// Owning convoy.
    pub convoy_id: String,
    /// Section of the plan this task belongs to.
    pub section: String,
    /// The task itself.
    pub task: Task,
}

/// An agent record as stored in the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentRecord {
    /// Ledger-assigned agent id.
    pub id: String,
    /// Owning convoy.
    pub convoy_id: String,
    /// The agent's role.
    pub role: Role,
    /// Current lifecycle state.
    pub state: AgentState,
    /// Timestamp of the last heartbeat or state change.
    pub last_activity: DateTime<Utc>,
    /// Auxiliary state label (e.g. `context=42%`), if set.
    pub state_label: Option<String>,
}

/// Deterministic ledger id for a task.
pub fn task_id(convoy_id: &str, task_name: &str) -> String {
    format!("{}/{}", convoy_id, task_name)
}

/// Split a ledger task id back into convoy id and task name.
pub fn split_task_id(id: &str) -> Option<(&str, &str)> {
    id.split_once('/')
}

/// Typed access to the external ledger.
///
/// Mutations are fire-and-forget (`Result<()>`) except creates, which
/// return the new id. "Show" style reads fail with `NotFound` when the
/// record is absent; list operations return records in creation order.
pub trait Ledger {
    // -- convoys ------------------------------------------------------------

    /// Create a convoy, returning its id.
    fn create_convoy(&self, title: &str, description: &str, labels: &[String]) -> Result<String>;

    /// Fetch a single convoy or fail `NotFound`.
    fn show_convoy(&self, id: &str) -> Result<ConvoyRecord>;

    /// List convoys, optionally filtered by status, in creation order.
    fn list_convoys(&self, status: Option<ConvoyStatus>) -> Result<Vec<ConvoyRecord>>;

    /// Update a convoy's status.
    fn update_convoy_status(&self, id: &str, status: ConvoyStatus) -> Result<()>;

    /// Close a convoy with an optional reason. Closed is terminal.
    fn close_convoy(&self, id: &str, reason: Option<&str>) -> Result<()>;

    // -- tasks --------------------------------------------------------------

    /// Create a task under a convoy, returning its ledger id.
    fn create_task(&self, convoy_id: &str, section: &str, task: &Task) -> Result<String>;

    /// List a convoy's task records in creation order.
    fn list_tasks(&self, convoy_id: &str) -> Result<Vec<TaskRecord>>;

    /// Persist a task's status and notes.
    fn save_task(&self, convoy_id: &str, task: &Task) -> Result<()>;

    /// The store's own view of ready tasks for a convoy: Pending tasks
    /// whose dependencies are all Completed, in creation order.
    fn ready_tasks(&self, convoy_id: &str) -> Result<Vec<Task>>;

    // -- comments -----------------------------------------------------------

    /// Append a comment to a convoy, task, or agent record.
    fn comment(&self, id: &str, text: &str) -> Result<()>;

    // -- agents -------------------------------------------------------------

    /// Create an agent record in the Idle state, returning its id.
    fn create_agent(&self, convoy_id: &str, role: Role) -> Result<String>;

    /// Fetch a single agent or fail `NotFound`.
    fn show_agent(&self, id: &str) -> Result<AgentRecord>;

    /// List agents, optionally restricted to a convoy, in creation order.
    fn list_agents(&self, convoy_id: Option<&str>) -> Result<Vec<AgentRecord>>;

    /// Set an agent's lifecycle state.
    fn set_agent_state(&self, id: &str, state: AgentState) -> Result<()>;

    /// Set an agent's auxiliary state label.
    fn set_agent_label(&self, id: &str, label: &str) -> Result<()>;

    /// Update an agent's last-activity timestamp (heartbeat).
    fn touch_agent(&self, id: &str) -> Result<()>;

    // -- slots --------------------------------------------------------------

    /// Read a slot value.
    fn slot_get(&self, agent_id: &str, name: &str) -> Result<Option<String>>;

    /// Set a slot value (single value, last-write-wins).
    fn slot_set(&self, agent_id: &str, name: &str, value: &str) -> Result<()>;

    /// Clear a slot.
    fn slot_clear(&self, agent_id: &str, name: &str) -> Result<()>;
}

/// Reassemble a convoy's plan from its ledger task records.
///
/// Sections appear in order of first appearance; tasks keep creation
/// order. The meta map carries the convoy id and title, so a plan
/// serialized from this reconstruction parses back identically.
pub fn assemble_plan(convoy: &ConvoyRecord, records: &[TaskRecord]) -> Plan {
    let mut meta = Notes::new();
    meta.set("convoy", &convoy.id);
    meta.set("title", &convoy.title);

    let mut sections: Vec<Section> = Vec::new();
    for record in records {
        match sections.iter_mut().find(|s| s.name == record.section) {
            Some(section) => section.tasks.push(record.task.clone()),
            None => sections.push(Section {
                name: record.section.clone(),
                tasks: vec![record.task.clone()],
            }),
        }
    }

    Plan { meta, sections }
}

/// Compute the store-side ready set from task records.
///
/// Shared by ledger implementations so the fake and the CLI parser agree
/// on the semantics: Pending tasks whose dependencies are all Completed.
pub fn ready_from_records(records: &[TaskRecord]) -> Vec<Task> {
    let tasks: Vec<&Task> = records.iter().map(|r| &r.task).collect();
    crate::graph::ready_set(&tasks)
        .into_iter()
        .cloned()
        .collect()
}
