//! Subprocess-backed ledger implementation.
//!
//! Provides a safe wrapper around the ledger CLI with captured
//! stdout/stderr and structured error handling. All ledger operations go
//! through [`run_ledger`]; reads request `--json` output and decode it
//! through serde, so a transport failure surfaces as `Ledger` and a
//! malformed payload as `Parse`.

use super::{
    AgentRecord, ConvoyRecord, ConvoyStatus, Ledger, TaskRecord, split_task_id, task_id,
};
use crate::agent::{AgentState, Role};
use crate::error::{MusterError, Result};
use crate::plan::{Task, TaskStatus};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::process::{Command, Output};

/// Result of a successful ledger command execution.
#[derive(Debug, Clone)]
pub struct LedgerOutput {
    /// Standard output from the command (trimmed).
    pub stdout: String,
    /// Standard error from the command (trimmed).
    pub stderr: String,
}

impl LedgerOutput {
    fn from_output(output: &Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
    }
}

/// Run a ledger command.
///
/// # Arguments
///
/// * `bin` - The ledger binary name or path
/// * `args` - The command arguments (without the binary name)
///
/// # Returns
///
/// * `Ok(LedgerOutput)` - On successful execution (exit code 0)
/// * `Err(MusterError::Ledger)` - On spawn failure or non-zero exit code
pub fn run_ledger(bin: &str, args: &[&str]) -> Result<LedgerOutput> {
    let output = Command::new(bin).args(args).output().map_err(|e| {
        MusterError::Ledger(format!(
            "failed to execute {} {}: {} (is the ledger CLI installed?)",
            bin,
            args.first().unwrap_or(&""),
            e
        ))
    })?;

    let ledger_output = LedgerOutput::from_output(&output);

    if output.status.success() {
        Ok(ledger_output)
    } else {
        let exit_code = output.status.code().unwrap_or(-1);
        let error_msg = if ledger_output.stderr.is_empty() {
            ledger_output.stdout.clone()
        } else {
            ledger_output.stderr.clone()
        };

        Err(MusterError::Ledger(format!(
            "{} {} failed (exit code {}): {}",
            bin,
            args.first().unwrap_or(&""),
            exit_code,
            error_msg
        )))
    }
}

// ============================================================================
// Wire format
// ============================================================================

/// Convoy record as emitted by `show`/`list --json`.
#[derive(Debug, Deserialize)]
struct RawConvoy {
    id: String,
    title: String,
    #[serde(default)]
    description: String,
    status: String,
    #[serde(default)]
    labels: Vec<String>,
    created_at: DateTime<Utc>,
}

/// Task record as emitted by `list --kind task --json`.
///
/// Notes are an array of `[key, value]` pairs so their order survives
/// JSON, which does not guarantee object-key ordering.
#[derive(Debug, Deserialize)]
struct RawTask {
    id: String,
    parent: String,
    section: String,
    #[serde(default)]
    description: String,
    status: String,
    #[serde(default)]
    notes: Vec<(String, String)>,
}

/// Agent record as emitted by `show`/`list --kind agent --json`.
#[derive(Debug, Deserialize)]
struct RawAgent {
    id: String,
    parent: String,
    role: String,
    state: String,
    last_activity: DateTime<Utc>,
    #[serde(default)]
    state_label: Option<String>,
}

fn parse_json<'a, T: Deserialize<'a>>(payload: &'a str, what: &str) -> Result<T> {
    serde_json::from_str(payload)
        .map_err(|e| MusterError::Parse(format!("{} payload: {}", what, e)))
}

fn convoy_from_raw(raw: RawConvoy) -> Result<ConvoyRecord> {
    let status = ConvoyStatus::parse(&raw.status)
        .ok_or_else(|| MusterError::Parse(format!("unknown convoy status '{}'", raw.status)))?;
    Ok(ConvoyRecord {
        id: raw.id,
        title: raw.title,
        description: raw.description,
        status,
        labels: raw.labels,
        created_at: raw.created_at,
    })
}

fn task_from_raw(raw: RawTask) -> Result<TaskRecord> {
    let (_, name) = split_task_id(&raw.id)
        .ok_or_else(|| MusterError::Parse(format!("malformed task id '{}'", raw.id)))?;
    let status = TaskStatus::parse(&raw.status)
        .ok_or_else(|| MusterError::Parse(format!("unknown task status '{}'", raw.status)))?;

    let mut task = Task::new(name, raw.description)
        .map_err(|e| MusterError::Parse(format!("task id '{}': {}", raw.id, e)))?;
    task.status = status;
    for (key, value) in raw.notes {
        task.notes.set(key, value);
    }

    Ok(TaskRecord {
        id: raw.id,
        convoy_id: raw.parent,
        section: raw.section,
        task,
    })
}

fn agent_from_raw(raw: RawAgent) -> Result<AgentRecord> {
    let role = Role::parse(&raw.role)
        .ok_or_else(|| MusterError::Parse(format!("unknown agent role '{}'", raw.role)))?;
    let state = AgentState::parse(&raw.state)
        .ok_or_else(|| MusterError::Parse(format!("unknown agent state '{}'", raw.state)))?;
    Ok(AgentRecord {
        id: raw.id,
        convoy_id: raw.parent,
        role,
        state,
        last_activity: raw.last_activity,
        state_label: raw.state_label,
    })
}

// ============================================================================
// CLI implementation
// ============================================================================

/// Ledger implementation backed by the external ledger CLI.
#[derive(Debug, Clone)]
pub struct CliLedger {
    bin: String,
}

impl CliLedger {
    /// Create a ledger adapter for the given binary name or path.
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    fn run(&self, args: &[&str]) -> Result<LedgerOutput> {
        run_ledger(&self.bin, args)
    }

    /// Distinguish "record absent" from transport failure on show calls.
    ///
    /// The ledger CLI reports a missing record on stderr; everything else
    /// stays a `Ledger` error.
    fn run_show(&self, id: &str, kind: &'static str, args: &[&str]) -> Result<LedgerOutput> {
        match self.run(args) {
            Ok(output) => Ok(output),
            Err(MusterError::Ledger(msg)) if msg.contains("not found") => {
                Err(MusterError::not_found(kind, id))
            }
            Err(e) => Err(e),
        }
    }
}

impl Ledger for CliLedger {
    fn create_convoy(&self, title: &str, description: &str, labels: &[String]) -> Result<String> {
        let mut args = vec!["create", "--kind", "convoy", "--title", title];
        if !description.is_empty() {
            args.extend(["--description", description]);
        }
        for label in labels {
            args.push("--label");
            args.push(label.as_str());
        }
        let output = self.run(&args)?;
        if output.stdout.is_empty() {
            return Err(MusterError::Parse(
                "create convoy returned no id".to_string(),
            ));
        }
        Ok(output.stdout)
    }

    fn show_convoy(&self, id: &str) -> Result<ConvoyRecord> {
        let output = self.run_show(id, "convoy", &["show", id, "--json"])?;
        convoy_from_raw(parse_json(&output.stdout, "convoy")?)
    }

    fn list_convoys(&self, status: Option<ConvoyStatus>) -> Result<Vec<ConvoyRecord>> {
        let mut args = vec!["list", "--kind", "convoy", "--json"];
        if let Some(status) = status {
            args.extend(["--status", status.name()]);
        }
        let output = self.run(&args)?;
        let raws: Vec<RawConvoy> = parse_json(&output.stdout, "convoy list")?;
        raws.into_iter().map(convoy_from_raw).collect()
    }

    fn update_convoy_status(&self, id: &str, status: ConvoyStatus) -> Result<()> {
        self.run(&["update", id, "--status", status.name()])?;
        Ok(())
    }

    fn close_convoy(&self, id: &str, reason: Option<&str>) -> Result<()> {
        let mut args = vec!["close", id];
        if let Some(reason) = reason {
            args.extend(["--reason", reason]);
        }
        self.run(&args)?;
        Ok(())
    }

    fn create_task(&self, convoy_id: &str, section: &str, task: &Task) -> Result<String> {
        let id = task_id(convoy_id, &task.name);
        let mut args: Vec<String> = vec![
            "create".into(),
            "--kind".into(),
            "task".into(),
            "--id".into(),
            id.clone(),
            "--parent".into(),
            convoy_id.into(),
            "--section".into(),
            section.into(),
            "--description".into(),
            task.description.clone(),
            "--status".into(),
            task.status.name().into(),
        ];
        for (key, value) in task.notes.iter() {
            args.push("--note".into());
            args.push(format!("{}={}", key, value));
        }
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run(&arg_refs)?;
        Ok(id)
    }

    fn list_tasks(&self, convoy_id: &str) -> Result<Vec<TaskRecord>> {
        let output = self.run(&["list", "--kind", "task", "--parent", convoy_id, "--json"])?;
        let raws: Vec<RawTask> = parse_json(&output.stdout, "task list")?;
        raws.into_iter().map(task_from_raw).collect()
    }

    fn save_task(&self, convoy_id: &str, task: &Task) -> Result<()> {
        let id = task_id(convoy_id, &task.name);
        let mut args: Vec<String> = vec![
            "update".into(),
            id,
            "--status".into(),
            task.status.name().into(),
        ];
        for (key, value) in task.notes.iter() {
            args.push("--note".into());
            args.push(format!("{}={}", key, value));
        }
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run(&arg_refs)?;
        Ok(())
    }

    fn ready_tasks(&self, convoy_id: &str) -> Result<Vec<Task>> {
        let output = self.run(&["ready", "--parent", convoy_id, "--json"])?;
        let raws: Vec<RawTask> = parse_json(&output.stdout, "ready list")?;
        // The store already applied the readiness rule; this side only
        // decodes the records.
        raws.into_iter()
            .map(|raw| task_from_raw(raw).map(|r| r.task))
            .collect()
    }

    fn comment(&self, id: &str, text: &str) -> Result<()> {
        self.run(&["comment", id, text])?;
        Ok(())
    }

    fn create_agent(&self, convoy_id: &str, role: Role) -> Result<String> {
        let output = self.run(&[
            "create",
            "--kind",
            "agent",
            "--parent",
            convoy_id,
            "--role",
            role.name(),
            "--state",
            AgentState::Idle.name(),
        ])?;
        if output.stdout.is_empty() {
            return Err(MusterError::Parse("create agent returned no id".to_string()));
        }
        Ok(output.stdout)
    }

    fn show_agent(&self, id: &str) -> Result<AgentRecord> {
        let output = self.run_show(id, "agent", &["show", id, "--json"])?;
        agent_from_raw(parse_json(&output.stdout, "agent")?)
    }

    fn list_agents(&self, convoy_id: Option<&str>) -> Result<Vec<AgentRecord>> {
        let mut args = vec!["list", "--kind", "agent", "--json"];
        if let Some(convoy_id) = convoy_id {
            args.extend(["--parent", convoy_id]);
        }
        let output = self.run(&args)?;
        let raws: Vec<RawAgent> = parse_json(&output.stdout, "agent list")?;
        raws.into_iter().map(agent_from_raw).collect()
    }

    fn set_agent_state(&self, id: &str, state: AgentState) -> Result<()> {
        self.run(&["agent-state", id, state.name()])?;
        Ok(())
    }

    fn set_agent_label(&self, id: &str, label: &str) -> Result<()> {
        self.run(&["update", id, "--state-label", label])?;
        Ok(())
    }

    fn touch_agent(&self, id: &str) -> Result<()> {
        self.run(&["touch", id])?;
        Ok(())
    }

    fn slot_get(&self, agent_id: &str, name: &str) -> Result<Option<String>> {
        let output = self.run(&["slot", "get", agent_id, name])?;
        if output.stdout.is_empty() {
            Ok(None)
        } else {
            Ok(Some(output.stdout))
        }
    }

    fn slot_set(&self, agent_id: &str, name: &str, value: &str) -> Result<()> {
        self.run(&["slot", "set", agent_id, name, value])?;
        Ok(())
    }

    fn slot_clear(&self, agent_id: &str, name: &str) -> Result<()> {
        self.run(&["slot", "clear", agent_id, name])?;
        Ok(())
    }
}
