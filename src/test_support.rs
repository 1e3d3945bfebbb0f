//! Shared test fixtures: in-memory fakes for the ledger and session
//! manager, and workspace scaffolding.
//!
//! The fakes implement the same adapter traits production code uses, so
//! every core component is exercised against the identical interface it
//! sees in production, minus the subprocess round-trips.

use crate::agent::{AgentState, Role};
use crate::config::Config;
use crate::context::{ExecContext, STATE_DIR};
use crate::error::{MusterError, Result};
use crate::ledger::{
    AgentRecord, ConvoyRecord, ConvoyStatus, Ledger, TaskRecord, ready_from_records, task_id,
};
use crate::plan::Task;
use crate::session::{SessionManager, SplitDirection};
use chrono::Utc;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, Mutex, MutexGuard};
use tempfile::TempDir;

// ============================================================================
// Workspace scaffolding
// ============================================================================

/// Create a temporary initialized workspace and resolve its context.
pub(crate) fn workspace_fixture() -> (TempDir, ExecContext) {
    let temp_dir = TempDir::new().unwrap();
    std::fs::create_dir_all(temp_dir.path().join(STATE_DIR)).unwrap();
    let ctx = ExecContext::resolve_from(temp_dir.path()).unwrap();
    (temp_dir, ctx)
}

/// A context rooted at the given directory with the given config,
/// without touching the filesystem.
pub(crate) fn context_with_config(root: &Path, config: Config) -> ExecContext {
    ExecContext {
        workspace_root: root.to_path_buf(),
        state_dir: root.join(STATE_DIR),
        config,
        convoy_id: None,
    }
}

static CWD_LOCK: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

/// RAII guard that changes the process working directory for a test.
pub(crate) struct DirGuard {
    original: PathBuf,
    _lock: MutexGuard<'static, ()>,
}

impl DirGuard {
    pub(crate) fn new(new_dir: &Path) -> Self {
        // Changing the process current working directory is global and not
        // thread-safe. Lock it so tests don't race even if a #[serial]
        // annotation is missed.
        let lock = CWD_LOCK.lock().unwrap_or_else(|poison| poison.into_inner());
        let original = std::env::current_dir().unwrap();
        std::env::set_current_dir(new_dir).unwrap();
        Self {
            original,
            _lock: lock,
        }
    }
}

impl Drop for DirGuard {
    fn drop(&mut self) {
        let _ = std::env::set_current_dir(&self.original);
    }
}

// ============================================================================
// Fake ledger
// ============================================================================

#[derive(Default)]
struct LedgerState {
    convoys: Vec<ConvoyRecord>,
    tasks: Vec<TaskRecord>,
    agents: Vec<AgentRecord>,
    slots: HashMap<(String, String), String>,
    comments: HashMap<String, Vec<String>>,
    next_id: u32,
}

/// In-memory ledger implementing the full adapter trait.
#[derive(Default)]
pub(crate) struct FakeLedger {
    state: RefCell<LedgerState>,
    /// When set, every read operation fails with a transport error.
    /// Used to exercise fail-open/degraded paths.
    fail_reads: Cell<bool>,
}

impl FakeLedger {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Make every read operation fail with a `Ledger` transport error.
    pub(crate) fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.set(fail);
    }

    fn check_reads(&self) -> Result<()> {
        if self.fail_reads.get() {
            Err(MusterError::Ledger(
                "simulated transport failure".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    fn next_id(&self, prefix: &str) -> String {
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        format!("{}-{}", prefix, state.next_id)
    }

    /// Seed an Open convoy, returning its id.
    pub(crate) fn seed_convoy(&self, title: &str, labels: &[&str]) -> String {
        let id = self.next_id("cv");
        self.state.borrow_mut().convoys.push(ConvoyRecord {
            id: id.clone(),
            title: title.to_string(),
            description: String::new(),
            status: ConvoyStatus::Open,
            labels: labels.iter().map(|s| s.to_string()).collect(),
            created_at: Utc::now(),
        });
        id
    }

    /// Seed a task under a convoy.
    pub(crate) fn seed_task(&self, convoy_id: &str, section: &str, task: Task) {
        let id = task_id(convoy_id, &task.name);
        self.state.borrow_mut().tasks.push(TaskRecord {
            id,
            convoy_id: convoy_id.to_string(),
            section: section.to_string(),
            task,
        });
    }

    /// Seed an agent in the given state, returning its id.
    pub(crate) fn seed_agent(&self, convoy_id: &str, role: Role, state: AgentState) -> String {
        let id = self.next_id("ag");
        self.state.borrow_mut().agents.push(AgentRecord {
            id: id.clone(),
            convoy_id: convoy_id.to_string(),
            role,
            state,
            last_activity: Utc::now(),
            state_label: None,
        });
        id
    }

    /// All comments recorded against a ledger id.
    pub(crate) fn comments_for(&self, id: &str) -> Vec<String> {
        self.state
            .borrow()
            .comments
            .get(id)
            .cloned()
            .unwrap_or_default()
    }

    /// Fetch a stored task by convoy and name.
    pub(crate) fn task(&self, convoy_id: &str, name: &str) -> Option<Task> {
        let wanted = task_id(convoy_id, name);
        self.state
            .borrow()
            .tasks
            .iter()
            .find(|r| r.id == wanted)
            .map(|r| r.task.clone())
    }
}

impl Ledger for FakeLedger {
    fn create_convoy(&self, title: &str, description: &str, labels: &[String]) -> Result<String> {
        let id = self.next_id("cv");
        self.state.borrow_mut().convoys.push(ConvoyRecord {
            id: id.clone(),
            title: title.to_string(),
            description: description.to_string(),
            status: ConvoyStatus::Open,
            labels: labels.to_vec(),
            created_at: Utc::now(),
        });
        Ok(id)
    }

    fn show_convoy(&self, id: &str) -> Result<ConvoyRecord> {
        self.check_reads()?;
        self.state
            .borrow()
            .convoys
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| MusterError::not_found("convoy", id))
    }

    fn list_convoys(&self, status: Option<ConvoyStatus>) -> Result<Vec<ConvoyRecord>> {
        self.check_reads()?;
        Ok(self
            .state
            .borrow()
            .convoys
            .iter()
            .filter(|c| status.is_none_or(|s| c.status == s))
            .cloned()
            .collect())
    }

    fn update_convoy_status(&self, id: &str, status: ConvoyStatus) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let convoy = state
            .convoys
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| MusterError::not_found("convoy", id))?;
        convoy.status = status;
        Ok(())
    }

    fn close_convoy(&self, id: &str, _reason: Option<&str>) -> Result<()> {
        self.update_convoy_status(id, ConvoyStatus::Closed)
    }

    fn create_task(&self, convoy_id: &str, section: &str, task: &Task) -> Result<String> {
        let id = task_id(convoy_id, &task.name);
        let mut state = self.state.borrow_mut();
        if state.tasks.iter().any(|r| r.id == id) {
            return Err(MusterError::Ledger(format!("task '{}' already exists", id)));
        }
        state.tasks.push(TaskRecord {
            id: id.clone(),
            convoy_id: convoy_id.to_string(),
            section: section.to_string(),
            task: task.clone(),
        });
        Ok(id)
    }

    fn list_tasks(&self, convoy_id: &str) -> Result<Vec<TaskRecord>> {
        self.check_reads()?;
        Ok(self
            .state
            .borrow()
            .tasks
            .iter()
            .filter(|r| r.convoy_id == convoy_id)
            .cloned()
            .collect())
    }

    fn save_task(&self, convoy_id: &str, task: &Task) -> Result<()> {
        let id = task_id(convoy_id, &task.name);
        let mut state = self.state.borrow_mut();
        let record = state
            .tasks
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| MusterError::not_found("task", id.as_str()))?;
        record.task = task.clone();
        Ok(())
    }

    fn ready_tasks(&self, convoy_id: &str) -> Result<Vec<Task>> {
        self.check_reads()?;
        let state = self.state.borrow();
        let records: Vec<TaskRecord> = state
            .tasks
            .iter()
            .filter(|r| r.convoy_id == convoy_id)
            .cloned()
            .collect();
        Ok(ready_from_records(&records))
    }

    fn comment(&self, id: &str, text: &str) -> Result<()> {
        self.state
            .borrow_mut()
            .comments
            .entry(id.to_string())
            .or_default()
            .push(text.to_string());
        Ok(())
    }

    fn create_agent(&self, convoy_id: &str, role: Role) -> Result<String> {
        let id = self.next_id("ag");
        self.state.borrow_mut().agents.push(AgentRecord {
            id: id.clone(),
            convoy_id: convoy_id.to_string(),
            role,
            state: AgentState::Idle,
            last_activity: Utc::now(),
            state_label: None,
        });
        Ok(id)
    }

    fn show_agent(&self, id: &str) -> Result<AgentRecord> {
        self.check_reads()?;
        self.state
            .borrow()
            .agents
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .ok_or_else(|| MusterError::not_found("agent", id))
    }

    fn list_agents(&self, convoy_id: Option<&str>) -> Result<Vec<AgentRecord>> {
        self.check_reads()?;
        Ok(self
            .state
            .borrow()
            .agents
            .iter()
            .filter(|a| convoy_id.is_none_or(|c| a.convoy_id == c))
            .cloned()
            .collect())
    }

    fn set_agent_state(&self, id: &str, agent_state: AgentState) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let agent = state
            .agents
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| MusterError::not_found("agent", id))?;
        agent.state = agent_state;
        agent.last_activity = Utc::now();
        Ok(())
    }

    fn set_agent_label(&self, id: &str, label: &str) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let agent = state
            .agents
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| MusterError::not_found("agent", id))?;
        agent.state_label = Some(label.to_string());
        Ok(())
    }

    fn touch_agent(&self, id: &str) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let agent = state
            .agents
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| MusterError::not_found("agent", id))?;
        agent.last_activity = Utc::now();
        Ok(())
    }

    fn slot_get(&self, agent_id: &str, name: &str) -> Result<Option<String>> {
        self.check_reads()?;
        Ok(self
            .state
            .borrow()
            .slots
            .get(&(agent_id.to_string(), name.to_string()))
            .cloned())
    }

    fn slot_set(&self, agent_id: &str, name: &str, value: &str) -> Result<()> {
        self.state
            .borrow_mut()
            .slots
            .insert((agent_id.to_string(), name.to_string()), value.to_string());
        Ok(())
    }

    fn slot_clear(&self, agent_id: &str, name: &str) -> Result<()> {
        self.state
            .borrow_mut()
            .slots
            .remove(&(agent_id.to_string(), name.to_string()));
        Ok(())
    }
}

// ============================================================================
// Fake session manager
// ============================================================================

/// Recording fake for the session manager.
///
/// Sessions "exist" once created; launches can be made to fail when their
/// command contains a marker substring, which lets tests target a single
/// task's spawn without knowing generated session names up front.
#[derive(Default)]
pub(crate) struct FakeSessions {
    sessions: RefCell<Vec<String>>,
    created: RefCell<Vec<(String, String)>>,
    killed: RefCell<Vec<String>>,
    fail_if_command_contains: RefCell<Option<String>>,
}

impl FakeSessions {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Pre-register an existing session.
    pub(crate) fn add_session(&self, name: &str) {
        self.sessions.borrow_mut().push(name.to_string());
    }

    /// Fail any launch whose command contains this marker.
    pub(crate) fn fail_commands_containing(&self, marker: &str) {
        *self.fail_if_command_contains.borrow_mut() = Some(marker.to_string());
    }

    /// All `(session, command)` pairs passed to launch operations.
    pub(crate) fn launches(&self) -> Vec<(String, String)> {
        self.created.borrow().clone()
    }

    /// All session names passed to `kill_session`.
    pub(crate) fn kills(&self) -> Vec<String> {
        self.killed.borrow().clone()
    }

    fn should_fail(&self, command: &str) -> bool {
        self.fail_if_command_contains
            .borrow()
            .as_deref()
            .is_some_and(|marker| command.contains(marker))
    }
}

impl SessionManager for FakeSessions {
    fn session_exists(&self, name: &str) -> Result<bool> {
        Ok(self.sessions.borrow().iter().any(|s| s == name))
    }

    fn create_session(&self, name: &str, command: &str) -> Result<()> {
        if self.should_fail(command) {
            return Err(MusterError::Launch(format!(
                "simulated launch failure for session '{}'",
                name
            )));
        }
        self.sessions.borrow_mut().push(name.to_string());
        self.created
            .borrow_mut()
            .push((name.to_string(), command.to_string()));
        Ok(())
    }

    fn split_pane(&self, name: &str, command: &str, _direction: SplitDirection) -> Result<()> {
        if !self.sessions.borrow().iter().any(|s| s == name) {
            return Err(MusterError::Launch(format!("no session named '{}'", name)));
        }
        if self.should_fail(command) {
            return Err(MusterError::Launch(format!(
                "simulated split failure in session '{}'",
                name
            )));
        }
        self.created
            .borrow_mut()
            .push((name.to_string(), command.to_string()));
        Ok(())
    }

    fn kill_session(&self, name: &str) -> Result<()> {
        self.sessions.borrow_mut().retain(|s| s != name);
        self.killed.borrow_mut().push(name.to_string());
        Ok(())
    }

    fn list_sessions(&self) -> Result<Vec<String>> {
        Ok(self.sessions.borrow().clone())
    }
}
