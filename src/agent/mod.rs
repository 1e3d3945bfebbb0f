//! Agent identity and lifecycle for muster.
//!
//! This module provides:
//!
//! - **Roles**: the closed set of agent roles and the worker-role
//!   distinction used by the concurrency ceiling
//! - **States**: the agent lifecycle state machine with a single
//!   `transition` function that rejects illegal transitions
//! - **Tracker**: typed lifecycle operations over the ledger (see
//!   [`tracker`])
//! - **Launch**: construction of the runtime launch command (see
//!   [`launch`])
//!
//! An agent is a tracked worker identity, distinct from the OS-level
//! tmux pane that embodies it. The ledger owns agent records; this module
//! owns the rules about what those records may say.

pub mod launch;
pub mod tracker;

use thiserror::Error;

/// Name of the slot holding the task an agent is currently working.
pub const HOOK_SLOT: &str = "hook";

/// Name of the slot holding a role-specific resource.
pub const ROLE_SLOT: &str = "role";

/// The closed set of agent roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Oversees a convoy end to end; never counted as a worker.
    Coordinator,
    /// Produces the execution task list from the convoy description.
    Planner,
    /// Implementer-lead: splits and reviews implementation work.
    Lead,
    /// General implementer.
    Worker,
    /// Reviews produced changes.
    Reviewer,
    /// Writes and runs tests.
    Tester,
    /// Audits results against the task description.
    Auditor,
    /// Passive observer; never does work and never counts toward the ceiling.
    Monitor,
}

impl Role {
    /// All roles, in a stable order.
    pub const ALL: &'static [Role] = &[
        Role::Coordinator,
        Role::Planner,
        Role::Lead,
        Role::Worker,
        Role::Reviewer,
        Role::Tester,
        Role::Auditor,
        Role::Monitor,
    ];

    /// Whether this role occupies a worker slot against the convoy's
    /// `max-workers` ceiling.
    ///
    /// Coordinator, planner, lead, and monitor agents are orchestration
    /// overhead and deliberately excluded from the count.
    pub fn is_worker(self) -> bool {
        matches!(
            self,
            Role::Worker | Role::Reviewer | Role::Tester | Role::Auditor
        )
    }

    /// Parse a role from its lowercase name.
    pub fn parse(s: &str) -> Option<Role> {
        match s.to_ascii_lowercase().as_str() {
            "coordinator" => Some(Role::Coordinator),
            "planner" => Some(Role::Planner),
            "lead" => Some(Role::Lead),
            "worker" => Some(Role::Worker),
            "reviewer" => Some(Role::Reviewer),
            "tester" => Some(Role::Tester),
            "auditor" => Some(Role::Auditor),
            "monitor" => Some(Role::Monitor),
            _ => None,
        }
    }

    /// The lowercase name of this role.
    pub fn name(self) -> &'static str {
        match self {
            Role::Coordinator => "coordinator",
            Role::Planner => "planner",
            Role::Lead => "lead",
            Role::Worker => "worker",
            Role::Reviewer => "reviewer",
            Role::Tester => "tester",
            Role::Auditor => "auditor",
            Role::Monitor => "monitor",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Lifecycle state of an agent.
///
/// `Done`, `Stopped`, and `Dead` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    /// Created, not yet asked to spawn.
    Idle,
    /// A launch has been requested from the session manager.
    Spawning,
    /// The runtime process is up but has not picked up a task.
    Running,
    /// Actively working a task.
    Working,
    /// Suspended pending respawn; a checkpoint has been recorded.
    Stuck,
    /// Finished its work.
    Done,
    /// Stopped by an external request.
    Stopped,
    /// The launch failed irrecoverably.
    Dead,
}

impl AgentState {
    /// Whether this state is terminal.
    pub fn is_terminal(self) -> bool {
        matches!(self, AgentState::Done | AgentState::Stopped | AgentState::Dead)
    }

    /// Parse a state from its lowercase name.
    pub fn parse(s: &str) -> Option<AgentState> {
        match s.to_ascii_lowercase().as_str() {
            "idle" => Some(AgentState::Idle),
            "spawning" => Some(AgentState::Spawning),
            "running" => Some(AgentState::Running),
            "working" => Some(AgentState::Working),
            "stuck" => Some(AgentState::Stuck),
            "done" => Some(AgentState::Done),
            "stopped" => Some(AgentState::Stopped),
            "dead" => Some(AgentState::Dead),
            _ => None,
        }
    }

    /// The lowercase name of this state.
    pub fn name(self) -> &'static str {
        match self {
            AgentState::Idle => "idle",
            AgentState::Spawning => "spawning",
            AgentState::Running => "running",
            AgentState::Working => "working",
            AgentState::Stuck => "stuck",
            AgentState::Done => "done",
            AgentState::Stopped => "stopped",
            AgentState::Dead => "dead",
        }
    }
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Events that drive the agent state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentEvent {
    /// A launch (or relaunch) has been requested.
    SpawnRequested,
    /// The session manager accepted the launch.
    Launched,
    /// The session manager rejected the launch.
    LaunchFailed,
    /// The runtime picked up a task.
    BeganWork,
    /// The runtime finished its work.
    Finished,
    /// A checkpoint was recorded; the agent is suspended pending respawn.
    CheckpointRecorded,
    /// An external stop was requested.
    StopRequested,
}

/// An illegal (state, event) combination.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid agent transition: {event:?} in state {from}")]
pub struct InvalidTransition {
    /// The state the agent was in.
    pub from: AgentState,
    /// The rejected event.
    pub event: AgentEvent,
}

/// Apply an event to a state, yielding the next state.
///
/// The transition table is closed: any combination not listed below is
/// rejected with [`InvalidTransition`]. Terminal states accept no events.
///
/// ```text
/// Idle     -(SpawnRequested)->     Spawning
/// Spawning -(Launched)->           Running
/// Spawning -(LaunchFailed)->       Dead
/// Running  -(BeganWork)->          Working
/// Working  -(Finished)->           Done
/// Working  -(CheckpointRecorded)-> Stuck
/// Stuck    -(SpawnRequested)->     Spawning      (respawn)
/// Running | Working | Stuck -(StopRequested)-> Stopped
/// ```
pub fn transition(
    current: AgentState,
    event: AgentEvent,
) -> std::result::Result<AgentState, InvalidTransition> {
    use AgentEvent::*;
    use AgentState::*;

    let next = match (current, event) {
        (Idle, SpawnRequested) => Spawning,
        (Spawning, Launched) => Running,
        (Spawning, LaunchFailed) => Dead,
        (Running, BeganWork) => Working,
        (Working, Finished) => Done,
        (Working, CheckpointRecorded) => Stuck,
        (Stuck, SpawnRequested) => Spawning,
        (Running | Working | Stuck, StopRequested) => Stopped,
        _ => {
            return Err(InvalidTransition {
                from: current,
                event,
            });
        }
    };

    Ok(next)
}
