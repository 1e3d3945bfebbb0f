//! CLI argument parsing for muster.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use clap::{Parser, Subcommand};

/// Muster: convoy scheduling and agent-lifecycle orchestration.
///
/// A convoy is a unit of work: a dependency graph of tasks executed by a
/// bounded pool of agent processes hosted in tmux sessions, with durable
/// state in an external issue ledger.
#[derive(Parser, Debug)]
#[command(name = "muster")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse arguments from the process environment.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Available commands for muster.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Initialize a muster workspace in the current directory.
    ///
    /// Creates the .muster/ state directory with a default config.yaml.
    Init,

    /// Convoy management commands.
    Convoy(ConvoyCommand),

    /// Run one scheduling pass over a convoy.
    ///
    /// Admits ready tasks up to the worker ceiling and launches one
    /// worker per admitted task.
    Schedule(ScheduleArgs),

    /// Mark a task completed and cascade-schedule its dependents.
    Complete(CompleteArgs),

    /// Check for ready work and spawn workers to consume it.
    ///
    /// With --dry-run, reports what would be spawned without acting.
    Check(CheckArgs),

    /// Show convoy progress.
    Status(StatusArgs),

    /// Agent lifecycle commands.
    Agent(AgentCommand),
}

/// Convoy subcommands.
#[derive(Parser, Debug)]
pub struct ConvoyCommand {
    #[command(subcommand)]
    pub action: ConvoyAction,
}

/// Actions on convoys.
#[derive(Subcommand, Debug)]
pub enum ConvoyAction {
    /// Create a new convoy (with duplicate detection).
    New(ConvoyNewArgs),

    /// Close a convoy. Closed is terminal.
    Close(ConvoyCloseArgs),
}

/// Arguments for `convoy new`.
#[derive(Parser, Debug)]
pub struct ConvoyNewArgs {
    /// Title for the new convoy.
    pub title: String,

    /// Description of the unit of work (searched for external issue ids).
    #[arg(short, long, default_value = "")]
    pub description: String,

    /// Path to a plan document seeding the convoy's tasks.
    #[arg(long)]
    pub plan: Option<String>,

    /// Worker-count ceiling for this convoy.
    #[arg(long)]
    pub max_workers: Option<u32>,

    /// Mode name recorded on the convoy.
    #[arg(long)]
    pub mode: Option<String>,

    /// External context path recorded on the convoy.
    #[arg(long)]
    pub context: Option<String>,

    /// Create the convoy even if duplicates are detected.
    #[arg(long)]
    pub force: bool,
}

/// Arguments for `convoy close`.
#[derive(Parser, Debug)]
pub struct ConvoyCloseArgs {
    /// Convoy to close. Falls back to the MUSTER_CONVOY environment
    /// variable.
    #[arg(long)]
    pub convoy: Option<String>,

    /// Reason recorded with the closure.
    #[arg(short, long)]
    pub reason: Option<String>,
}

/// Arguments for the `schedule` command.
#[derive(Parser, Debug)]
pub struct ScheduleArgs {
    /// Convoy to schedule. Falls back to the MUSTER_CONVOY environment
    /// variable.
    #[arg(long)]
    pub convoy: Option<String>,
}

/// Arguments for the `complete` command.
#[derive(Parser, Debug)]
pub struct CompleteArgs {
    /// Name of the task to complete (e.g. worker-2).
    pub task: String,

    /// Convoy owning the task. Falls back to the MUSTER_CONVOY
    /// environment variable.
    #[arg(long)]
    pub convoy: Option<String>,
}

/// Arguments for the `check` command.
#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Convoy to check. Falls back to the MUSTER_CONVOY environment
    /// variable.
    #[arg(long)]
    pub convoy: Option<String>,

    /// Report what would be spawned without spawning anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the `status` command.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Convoy to inspect. Falls back to the MUSTER_CONVOY environment
    /// variable.
    #[arg(long)]
    pub convoy: Option<String>,
}

/// Agent subcommands.
#[derive(Parser, Debug)]
pub struct AgentCommand {
    #[command(subcommand)]
    pub action: AgentAction,
}

/// Actions on agents.
#[derive(Subcommand, Debug)]
pub enum AgentAction {
    /// Spawn a standalone agent of the given role for a convoy.
    Spawn(AgentSpawnArgs),

    /// Record a heartbeat for an agent.
    Heartbeat(AgentIdArgs),

    /// Self-report resource usage and checkpoint if over threshold.
    ///
    /// This is the composite check a running worker calls periodically
    /// against itself.
    RespawnCheck(RespawnCheckArgs),

    /// Replace a suspended agent with a fresh instance of itself.
    Respawn(RespawnArgs),
}

/// Arguments for `agent spawn`.
#[derive(Parser, Debug)]
pub struct AgentSpawnArgs {
    /// Role for the new agent (coordinator, planner, lead, worker,
    /// reviewer, tester, auditor, monitor).
    #[arg(long)]
    pub role: String,

    /// Convoy the agent belongs to. Falls back to the MUSTER_CONVOY
    /// environment variable.
    #[arg(long)]
    pub convoy: Option<String>,
}

/// Arguments for commands addressing a single agent.
#[derive(Parser, Debug)]
pub struct AgentIdArgs {
    /// The agent's ledger id.
    pub agent_id: String,
}

/// Arguments for `agent respawn-check`.
#[derive(Parser, Debug)]
pub struct RespawnCheckArgs {
    /// The agent's ledger id.
    pub agent_id: String,

    /// Current resource usage percentage.
    #[arg(long)]
    pub usage: f64,

    /// Threshold override; defaults to the configured respawn_threshold.
    #[arg(long)]
    pub threshold: Option<f64>,
}

/// Arguments for `agent respawn`.
#[derive(Parser, Debug)]
pub struct RespawnArgs {
    /// The agent's ledger id.
    pub agent_id: String,

    /// Working directory for the replacement process.
    #[arg(long)]
    pub working_dir: Option<String>,
}
