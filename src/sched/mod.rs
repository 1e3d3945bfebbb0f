//! Convoy scheduler.
//!
//! Decides which tasks may start given the worker-count ceiling, launches
//! a worker per admitted task, and cascades completions back into new
//! scheduling passes.
//!
//! The scheduler is stateless between invocations: every pass re-reads
//! convoy state from the ledger and persists what it changed. There is no
//! distributed lock around the read-check-write sequence, so two
//! concurrent passes against the same convoy can both observe the same
//! active count and transiently exceed the ceiling. See DESIGN.md.

use crate::agent::launch::LaunchSpec;
use crate::agent::{AgentEvent, HOOK_SLOT, tracker::Tracker};
use crate::context::ExecContext;
use crate::error::Result;
use crate::events::{Event, EventAction, append_event_best_effort};
use crate::graph;
use crate::ledger::{ConvoyRecord, ConvoyStatus, Ledger, assemble_plan, task_id};
use crate::plan::{Plan, Task, TaskStatus};
use crate::session::{SessionManager, session_name};
use chrono::Utc;
use serde_json::json;


/// A convoy's current state as read from the ledger.
#[derive(Debug, Clone)]
pub struct ConvoyState {
    /// The convoy record.
    pub convoy: ConvoyRecord,
    /// The task graph reassembled from the convoy's task records.
    pub plan: Plan,
}

impl ConvoyState {
    /// Load a convoy and its tasks from the ledger.
    pub fn load(ledger: &dyn Ledger, convoy_id: &str) -> Result<Self> {
        let convoy = ledger.show_convoy(convoy_id)?;
        let records = ledger.list_tasks(convoy_id)?;
        let plan = assemble_plan(&convoy, &records);
        Ok(Self { convoy, plan })
    }

    /// The effective worker ceiling for this convoy.
    pub fn max_workers(&self, ctx: &ExecContext) -> u32 {
        self.convoy.max_workers(ctx.config.default_max_workers)
    }
}

/// What a scheduling pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleOutcome {
    /// Tasks transitioned Pending→Active and launched.
    pub admitted: Vec<String>,
    /// Tasks whose launch failed and were moved Active→Blocked.
    pub launch_failed: Vec<String>,
    /// True when a dependency cycle halted the pass before any admission.
    pub cycle_detected: bool,
}

/// Run one scheduling pass over a convoy.
///
/// Admits up to `max_workers - active_count` ready tasks in the plan's
/// stable enumeration order (insertion order, no priority reordering),
/// launching one worker per admitted task. A launch failure moves that
/// task to Blocked with an `error` note and leaves its slot free for the
/// next pass.
///
/// A dependency cycle is fatal to forward progress: the pass is reported
/// and nothing is mutated. A human must break the cycle in the ledger.
pub fn schedule_next(
    ctx: &ExecContext,
    ledger: &dyn Ledger,
    sessions: &dyn SessionManager,
    state: &mut ConvoyState,
) -> Result<ScheduleOutcome> {
    let mut outcome = ScheduleOutcome::default();

    let tasks: Vec<&Task> = state.plan.tasks().collect();
    let dep_graph = graph::build(&tasks);

    if let Some(cycle) = graph::find_cycle(&dep_graph) {
        eprintln!(
            "muster: convoy {} has a dependency cycle ({}); scheduling halted until it is broken",
            state.convoy.id,
            cycle.join(" -> ")
        );
        outcome.cycle_detected = true;
        return Ok(outcome);
    }

    for (task, dep) in graph::unresolved_dependencies(&tasks) {
        eprintln!(
            "Warning: convoy {}: task '{}' depends on unknown task '{}' and will never become ready",
            state.convoy.id, task, dep
        );
    }

    let active_count = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Active)
        .count() as u32;
    let max_workers = state.max_workers(ctx);
    let available = max_workers.saturating_sub(active_count) as usize;

    let selected: Vec<String> = graph::ready_set(&tasks)
        .into_iter()
        .take(available)
        .map(|t| t.name.clone())
        .collect();

    for name in selected {
        state.plan.set_status(&name, TaskStatus::Active)?;
        let task = state
            .plan
            .find_task(&name)
            .expect("task was just mutated")
            .clone();

        match spawn_worker(ctx, ledger, sessions, &state.convoy, &task) {
            Ok(spawned) => {
                ledger.save_task(&state.convoy.id, &task)?;
                outcome.admitted.push(name.clone());
                append_event_best_effort(
                    ctx,
                    &Event::new(EventAction::Launch)
                        .with_convoy(&state.convoy.id)
                        .with_task(&name)
                        .with_agent(&spawned.agent_id)
                        .with_details(json!({ "session": spawned.session })),
                );
            }
            Err(e) => {
                // Recoverable: the task parks in Blocked and its slot
                // stays free for the next pass.
                eprintln!(
                    "muster: launch failed for task '{}' on convoy {}: {}",
                    name, state.convoy.id, e
                );
                state.plan.mark_blocked(&name, &e.to_string())?;
                let blocked = state
                    .plan
                    .find_task(&name)
                    .expect("task was just mutated")
                    .clone();
                ledger.save_task(&state.convoy.id, &blocked)?;
                outcome.launch_failed.push(name.clone());
                append_event_best_effort(
                    ctx,
                    &Event::new(EventAction::LaunchFailed)
                        .with_convoy(&state.convoy.id)
                        .with_task(&name)
                        .with_details(json!({ "error": e.to_string() })),
                );
            }
        }
    }

    // A convoy with admitted work is no longer merely Open.
    if !outcome.admitted.is_empty() && state.convoy.status == ConvoyStatus::Open {
        ledger.update_convoy_status(&state.convoy.id, ConvoyStatus::InProgress)?;
        state.convoy.status = ConvoyStatus::InProgress;
    }

    append_event_best_effort(
        ctx,
        &Event::new(EventAction::Schedule)
            .with_convoy(&state.convoy.id)
            .with_details(json!({
                "active": active_count,
                "max_workers": max_workers,
                "admitted": outcome.admitted,
                "launch_failed": outcome.launch_failed,
            })),
    );

    Ok(outcome)
}

/// A worker spawned for a task.
#[derive(Debug, Clone)]
pub struct SpawnedWorker {
    /// The new agent's ledger id.
    pub agent_id: String,
    /// The tmux session hosting it.
    pub session: String,
}

/// Spawn one worker for a task: create the agent record, launch its
/// session, and hook the task onto it.
///
/// On a session-manager failure the agent is marked Dead and the error is
/// returned; the caller decides what happens to the task.
pub fn spawn_worker(
    ctx: &ExecContext,
    ledger: &dyn Ledger,
    sessions: &dyn SessionManager,
    convoy: &ConvoyRecord,
    task: &Task,
) -> Result<SpawnedWorker> {
    let tracker = Tracker::new(ledger);
    let agent_id = tracker.create(&convoy.id, task.role)?;
    tracker.apply(&agent_id, AgentEvent::SpawnRequested)?;

    let hooked = task_id(&convoy.id, &task.name);
    let spec = LaunchSpec {
        agent_id: agent_id.clone(),
        role: task.role,
        convoy_id: convoy.id.clone(),
        task_id: Some(hooked.clone()),
        context_path: convoy.context_path().map(String::from),
        resume: false,
        instruction: format!("work task {}: {}", task.name, task.description),
    };

    let session = session_name(&ctx.config.session_prefix, &convoy.id, &agent_id);
    let command = spec.command(&ctx.config.runtime_bin);

    match sessions.create_session(&session, &command) {
        Ok(()) => {
            tracker.apply(&agent_id, AgentEvent::Launched)?;
            tracker.set_slot(&agent_id, HOOK_SLOT, &hooked)?;
            Ok(SpawnedWorker { agent_id, session })
        }
        Err(e) => {
            tracker.apply(&agent_id, AgentEvent::LaunchFailed)?;
            Err(e)
        }
    }
}

/// Mark a task Completed and immediately re-run scheduling so its
/// dependents unlock in the same invocation.
pub fn handle_task_completion(
    ctx: &ExecContext,
    ledger: &dyn Ledger,
    sessions: &dyn SessionManager,
    state: &mut ConvoyState,
    task_name: &str,
) -> Result<ScheduleOutcome> {
    if let Some(task) = state.plan.find_task(task_name)
        && task.status == TaskStatus::Completed
    {
        // Completed tasks are never revisited.
        return Err(crate::error::MusterError::User(format!(
            "task '{}' is already completed",
            task.name
        )));
    }

    state.plan.mark_completed(task_name, Utc::now())?;
    let task = state
        .plan
        .find_task(task_name)
        .expect("task was just mutated")
        .clone();
    ledger.save_task(&state.convoy.id, &task)?;

    append_event_best_effort(
        ctx,
        &Event::new(EventAction::Complete)
            .with_convoy(&state.convoy.id)
            .with_task(&task.name),
    );

    // Cascading unlock: dependents of this task may be ready now.
    schedule_next(ctx, ledger, sessions, state)
}

/// Whether the convoy's execution work is finished.
///
/// True only when a non-empty execution task list exists and every task
/// in it is Completed. An empty execution list is never "complete"; it
/// means planning has not produced work yet.
pub fn is_convoy_complete(state: &ConvoyState) -> bool {
    let mut execution = state.plan.execution_tasks().peekable();
    if execution.peek().is_none() {
        return false;
    }
    execution.all(|t| t.status == TaskStatus::Completed)
}

/// Progress over the convoy's execution tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Execution tasks completed.
    pub completed: usize,
    /// Total execution tasks.
    pub total: usize,
    /// Whole-number percentage (0 when the list is empty).
    pub percent: u32,
}

/// Compute convoy progress. Pure read; mutates nothing.
pub fn progress(state: &ConvoyState) -> Progress {
    let total = state.plan.execution_tasks().count();
    let completed = state
        .plan
        .execution_tasks()
        .filter(|t| t.status == TaskStatus::Completed)
        .count();
    let percent = if total == 0 {
        0
    } else {
        (completed * 100 / total) as u32
    };

    Progress {
        completed,
        total,
        percent,
    }
}
