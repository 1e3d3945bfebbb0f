//! Work-availability trigger.
//!
//! A polling check + act cycle: determine whether ready tasks exist and
//! worker slots are free, and if so spawn exactly enough new workers to
//! consume them, or signal convoy completion so a coordinator can run its
//! wind-down.
//!
//! The check is deliberately fail-open: a ledger outage must never block
//! the caller. An outage yields an empty result with `degraded: true`, so
//! callers can still distinguish "nothing to do" from "could not look".

use crate::context::ExecContext;
use crate::error::{MusterError, Result};
use crate::events::{Event, EventAction, append_event_best_effort};
use crate::ledger::{AgentRecord, ConvoyRecord, ConvoyStatus, Ledger};
use crate::plan::{Task, TaskStatus};
use crate::sched::spawn_worker;
use crate::session::SessionManager;
use serde_json::json;

/// Result of a work-availability check.
#[derive(Debug, Clone, Default)]
pub struct ReadyWorkCheck {
    /// The convoy the check targeted, if any was resolvable.
    pub convoy_id: Option<String>,
    /// The convoy record, when it was found.
    pub convoy: Option<ConvoyRecord>,
    /// Ready tasks, in creation order.
    pub ready_tasks: Vec<Task>,
    /// All agents of the convoy.
    pub agents: Vec<AgentRecord>,
    /// Free worker slots under the convoy's ceiling.
    pub idle_worker_slots: u32,
    /// Ready tasks exist AND slots are free.
    pub has_work: bool,
    /// The convoy is Closed, or nothing is ready while at least one agent
    /// already exists (distinguishing "finished" from "not started").
    pub all_tasks_done: bool,
    /// The check failed and degraded to an empty result; emptiness here
    /// means "could not look", not "none exist".
    pub degraded: bool,
}

impl ReadyWorkCheck {
    fn empty_for(convoy_id: Option<String>) -> Self {
        Self {
            convoy_id,
            ..Self::default()
        }
    }
}

/// Check whether ready work and free worker slots exist.
///
/// The convoy id comes from the context; resolving it from the ambient
/// environment happens at the command-dispatch boundary, never here. No
/// convoy id is an empty result, not an error, and an unknown convoy id
/// is an empty result carrying the attempted id with `convoy: None`.
pub fn check_for_ready_work(ctx: &ExecContext, ledger: &dyn Ledger) -> ReadyWorkCheck {
    let Some(convoy_id) = ctx.convoy_id.clone() else {
        return ReadyWorkCheck::empty_for(None);
    };

    let convoy = match ledger.show_convoy(&convoy_id) {
        Ok(convoy) => convoy,
        Err(MusterError::NotFound { .. }) => {
            return ReadyWorkCheck::empty_for(Some(convoy_id));
        }
        Err(e) => {
            eprintln!(
                "Warning: work-availability check degraded for convoy {}: {}",
                convoy_id, e
            );
            let mut check = ReadyWorkCheck::empty_for(Some(convoy_id));
            check.degraded = true;
            return check;
        }
    };

    let degraded = |convoy: ConvoyRecord, convoy_id: String, e: MusterError| {
        eprintln!(
            "Warning: work-availability check degraded for convoy {}: {}",
            convoy_id, e
        );
        let mut check = ReadyWorkCheck::empty_for(Some(convoy_id));
        check.convoy = Some(convoy);
        check.degraded = true;
        check
    };

    let ready_tasks = match ledger.ready_tasks(&convoy_id) {
        Ok(ready) => ready,
        Err(e) => return degraded(convoy, convoy_id, e),
    };
    let agents = match ledger.list_agents(Some(&convoy_id)) {
        Ok(agents) => agents,
        Err(e) => return degraded(convoy, convoy_id, e),
    };

    let max_workers = convoy.max_workers(ctx.config.default_max_workers);
    let active_workers = agents
        .iter()
        .filter(|a| a.role.is_worker() && !a.state.is_terminal())
        .count() as u32;
    let idle_worker_slots = max_workers.saturating_sub(active_workers);

    let has_work = !ready_tasks.is_empty() && idle_worker_slots > 0;
    let all_tasks_done = convoy.status == ConvoyStatus::Closed
        || (ready_tasks.is_empty() && !agents.is_empty());

    ReadyWorkCheck {
        convoy_id: Some(convoy_id),
        convoy: Some(convoy),
        ready_tasks,
        agents,
        idle_worker_slots,
        has_work,
        all_tasks_done,
        degraded: false,
    }
}

/// A worker assigned to a ready task by the trigger.
#[derive(Debug, Clone)]
pub struct Assignment {
    /// The task's name.
    pub task: String,
    /// The spawned agent.
    pub agent_id: String,
    /// The session hosting it.
    pub session: String,
}

/// What a trigger invocation did.
#[derive(Debug, Clone, Default)]
pub struct TriggerOutcome {
    /// Workers spawned, one per consumed ready task.
    pub assigned: Vec<Assignment>,
    /// Tasks whose spawn failed, with the error text. Best-effort batch:
    /// failures here never roll back the assignments that succeeded.
    pub skipped: Vec<(String, String)>,
    /// The convoy's work is done; a coordinator should wind down.
    pub completion_signal: bool,
    /// Tasks that would be assigned on a dry run.
    pub would_assign: Vec<String>,
}

/// Act on a work-availability check.
///
/// No convoy context is a no-op. A done convoy with nothing ready emits
/// the completion signal (message only, no mutation). Otherwise up to
/// `idle_worker_slots` ready tasks each get a fresh worker; a task is
/// marked Active only after its worker launched, so a spawn failure
/// leaves it Pending for the next cycle.
pub fn trigger_work(
    ctx: &ExecContext,
    ledger: &dyn Ledger,
    sessions: &dyn SessionManager,
    check: &ReadyWorkCheck,
    dry_run: bool,
) -> Result<TriggerOutcome> {
    let mut outcome = TriggerOutcome::default();

    let (Some(convoy_id), Some(convoy)) = (&check.convoy_id, &check.convoy) else {
        return Ok(outcome);
    };

    if check.all_tasks_done && check.ready_tasks.is_empty() {
        outcome.completion_signal = true;
        return Ok(outcome);
    }

    if !check.has_work {
        return Ok(outcome);
    }

    let batch = check
        .ready_tasks
        .iter()
        .take(check.idle_worker_slots as usize);

    if dry_run {
        outcome.would_assign = batch.map(|t| t.name.clone()).collect();
        return Ok(outcome);
    }

    for task in batch {
        match spawn_worker(ctx, ledger, sessions, convoy, task) {
            Ok(spawned) => {
                let mut active = task.clone();
                active.status = TaskStatus::Active;
                ledger.save_task(convoy_id, &active)?;
                outcome.assigned.push(Assignment {
                    task: task.name.clone(),
                    agent_id: spawned.agent_id,
                    session: spawned.session,
                });
            }
            Err(e) => {
                // Continue past individual failures; the task stays
                // Pending and the next cycle retries it.
                eprintln!(
                    "muster: failed to spawn worker for task '{}' on convoy {}: {}",
                    task.name, convoy_id, e
                );
                outcome.skipped.push((task.name.clone(), e.to_string()));
            }
        }
    }

    append_event_best_effort(
        ctx,
        &Event::new(EventAction::Trigger)
            .with_convoy(convoy_id.as_str())
            .with_details(json!({
                "assigned": outcome.assigned.iter().map(|a| &a.task).collect::<Vec<_>>(),
                "skipped": outcome.skipped.iter().map(|(t, _)| t).collect::<Vec<_>>(),
            })),
    );

    Ok(outcome)
}
