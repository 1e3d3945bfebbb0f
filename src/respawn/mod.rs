//! Checkpoint/respawn protocol.
//!
//! A running worker self-reports its resource usage periodically. Once
//! usage crosses the convoy's threshold, the worker's progress is
//! checkpointed as a structured comment on its hooked task, the agent is
//! suspended (Stuck), and a fresh instance of the same agent identity is
//! launched with a resume flag so it can pick up where the old one left
//! off.
//!
//! The threshold boundary is exclusive: usage exactly equal to the
//! threshold does not trigger a respawn.

use crate::agent::launch::LaunchSpec;
use crate::agent::{AgentEvent, AgentState, Role, tracker::Tracker};
use crate::context::ExecContext;
use crate::error::{MusterError, Result};
use crate::events::{Event, EventAction, append_event_best_effort};
use crate::ledger::Ledger;
use crate::session::{SessionManager, session_name};
use serde_json::json;

#[cfg(test)]
mod tests;

/// Reason string recorded when the usage threshold triggers a respawn.
pub const REASON_CONTEXT_THRESHOLD: &str = "context_threshold";

/// Outcome of a respawn-threshold evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RespawnDecision {
    /// Whether the agent must hand off to a fresh instance.
    pub should_respawn: bool,
    /// Why, when it must.
    pub reason: Option<&'static str>,
}

/// Decide whether a resource usage reading requires a respawn.
///
/// Both inputs must be finite, non-negative numbers; anything else is a
/// `Validation` error; there is no silent clamping. The trigger is strictly
/// `usage > threshold`: equality does not trigger.
pub fn should_respawn(resource_usage: f64, threshold: f64) -> Result<RespawnDecision> {
    if !resource_usage.is_finite() || resource_usage < 0.0 {
        return Err(MusterError::Validation(format!(
            "resource usage must be a finite non-negative number, got {}",
            resource_usage
        )));
    }
    if !threshold.is_finite() || threshold < 0.0 {
        return Err(MusterError::Validation(format!(
            "threshold must be a finite non-negative number, got {}",
            threshold
        )));
    }

    if resource_usage > threshold {
        Ok(RespawnDecision {
            should_respawn: true,
            reason: Some(REASON_CONTEXT_THRESHOLD),
        })
    } else {
        Ok(RespawnDecision {
            should_respawn: false,
            reason: None,
        })
    }
}

/// A snapshot of an agent's progress, recorded before handoff.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    /// The agent being checkpointed.
    pub agent_id: String,
    /// The hooked task's ledger id, if any.
    pub task_id: Option<String>,
    /// Resource usage percentage at checkpoint time.
    pub resource_usage: f64,
    /// Lifecycle state at checkpoint time.
    pub state: AgentState,
    /// What the agent was producing, if it said.
    pub current_artifact: Option<String>,
    /// What it intended to do next, if it said.
    pub next_action: Option<String>,
}

impl Checkpoint {
    /// Render the checkpoint as the structured comment appended to the
    /// hooked task.
    fn to_comment(&self) -> String {
        let mut lines = vec![
            format!("checkpoint: context usage {}%", self.resource_usage.round()),
            format!("state: {}", self.state),
        ];
        if let Some(artifact) = &self.current_artifact {
            lines.push(format!("artifact: {}", artifact));
        }
        if let Some(next) = &self.next_action {
            lines.push(format!("next: {}", next));
        }
        lines.push("pending-respawn: true".to_string());
        lines.join("\n")
    }
}

/// The usage label recorded on the agent, e.g. `context=85%`.
fn usage_label(resource_usage: f64) -> String {
    format!("context={}%", resource_usage.round())
}

/// Record a checkpoint and suspend the agent.
///
/// Sets the agent's usage label, appends the structured checkpoint
/// comment to the hooked task (if any), then transitions the agent to
/// Stuck.
pub fn record_checkpoint(
    ctx: &ExecContext,
    ledger: &dyn Ledger,
    checkpoint: &Checkpoint,
) -> Result<()> {
    let tracker = Tracker::new(ledger);
    tracker.set_label(&checkpoint.agent_id, &usage_label(checkpoint.resource_usage))?;

    if let Some(task_id) = &checkpoint.task_id {
        ledger.comment(task_id, &checkpoint.to_comment())?;
    }

    tracker.apply(&checkpoint.agent_id, AgentEvent::CheckpointRecorded)?;

    append_event_best_effort(
        ctx,
        &Event::new(EventAction::Checkpoint)
            .with_agent(&checkpoint.agent_id)
            .with_details(json!({
                "usage": checkpoint.resource_usage,
                "task": checkpoint.task_id,
            })),
    );

    Ok(())
}

/// The composite check a running worker calls periodically against
/// itself: heartbeat, usage label, threshold evaluation, and, on
/// trigger, a checkpoint of the hooked task.
///
/// Returns the decision either way.
pub fn perform_respawn_check(
    ctx: &ExecContext,
    ledger: &dyn Ledger,
    agent_id: &str,
    resource_usage: f64,
    threshold: f64,
) -> Result<RespawnDecision> {
    let decision = should_respawn(resource_usage, threshold)?;

    let tracker = Tracker::new(ledger);
    tracker.heartbeat(agent_id)?;
    tracker.set_label(agent_id, &usage_label(resource_usage))?;

    if decision.should_respawn {
        let record = tracker.get(agent_id)?;
        let task_id = tracker.hooked_task(agent_id)?;
        record_checkpoint(
            ctx,
            ledger,
            &Checkpoint {
                agent_id: agent_id.to_string(),
                task_id,
                resource_usage,
                state: record.state,
                current_artifact: None,
                next_action: None,
            },
        )?;
    }

    Ok(decision)
}

/// Everything a relauncher needs to replace an agent's process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RespawnContext {
    /// The agent identity being respawned (kept across the handoff).
    pub agent_id: String,
    /// The agent's role.
    pub role: Role,
    /// The owning convoy.
    pub convoy_id: String,
    /// The hooked task's ledger id, if any.
    pub task_id: Option<String>,
    /// The session the replacement runs in (same identity as before).
    pub session_name: String,
}

/// Gather the respawn context for an agent: role, hooked task, and the
/// session identity a relauncher combines with a fresh launch.
pub fn prepare_respawn(
    ctx: &ExecContext,
    ledger: &dyn Ledger,
    agent_id: &str,
) -> Result<RespawnContext> {
    let tracker = Tracker::new(ledger);
    let record = tracker.get(agent_id)?;
    let task_id = tracker.hooked_task(agent_id)?;

    Ok(RespawnContext {
        agent_id: record.id.clone(),
        role: record.role,
        convoy_id: record.convoy_id.clone(),
        task_id,
        session_name: session_name(&ctx.config.session_prefix, &record.convoy_id, &record.id),
    })
}

/// Launch the replacement instance.
///
/// Transitions the agent to Spawning, announces the handoff on the
/// hooked task, replaces the session, and transitions to Working on
/// success or Dead on any failure (the error is captured as a comment
/// for diagnostics).
///
/// Returns whether the launch was accepted. A `true` return does NOT
/// mean the replacement has produced output, only that the session
/// manager took the command.
pub fn execute_respawn(
    ctx: &ExecContext,
    ledger: &dyn Ledger,
    sessions: &dyn SessionManager,
    respawn: &RespawnContext,
    working_dir: Option<&str>,
) -> Result<bool> {
    let tracker = Tracker::new(ledger);
    tracker.apply(&respawn.agent_id, AgentEvent::SpawnRequested)?;

    if let Some(task_id) = &respawn.task_id {
        ledger.comment(
            task_id,
            &format!(
                "respawn: fresh {} instance resuming as {}",
                respawn.role, respawn.agent_id
            ),
        )?;
    }

    let convoy = ledger.show_convoy(&respawn.convoy_id)?;
    let spec = LaunchSpec {
        agent_id: respawn.agent_id.clone(),
        role: respawn.role,
        convoy_id: respawn.convoy_id.clone(),
        task_id: respawn.task_id.clone(),
        context_path: convoy.context_path().map(String::from),
        resume: true,
        instruction: "resume from your checkpoint and finish the hooked task".to_string(),
    };

    let mut command = spec.command(&ctx.config.runtime_bin);
    if let Some(dir) = working_dir {
        command = format!("cd {} && {}", shell_words::quote(dir), command);
    }

    // Replace, not accumulate: the old pane dies with the old instance.
    if sessions.session_exists(&respawn.session_name)? {
        sessions.kill_session(&respawn.session_name)?;
    }

    match sessions.create_session(&respawn.session_name, &command) {
        Ok(()) => {
            tracker.apply(&respawn.agent_id, AgentEvent::Launched)?;
            tracker.apply(&respawn.agent_id, AgentEvent::BeganWork)?;
            append_event_best_effort(
                ctx,
                &Event::new(EventAction::Respawn)
                    .with_convoy(&respawn.convoy_id)
                    .with_agent(&respawn.agent_id)
                    .with_details(json!({ "session": respawn.session_name })),
            );
            Ok(true)
        }
        Err(e) => {
            tracker.apply(&respawn.agent_id, AgentEvent::LaunchFailed)?;
            if let Some(task_id) = &respawn.task_id {
                // Best effort: the diagnostic matters less than the Dead state.
                let _ = ledger.comment(
                    task_id,
                    &format!("respawn failed for {}: {}", respawn.agent_id, e),
                );
            }
            append_event_best_effort(
                ctx,
                &Event::new(EventAction::RespawnFailed)
                    .with_convoy(&respawn.convoy_id)
                    .with_agent(&respawn.agent_id)
                    .with_details(json!({ "error": e.to_string() })),
            );
            Ok(false)
        }
    }
}
