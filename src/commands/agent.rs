//! Implementation of the `muster agent` commands.
//!
//! `spawn` launches a standalone agent (coordinator, planner, monitor, …)
//! that is not tied to a task. `respawn-check` is the self-report a
//! running worker issues periodically; `respawn` is the relauncher side
//! of the handoff.

use super::target_context;
use crate::agent::launch::LaunchSpec;
use crate::agent::{AgentEvent, Role, tracker::Tracker};
use crate::cli::{AgentIdArgs, AgentSpawnArgs, RespawnArgs, RespawnCheckArgs};
use crate::context::require_workspace;
use crate::error::{MusterError, Result};
use crate::ledger::Ledger;
use crate::ledger::cli::CliLedger;
use crate::respawn::{execute_respawn, perform_respawn_check, prepare_respawn};
use crate::session::tmux::TmuxSessions;
use crate::session::{SessionManager, session_name};

/// Spawn a standalone agent of the given role for the target convoy.
pub fn cmd_spawn(args: AgentSpawnArgs) -> Result<()> {
    let ctx = target_context(args.convoy)?;
    let convoy_id = ctx.require_convoy()?.to_string();
    let role = Role::parse(&args.role).ok_or_else(|| {
        MusterError::User(format!(
            "unknown role '{}'.\nRoles: {}.",
            args.role,
            Role::ALL
                .iter()
                .map(|r| r.name())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    })?;

    let ledger = CliLedger::new(&ctx.config.ledger_bin);
    let sessions = TmuxSessions::new();
    let tracker = Tracker::new(&ledger);

    let convoy = ledger.show_convoy(&convoy_id)?;
    let agent_id = tracker.create(&convoy_id, role)?;
    tracker.apply(&agent_id, AgentEvent::SpawnRequested)?;

    let spec = LaunchSpec {
        agent_id: agent_id.clone(),
        role,
        convoy_id: convoy_id.clone(),
        task_id: None,
        context_path: convoy.context_path().map(String::from),
        resume: false,
        instruction: format!("act as {} for convoy {}", role, convoy_id),
    };

    let session = session_name(&ctx.config.session_prefix, &convoy_id, &agent_id);
    match sessions.create_session(&session, &spec.command(&ctx.config.runtime_bin)) {
        Ok(()) => {
            tracker.apply(&agent_id, AgentEvent::Launched)?;
            println!("Spawned {} {} (session {})", role, agent_id, session);
            Ok(())
        }
        Err(e) => {
            tracker.apply(&agent_id, AgentEvent::LaunchFailed)?;
            Err(e)
        }
    }
}

/// Record a heartbeat for an agent.
pub fn cmd_heartbeat(args: AgentIdArgs) -> Result<()> {
    let ctx = require_workspace()?;
    let ledger = CliLedger::new(&ctx.config.ledger_bin);
    Tracker::new(&ledger).heartbeat(&args.agent_id)?;
    Ok(())
}

/// Self-report resource usage; checkpoint and suspend when the threshold
/// is crossed.
pub fn cmd_respawn_check(args: RespawnCheckArgs) -> Result<()> {
    let ctx = require_workspace()?;
    let ledger = CliLedger::new(&ctx.config.ledger_bin);
    let threshold = args.threshold.unwrap_or(ctx.config.respawn_threshold);

    let decision = perform_respawn_check(&ctx, &ledger, &args.agent_id, args.usage, threshold)?;

    if decision.should_respawn {
        println!(
            "Checkpoint recorded ({}% > {}%); agent {} suspended pending respawn.",
            args.usage, threshold, args.agent_id
        );
        println!("Hand off with:\n  muster agent respawn {}", args.agent_id);
    } else {
        println!(
            "Agent {} under threshold ({}% <= {}%); no respawn needed.",
            args.agent_id, args.usage, threshold
        );
    }

    Ok(())
}

/// Replace a suspended agent with a fresh instance of the same identity.
pub fn cmd_respawn(args: RespawnArgs) -> Result<()> {
    let ctx = require_workspace()?;
    let ledger = CliLedger::new(&ctx.config.ledger_bin);
    let sessions = TmuxSessions::new();

    let respawn = prepare_respawn(&ctx, &ledger, &args.agent_id)?;
    let accepted = execute_respawn(
        &ctx,
        &ledger,
        &sessions,
        &respawn,
        args.working_dir.as_deref(),
    )?;

    if accepted {
        println!(
            "Respawned {} as a fresh {} instance (session {})",
            respawn.agent_id, respawn.role, respawn.session_name
        );
        Ok(())
    } else {
        Err(MusterError::Launch(format!(
            "respawn launch for agent {} was rejected; agent marked dead",
            respawn.agent_id
        )))
    }
}
