//! Implementation of the `muster check` command.
//!
//! The check/act cycle a poller or coordinator invokes periodically: is
//! there ready work and free worker capacity, and if so, spawn exactly
//! enough workers to consume it.

use super::target_context;
use crate::cli::CheckArgs;
use crate::error::Result;
use crate::ledger::cli::CliLedger;
use crate::session::tmux::TmuxSessions;
use crate::trigger::{check_for_ready_work, trigger_work};

/// Check for ready work and act on the result.
pub fn cmd_check(args: CheckArgs) -> Result<()> {
    let ctx = target_context(args.convoy)?;
    let ledger = CliLedger::new(&ctx.config.ledger_bin);
    let sessions = TmuxSessions::new();

    let check = check_for_ready_work(&ctx, &ledger);

    let Some(convoy_id) = check.convoy_id.clone() else {
        println!(
            "No convoy in context. Pass --convoy <id> or set MUSTER_CONVOY; \
             nothing to check."
        );
        return Ok(());
    };

    if check.convoy.is_none() {
        println!("Convoy {} not found; nothing to check.", convoy_id);
        return Ok(());
    }

    if check.degraded {
        println!(
            "Ledger unavailable; check for convoy {} degraded to empty. \
             Try again later.",
            convoy_id
        );
        return Ok(());
    }

    println!(
        "Convoy {}: {} ready task(s), {} idle worker slot(s)",
        convoy_id,
        check.ready_tasks.len(),
        check.idle_worker_slots
    );

    let outcome = trigger_work(&ctx, &ledger, &sessions, &check, args.dry_run)?;

    if outcome.completion_signal {
        println!("All tasks done; the coordinator can wind this convoy down.");
        return Ok(());
    }

    if args.dry_run {
        if outcome.would_assign.is_empty() {
            println!("Nothing would be spawned.");
        } else {
            println!("Would spawn workers for: {}", outcome.would_assign.join(", "));
        }
        return Ok(());
    }

    if outcome.assigned.is_empty() && outcome.skipped.is_empty() {
        println!("No work to trigger.");
        return Ok(());
    }

    for a in &outcome.assigned {
        println!("Spawned {} for {} (session {})", a.agent_id, a.task, a.session);
    }
    for (task, error) in &outcome.skipped {
        println!("Skipped {}: {}", task, error);
    }

    Ok(())
}
