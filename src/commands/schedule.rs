//! Implementation of the `muster schedule` command.

use super::target_context;
use crate::cli::ScheduleArgs;
use crate::error::Result;
use crate::ledger::cli::CliLedger;
use crate::sched::{ConvoyState, schedule_next};
use crate::session::tmux::TmuxSessions;

/// Run one scheduling pass over the target convoy.
pub fn cmd_schedule(args: ScheduleArgs) -> Result<()> {
    let ctx = target_context(args.convoy)?;
    let convoy_id = ctx.require_convoy()?.to_string();
    let ledger = CliLedger::new(&ctx.config.ledger_bin);
    let sessions = TmuxSessions::new();

    let mut state = ConvoyState::load(&ledger, &convoy_id)?;
    let outcome = schedule_next(&ctx, &ledger, &sessions, &mut state)?;

    if outcome.cycle_detected {
        println!("Convoy {} has a dependency cycle; nothing scheduled.", convoy_id);
        println!("Break the cycle in the ledger, then re-run `muster schedule`.");
        return Ok(());
    }

    if outcome.admitted.is_empty() && outcome.launch_failed.is_empty() {
        println!("Nothing to schedule for convoy {}.", convoy_id);
        return Ok(());
    }

    for name in &outcome.admitted {
        println!("Started {}", name);
    }
    for name in &outcome.launch_failed {
        println!("Launch failed for {} (task moved to blocked)", name);
    }

    Ok(())
}
