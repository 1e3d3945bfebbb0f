//! Implementation of the `muster complete` command.

use super::target_context;
use crate::cli::CompleteArgs;
use crate::error::Result;
use crate::ledger::cli::CliLedger;
use crate::sched::{ConvoyState, handle_task_completion, is_convoy_complete, progress};
use crate::session::tmux::TmuxSessions;

/// Mark a task completed and immediately re-schedule so dependents
/// unlock in the same invocation.
pub fn cmd_complete(args: CompleteArgs) -> Result<()> {
    let ctx = target_context(args.convoy)?;
    let convoy_id = ctx.require_convoy()?.to_string();
    let ledger = CliLedger::new(&ctx.config.ledger_bin);
    let sessions = TmuxSessions::new();

    let mut state = ConvoyState::load(&ledger, &convoy_id)?;
    let outcome = handle_task_completion(&ctx, &ledger, &sessions, &mut state, &args.task)?;

    println!("Completed {}", args.task);
    for name in &outcome.admitted {
        println!("Unlocked and started {}", name);
    }

    let p = progress(&state);
    println!("Progress: {}/{} ({}%)", p.completed, p.total, p.percent);

    if is_convoy_complete(&state) {
        println!();
        println!(
            "All execution tasks are complete. Close the convoy with:\n  \
             muster convoy close --convoy {}",
            convoy_id
        );
    }

    Ok(())
}
