//! Implementation of the `muster status` command.

use super::target_context;
use crate::cli::StatusArgs;
use crate::error::Result;
use crate::graph;
use crate::ledger::Ledger;
use crate::ledger::cli::CliLedger;
use crate::plan::{Task, TaskStatus};
use crate::sched::{ConvoyState, progress};
use crate::session::tmux::TmuxSessions;
use crate::session::{SessionManager, session_name};

/// Show convoy progress, task statuses, and agent states.
pub fn cmd_status(args: StatusArgs) -> Result<()> {
    let ctx = target_context(args.convoy)?;
    let convoy_id = ctx.require_convoy()?.to_string();
    let ledger = CliLedger::new(&ctx.config.ledger_bin);
    let sessions = TmuxSessions::new();

    let state = ConvoyState::load(&ledger, &convoy_id)?;
    let p = progress(&state);

    println!(
        "Convoy {} \"{}\" [{}]",
        state.convoy.id, state.convoy.title, state.convoy.status
    );
    println!(
        "Progress: {}/{} execution task(s) completed ({}%)",
        p.completed, p.total, p.percent
    );

    for section in &state.plan.sections {
        println!();
        println!("{}:", section.name);
        for task in &section.tasks {
            println!("  [{}] {}: {}", task.status.marker(), task.name, task.description);
        }
    }

    let tasks: Vec<&Task> = state.plan.tasks().collect();
    if graph::has_cycle(&graph::build(&tasks)) {
        println!();
        println!("WARNING: dependency cycle detected; scheduling is halted.");
    }

    let blocked = graph::blocked_set(&tasks);
    if !blocked.is_empty() {
        println!();
        println!("Waiting on blocked work:");
        for task in blocked {
            println!("  {} (depends on a blocked task)", task.name);
        }
    }
    for (task, dep) in graph::unresolved_dependencies(&tasks) {
        println!("  {} depends on unknown task '{}' and will never start", task, dep);
    }

    // Agent listing is advisory; a read failure degrades to silence
    // rather than failing the whole status display.
    match ledger.list_agents(Some(&convoy_id)) {
        Ok(agents) if !agents.is_empty() => {
            println!();
            println!("Agents:");
            for agent in agents {
                let session = session_name(&ctx.config.session_prefix, &convoy_id, &agent.id);
                let live = sessions.session_exists(&session).unwrap_or(false);
                println!(
                    "  {} {} [{}]{}{}",
                    agent.id,
                    agent.role,
                    agent.state,
                    agent
                        .state_label
                        .as_deref()
                        .map(|l| format!(" {}", l))
                        .unwrap_or_default(),
                    if live { " (session live)" } else { "" }
                );
            }
        }
        Ok(_) => {}
        Err(e) => eprintln!("Warning: failed to list agents: {}", e),
    }

    let active = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Active)
        .count() as u32;
    let ceiling = state.max_workers(&ctx);
    println!();
    println!("Workers: {}/{} slots in use", active.min(ceiling), ceiling);

    Ok(())
}
