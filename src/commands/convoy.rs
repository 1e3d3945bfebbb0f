//! Implementation of the `muster convoy` commands.
//!
//! `convoy new` runs the duplicate-convoy detector before creating
//! anything: external issue ids are pulled from the title and
//! description and matched against Open/InProgress convoys. Detection is
//! advisory and fail-open; `--force` overrides a hit.

use super::target_context;
use crate::agent::{AgentEvent, AgentState, tracker::Tracker};
use crate::cli::{ConvoyCloseArgs, ConvoyNewArgs};
use crate::context::require_workspace;
use crate::dupes::{extract_issue_ids, find_duplicate_convoys};
use crate::error::{MusterError, Result};
use crate::events::{Event, EventAction, append_event_best_effort};
use crate::ledger::{ConvoyRecord, Ledger, cli::CliLedger};
use crate::plan::{Plan, SEED_SECTION, Task};
use crate::session::tmux::TmuxSessions;
use crate::session::{SessionManager, session_name};
use serde_json::json;

/// Create a new convoy, seeding its tasks from a plan document or with
/// the default planning seed.
pub fn cmd_new(args: ConvoyNewArgs) -> Result<()> {
    let ctx = require_workspace()?;
    let ledger = CliLedger::new(&ctx.config.ledger_bin);
    let sessions = TmuxSessions::new();

    // Duplicate detection first, before anything is created.
    let haystack = format!("{} {}", args.title, args.description);
    let issue_ids = extract_issue_ids(&haystack);
    let scan = find_duplicate_convoys(&ctx.config, &ledger, &sessions, &issue_ids);

    if scan.degraded {
        eprintln!("Warning: duplicate detection unavailable; proceeding without it");
    }

    if !scan.matches.is_empty() && !args.force {
        eprintln!("Found existing convoys for the same external work:");
        for m in &scan.matches {
            eprintln!(
                "  {} \"{}\" (matches {}{})",
                m.convoy.id,
                m.convoy.title,
                m.issue_id,
                if m.live_session { ", session live" } else { "" }
            );
        }
        return Err(MusterError::User(
            "refusing to create a duplicate convoy.\n\
             Re-run with --force to create it anyway."
                .to_string(),
        ));
    }

    // Load the seed plan before creating the convoy so a malformed plan
    // file leaves no half-created convoy behind.
    let plan = match &args.plan {
        Some(path) => {
            let content = std::fs::read_to_string(path).map_err(|e| {
                MusterError::User(format!("failed to read plan file '{}': {}", path, e))
            })?;
            Some(Plan::parse(&content)?)
        }
        None => None,
    };

    let max_workers = args.max_workers.unwrap_or(ctx.config.default_max_workers);
    let mode = args.mode.as_deref().unwrap_or(&ctx.config.default_mode);
    let labels = ConvoyRecord::build_labels(max_workers, mode, args.context.as_deref());

    let convoy_id = ledger.create_convoy(&args.title, &args.description, &labels)?;

    let seeded = match plan {
        Some(plan) => {
            let mut count = 0;
            for section in &plan.sections {
                for task in &section.tasks {
                    ledger.create_task(&convoy_id, &section.name, task)?;
                    count += 1;
                }
            }
            count
        }
        None => {
            let seed = Task::new("planner", "draft the execution plan")?;
            ledger.create_task(&convoy_id, SEED_SECTION, &seed)?;
            1
        }
    };

    append_event_best_effort(
        &ctx,
        &Event::new(EventAction::ConvoyNew)
            .with_convoy(&convoy_id)
            .with_details(json!({
                "title": args.title,
                "max_workers": max_workers,
                "mode": mode,
                "seeded_tasks": seeded,
                "issue_ids": issue_ids,
            })),
    );

    println!("Created convoy {} ({} seed task(s))", convoy_id, seeded);
    if !issue_ids.is_empty() {
        println!("External issues: {}", issue_ids.join(", "));
    }

    Ok(())
}

/// Close a convoy. Closed is terminal: live agents are stopped and their
/// sessions killed before the record closes.
pub fn cmd_close(args: ConvoyCloseArgs) -> Result<()> {
    let ctx = target_context(args.convoy)?;
    let convoy_id = ctx.require_convoy()?.to_string();
    let ledger = CliLedger::new(&ctx.config.ledger_bin);
    let sessions = TmuxSessions::new();

    // Surface a clear NotFound before issuing the close.
    let convoy = ledger.show_convoy(&convoy_id)?;

    // Wind down live agents. Best effort per agent: a straggler that
    // cannot be stopped must not keep the convoy open.
    let tracker = Tracker::new(&ledger);
    for agent in tracker.list(Some(&convoy_id))? {
        if matches!(
            agent.state,
            AgentState::Running | AgentState::Working | AgentState::Stuck
        ) {
            if let Err(e) = tracker.apply(&agent.id, AgentEvent::StopRequested) {
                eprintln!("Warning: failed to stop agent {}: {}", agent.id, e);
            }
        }
        let session = session_name(&ctx.config.session_prefix, &convoy_id, &agent.id);
        if sessions.session_exists(&session).unwrap_or(false)
            && let Err(e) = sessions.kill_session(&session)
        {
            eprintln!("Warning: failed to kill session {}: {}", session, e);
        }
    }

    ledger.close_convoy(&convoy_id, args.reason.as_deref())?;

    append_event_best_effort(
        &ctx,
        &Event::new(EventAction::ConvoyClose)
            .with_convoy(&convoy_id)
            .with_details(json!({ "reason": args.reason })),
    );

    println!("Closed convoy {} \"{}\"", convoy_id, convoy.title);
    Ok(())
}
