//! Checkpoint/respawn protocol tests.

use super::*;
use crate::agent::{AgentState, HOOK_SLOT, Role};
use crate::error::MusterError;
use crate::ledger::Ledger;
use crate::test_support::{FakeLedger, FakeSessions, workspace_fixture};

#[test]
fn boundary_is_exclusive_at_equality() {
    let decision = should_respawn(80.0, 80.0).unwrap();
    assert!(!decision.should_respawn);
    assert_eq!(decision.reason, None);
}

#[test]
fn above_threshold_triggers_with_reason() {
    let decision = should_respawn(81.0, 80.0).unwrap();
    assert!(decision.should_respawn);
    assert_eq!(decision.reason, Some("context_threshold"));
}

#[test]
fn below_threshold_does_not_trigger() {
    let decision = should_respawn(10.0, 80.0).unwrap();
    assert!(!decision.should_respawn);
}

#[test]
fn negative_usage_is_a_validation_error() {
    let err = should_respawn(-1.0, 80.0).unwrap_err();
    assert!(matches!(err, MusterError::Validation(_)));
}

#[test]
fn non_finite_inputs_are_validation_errors() {
    assert!(should_respawn(f64::NAN, 80.0).is_err());
    assert!(should_respawn(f64::INFINITY, 80.0).is_err());
    assert!(should_respawn(50.0, f64::NAN).is_err());
    assert!(should_respawn(50.0, -3.0).is_err());
}

fn working_agent_with_task(ledger: &FakeLedger) -> (String, String, String) {
    let convoy_id = ledger.seed_convoy("Port the codec", &[]);
    let agent_id = ledger.seed_agent(&convoy_id, Role::Worker, AgentState::Working);
    let task_id = format!("{}/worker-1", convoy_id);
    ledger.slot_set(&agent_id, HOOK_SLOT, &task_id).unwrap();
    (convoy_id, agent_id, task_id)
}

#[test]
fn record_checkpoint_labels_comments_and_suspends() {
    let (_tmp, ctx) = workspace_fixture();
    let ledger = FakeLedger::new();
    let (_, agent_id, task_id) = working_agent_with_task(&ledger);

    record_checkpoint(
        &ctx,
        &ledger,
        &Checkpoint {
            agent_id: agent_id.clone(),
            task_id: Some(task_id.clone()),
            resource_usage: 85.0,
            state: AgentState::Working,
            current_artifact: Some("src/parser.rs".to_string()),
            next_action: Some("finish the length check".to_string()),
        },
    )
    .unwrap();

    let record = ledger.show_agent(&agent_id).unwrap();
    assert_eq!(record.state, AgentState::Stuck);
    assert_eq!(record.state_label.as_deref(), Some("context=85%"));

    let comments = ledger.comments_for(&task_id);
    assert_eq!(comments.len(), 1);
    assert!(comments[0].contains("checkpoint: context usage 85%"));
    assert!(comments[0].contains("state: working"));
    assert!(comments[0].contains("artifact: src/parser.rs"));
    assert!(comments[0].contains("next: finish the length check"));
    assert!(comments[0].contains("pending-respawn: true"));
}

#[test]
fn record_checkpoint_without_task_skips_the_comment() {
    let (_tmp, ctx) = workspace_fixture();
    let ledger = FakeLedger::new();
    let convoy_id = ledger.seed_convoy("Port the codec", &[]);
    let agent_id = ledger.seed_agent(&convoy_id, Role::Worker, AgentState::Working);

    record_checkpoint(
        &ctx,
        &ledger,
        &Checkpoint {
            agent_id: agent_id.clone(),
            task_id: None,
            resource_usage: 90.0,
            state: AgentState::Working,
            current_artifact: None,
            next_action: None,
        },
    )
    .unwrap();

    assert_eq!(ledger.show_agent(&agent_id).unwrap().state, AgentState::Stuck);
}

#[test]
fn respawn_check_below_threshold_only_heartbeats() {
    let (_tmp, ctx) = workspace_fixture();
    let ledger = FakeLedger::new();
    let (_, agent_id, task_id) = working_agent_with_task(&ledger);

    let decision = perform_respawn_check(&ctx, &ledger, &agent_id, 40.0, 80.0).unwrap();
    assert!(!decision.should_respawn);

    let record = ledger.show_agent(&agent_id).unwrap();
    assert_eq!(record.state, AgentState::Working);
    assert_eq!(record.state_label.as_deref(), Some("context=40%"));
    assert!(ledger.comments_for(&task_id).is_empty());
}

#[test]
fn respawn_check_above_threshold_checkpoints_the_hooked_task() {
    let (_tmp, ctx) = workspace_fixture();
    let ledger = FakeLedger::new();
    let (_, agent_id, task_id) = working_agent_with_task(&ledger);

    let decision = perform_respawn_check(&ctx, &ledger, &agent_id, 92.5, 80.0).unwrap();
    assert!(decision.should_respawn);

    let record = ledger.show_agent(&agent_id).unwrap();
    assert_eq!(record.state, AgentState::Stuck);

    let comments = ledger.comments_for(&task_id);
    assert_eq!(comments.len(), 1);
    assert!(comments[0].contains("pending-respawn: true"));
}

#[test]
fn respawn_check_rejects_invalid_usage_before_touching_the_agent() {
    let (_tmp, ctx) = workspace_fixture();
    let ledger = FakeLedger::new();
    let (_, agent_id, _) = working_agent_with_task(&ledger);

    let before = ledger.show_agent(&agent_id).unwrap();
    let err = perform_respawn_check(&ctx, &ledger, &agent_id, -5.0, 80.0).unwrap_err();
    assert!(matches!(err, MusterError::Validation(_)));

    let after = ledger.show_agent(&agent_id).unwrap();
    assert_eq!(after.state, before.state);
    assert_eq!(after.state_label, before.state_label);
}

#[test]
fn prepare_respawn_gathers_role_task_and_session() {
    let (_tmp, ctx) = workspace_fixture();
    let ledger = FakeLedger::new();
    let (convoy_id, agent_id, task_id) = working_agent_with_task(&ledger);

    let respawn = prepare_respawn(&ctx, &ledger, &agent_id).unwrap();
    assert_eq!(respawn.agent_id, agent_id);
    assert_eq!(respawn.role, Role::Worker);
    assert_eq!(respawn.convoy_id, convoy_id);
    assert_eq!(respawn.task_id.as_deref(), Some(task_id.as_str()));
    assert_eq!(
        respawn.session_name,
        format!("muster-{}-{}", convoy_id, agent_id)
    );
}

#[test]
fn prepare_respawn_for_missing_agent_is_not_found() {
    let (_tmp, ctx) = workspace_fixture();
    let ledger = FakeLedger::new();
    let err = prepare_respawn(&ctx, &ledger, "ag-ghost").unwrap_err();
    assert!(matches!(err, MusterError::NotFound { .. }));
}

#[test]
fn execute_respawn_replaces_the_session_and_resumes() {
    let (_tmp, ctx) = workspace_fixture();
    let ledger = FakeLedger::new();
    let sessions = FakeSessions::new();
    let (_, agent_id, task_id) = working_agent_with_task(&ledger);

    // Suspend first, as the protocol would.
    perform_respawn_check(&ctx, &ledger, &agent_id, 95.0, 80.0).unwrap();

    let respawn = prepare_respawn(&ctx, &ledger, &agent_id).unwrap();
    // The old pane is still up.
    sessions.add_session(&respawn.session_name);

    let accepted = execute_respawn(&ctx, &ledger, &sessions, &respawn, None).unwrap();
    assert!(accepted);

    // Old session killed, replacement launched under the same name.
    assert_eq!(sessions.kills(), vec![respawn.session_name.clone()]);
    let launches = sessions.launches();
    assert_eq!(launches.len(), 1);
    assert_eq!(launches[0].0, respawn.session_name);

    // The launch command resumes the SAME agent id and carries its task.
    let command = &launches[0].1;
    assert!(command.contains(&format!("--resume {}", agent_id)));
    assert!(command.contains(&format!("--task {}", task_id)));

    // The agent is Working again, and the handoff is announced on the task.
    assert_eq!(ledger.show_agent(&agent_id).unwrap().state, AgentState::Working);
    let comments = ledger.comments_for(&task_id);
    assert!(comments.iter().any(|c| c.contains("respawn: fresh worker instance")));
}

#[test]
fn execute_respawn_with_working_dir_prefixes_the_command() {
    let (_tmp, ctx) = workspace_fixture();
    let ledger = FakeLedger::new();
    let sessions = FakeSessions::new();
    let (_, agent_id, _) = working_agent_with_task(&ledger);

    perform_respawn_check(&ctx, &ledger, &agent_id, 95.0, 80.0).unwrap();
    let respawn = prepare_respawn(&ctx, &ledger, &agent_id).unwrap();

    execute_respawn(&ctx, &ledger, &sessions, &respawn, Some("/work/tree")).unwrap();

    let (_, command) = &sessions.launches()[0];
    assert!(command.starts_with("cd /work/tree && "));
}

#[test]
fn execute_respawn_launch_failure_marks_the_agent_dead() {
    let (_tmp, ctx) = workspace_fixture();
    let ledger = FakeLedger::new();
    let sessions = FakeSessions::new();
    sessions.fail_commands_containing("--resume");
    let (_, agent_id, task_id) = working_agent_with_task(&ledger);

    perform_respawn_check(&ctx, &ledger, &agent_id, 95.0, 80.0).unwrap();
    let respawn = prepare_respawn(&ctx, &ledger, &agent_id).unwrap();

    let accepted = execute_respawn(&ctx, &ledger, &sessions, &respawn, None).unwrap();
    assert!(!accepted);

    assert_eq!(ledger.show_agent(&agent_id).unwrap().state, AgentState::Dead);
    let comments = ledger.comments_for(&task_id);
    assert!(comments.iter().any(|c| c.contains("respawn failed")));
}
