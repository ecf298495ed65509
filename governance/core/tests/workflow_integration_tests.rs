// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! End-to-end tests for the governed policy workflow.
//!
//! Covers the full proposal lifecycle against the in-memory stores:
//! - Draft → PendingReview → Approved → Applied with a budget change
//! - Rollback producing a new version that restores the earlier content
//! - Rejection, reopening and re-application
//! - Buffered event publishing and configuration loading

use aegis_governance_core::application::{EventPublisher, ProposalWorkflowService, RunRecorder};
use aegis_governance_core::config::GovernanceConfig;
use aegis_governance_core::events::RunEventType;
use aegis_governance_core::infrastructure::{
    GovernanceEventBus, InMemoryEventStore, InMemoryPolicyVersionRepository,
    InMemoryProposalRepository, InMemorySuggestionRepository,
};
use aegis_governance_core::policy::{EligibilityValue, TransitionValue};
use aegis_governance_core::proposal::{PolicyChange, PolicyChangeType, ProposalError, ProposalStatus};
use aegis_governance_core::repository::{EventStore, ProposalFilter};
use std::io::Write;
use std::sync::Arc;

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

fn workflow() -> ProposalWorkflowService {
    ProposalWorkflowService::new(
        Arc::new(InMemoryProposalRepository::new()),
        Arc::new(InMemorySuggestionRepository::new()),
        Arc::new(InMemoryPolicyVersionRepository::new()),
    )
}

fn budget(from: i64, to: i64) -> PolicyChange {
    PolicyChange::new(PolicyChangeType::Budget, "tool_calls", "tool_calls budget", Some(&from), &to).unwrap()
}

#[tokio::test]
async fn test_budget_proposal_scenario() {
    init_tracing();
    let service = workflow();

    let proposal = service
        .create_proposal("Raise tool_calls", "Runs keep hitting the limit", "dev")
        .await
        .unwrap();
    service.add_change(proposal.id, budget(100, 200)).await.unwrap();
    service.submit(proposal.id, "dev").await.unwrap();
    service.approve(proposal.id, "admin", "ok").await.unwrap();
    let applied = service.apply(proposal.id).await.unwrap();

    assert_eq!(applied.status(), ProposalStatus::Applied);
    assert_eq!(applied.policy_version_before, Some(0));
    assert_eq!(applied.policy_version_after, Some(1));

    let v1 = service.policy_version(1).await.unwrap().unwrap();
    assert_eq!(v1.budgets.limit("tool_calls"), Some(200));
}

#[tokio::test]
async fn test_rollback_moves_forward_with_old_content() {
    let service = workflow();

    let proposal = service.create_proposal("Open research", "", "dev").await.unwrap();
    let eligibility = PolicyChange::new::<EligibilityValue, _>(
        PolicyChangeType::Eligibility,
        "research",
        "allow search",
        None,
        &EligibilityValue { tool: "search".to_string(), eligible: true },
    )
    .unwrap();
    let transition = PolicyChange::new::<TransitionValue, _>(
        PolicyChangeType::Transition,
        "research",
        "allow research -> write",
        None,
        &TransitionValue { to: "write".to_string(), allowed: true },
    )
    .unwrap();
    service.add_change(proposal.id, eligibility).await.unwrap();
    service.add_change(proposal.id, transition).await.unwrap();
    service.submit(proposal.id, "dev").await.unwrap();
    service.approve(proposal.id, "admin", "ok").await.unwrap();
    service.apply(proposal.id).await.unwrap();

    let v0 = service.policy_version(0).await.unwrap().unwrap();
    let v1 = service.policy_version(1).await.unwrap().unwrap();
    assert!(v1.is_tool_eligible("research", "search"));

    service.rollback(proposal.id, "broke the writer").await.unwrap();

    let current = service.current_policy().await.unwrap();
    assert_eq!(current.version, v1.version + 1);
    assert!(current.same_content_as(&v0));
    assert!(!current.same_content_as(&v1));

    let history = service.policy_history().await.unwrap();
    assert_eq!(history.iter().map(|v| v.version).collect::<Vec<_>>(), vec![0, 1, 2]);
    assert!(history[1].is_transition_allowed("research", "write"));
}

#[tokio::test]
async fn test_reject_reopen_and_reapply() {
    let service = workflow();

    let proposal = service.create_proposal("Raise tool_calls", "", "dev").await.unwrap();
    service.add_change(proposal.id, budget(100, 500)).await.unwrap();
    service.submit(proposal.id, "dev").await.unwrap();
    let rejected = service.reject(proposal.id, "admin", "too much").await.unwrap();
    assert!(rejected.is_terminal());

    let err = service.apply(proposal.id).await.unwrap_err();
    assert!(matches!(err, ProposalError::InvalidStatusTransition { .. }));

    service.return_to_draft(proposal.id).await.unwrap();
    // Drafts are editable again once reopened.
    service.add_change(proposal.id, budget(500, 150)).await.unwrap();
    service.submit(proposal.id, "dev").await.unwrap();
    service.approve(proposal.id, "admin", "better").await.unwrap();
    service.apply(proposal.id).await.unwrap();

    let current = service.current_policy().await.unwrap();
    assert_eq!(current.budget_limit("tool_calls"), Some(150));

    let applied = service
        .list(&ProposalFilter::default().with_status(ProposalStatus::Applied))
        .await
        .unwrap();
    assert_eq!(applied.len(), 1);
}

#[tokio::test]
async fn test_event_bus_receives_workflow_events() {
    let bus = Arc::new(GovernanceEventBus::new(16));
    let service = workflow().with_notifier(bus.clone());

    let proposal = service.create_proposal("Watched", "", "dev").await.unwrap();
    let mut receiver = bus.subscribe_proposal(proposal.id);

    service.add_change(proposal.id, budget(1, 2)).await.unwrap();
    service.submit(proposal.id, "dev").await.unwrap();
    service.approve(proposal.id, "admin", "ok").await.unwrap();
    service.apply(proposal.id).await.unwrap();

    let mut types = Vec::new();
    for _ in 0..3 {
        types.push(receiver.recv().await.unwrap().event_type());
    }
    assert_eq!(types, vec!["proposal.submitted", "proposal.approved", "proposal.applied"]);
}

#[tokio::test]
async fn test_buffered_publisher_scenario() {
    let store = Arc::new(InMemoryEventStore::new());
    let publisher = Arc::new(EventPublisher::new(store.clone(), 3));
    let recorder = RunRecorder::new(publisher.clone());

    recorder.start("plan", None).await.unwrap();
    recorder.tool_called("plan", "search").await.unwrap();
    assert!(store.load_events(recorder.run_id()).await.unwrap().is_empty());

    recorder.tool_succeeded("plan", "search", 12).await.unwrap();
    assert_eq!(store.load_events(recorder.run_id()).await.unwrap().len(), 3);

    recorder.complete("done").await.unwrap();
    assert_eq!(store.load_events(recorder.run_id()).await.unwrap().len(), 3);
    publisher.close().await.unwrap();

    let events = store.load_events(recorder.run_id()).await.unwrap();
    assert_eq!(events.len(), 4);
    assert_eq!(events[3].event_type, RunEventType::RunCompleted);
}

#[test]
fn test_config_file_loading() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"apiVersion: 100monkeys.ai/v1
kind: GovernanceConfig
metadata:
  name: test
spec:
  publisher:
    buffer_size: 3
  generation:
    budget_increase_rate: 0.5
"#
    )
    .unwrap();

    let config = GovernanceConfig::load_or_default(Some(file.path().to_path_buf())).unwrap();
    assert_eq!(config.metadata.name, "test");
    assert_eq!(config.spec.publisher.buffer_size, 3);
    assert_eq!(config.spec.generation.budget_increase_rate, 0.5);
    assert_eq!(config.spec.notifications.channel_capacity, 1000);
}

#[test]
fn test_invalid_config_file_is_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "apiVersion: 100monkeys.ai/v1\nkind: GovernanceConfig\nspec:\n  detection:\n    sequence_length: 1\n"
    )
    .unwrap();

    assert!(GovernanceConfig::load_or_default(Some(file.path().to_path_buf())).is_err());
}
