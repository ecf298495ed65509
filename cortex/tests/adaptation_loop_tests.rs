// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! End-to-end adaptation loop: recorded runs → patterns → suggestions →
//! governed proposal → new policy version.

use aegis_cortex::application::{AdaptationService, StandardAdaptationService};
use aegis_cortex::domain::DetectionOptions;
use aegis_cortex::infrastructure::BroadcastEventBus;
use aegis_governance_core::application::{EventPublisher, ProposalWorkflowService, RunRecorder};
use aegis_governance_core::config::GovernanceConfig;
use aegis_governance_core::events::RunId;
use aegis_governance_core::infrastructure::{
    InMemoryEventStore, InMemoryPatternRepository, InMemoryPolicyVersionRepository,
    InMemoryProposalRepository, InMemorySuggestionRepository,
};
use aegis_governance_core::proposal::ProposalStatus;
use aegis_governance_core::suggestion::{Impact, SuggestionStatus, SuggestionType};
use std::sync::Arc;

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

async fn record_exhausted_run(publisher: Arc<EventPublisher>) {
    let recorder = RunRecorder::new(publisher);
    recorder.start("plan", Some("researcher")).await.unwrap();
    recorder.tool_called("plan", "search").await.unwrap();
    recorder.budget_exhausted("tool_calls", 100, 100).await.unwrap();
    recorder.fail("plan", "tool_calls budget exhausted").await.unwrap();
}

async fn record_failing_deploy(publisher: Arc<EventPublisher>) -> RunId {
    let recorder = RunRecorder::new(publisher);
    recorder.start("act", None).await.unwrap();
    recorder.tool_called("act", "deploy").await.unwrap();
    recorder.tool_failed("act", "deploy", "Timeout", "deploy timed out after 30s").await.unwrap();
    recorder.complete("done").await.unwrap();
    recorder.run_id()
}

#[tokio::test]
async fn test_runs_to_applied_policy() {
    init_tracing();
    let config = GovernanceConfig::default();
    let store = Arc::new(InMemoryEventStore::new());
    let publisher = Arc::new(EventPublisher::new(store.clone(), config.spec.publisher.buffer_size));

    for _ in 0..3 {
        record_exhausted_run(publisher.clone()).await;
    }
    for _ in 0..5 {
        record_failing_deploy(publisher.clone()).await;
    }
    publisher.close().await.unwrap();

    let suggestions = Arc::new(InMemorySuggestionRepository::new());
    let bus = Arc::new(BroadcastEventBus::default());
    let mut events = bus.subscribe();
    let adaptation = StandardAdaptationService::from_config(
        &config,
        store,
        Arc::new(InMemoryPatternRepository::new()),
        suggestions.clone(),
        bus,
    );

    let report = adaptation
        .run_cycle(&DetectionOptions::from_config(&config.spec.detection))
        .await
        .unwrap();

    // Equal confidence: the high impact removal ranks ahead of the budget increase.
    let kinds: Vec<_> = report
        .generated
        .iter()
        .map(|s| (s.suggestion_type, s.impact))
        .collect();
    assert_eq!(
        kinds,
        vec![
            (SuggestionType::RemoveEligibility, Impact::High),
            (SuggestionType::IncreaseBudget, Impact::Medium),
        ]
    );
    assert_eq!(events.recv().await.unwrap().event_type(), "patterns_detected");

    let budget = &report.generated[1];
    assert_eq!(budget.change.target, "tool_calls");
    assert_eq!(budget.change.to, "125");

    let workflow = ProposalWorkflowService::new(
        Arc::new(InMemoryProposalRepository::new()),
        suggestions.clone(),
        Arc::new(InMemoryPolicyVersionRepository::new()),
    );
    let proposal = workflow.create_from_suggestion(budget.id, "dev").await.unwrap();
    workflow.submit(proposal.id, "dev").await.unwrap();
    workflow.approve(proposal.id, "admin", "runs keep stalling").await.unwrap();
    let applied = workflow.apply(proposal.id).await.unwrap();

    assert_eq!(applied.status(), ProposalStatus::Applied);
    assert_eq!(workflow.current_policy().await.unwrap().budget_limit("tool_calls"), Some(125));

    let pending = adaptation.pending_suggestions().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].suggestion_type, SuggestionType::RemoveEligibility);

    let rejected = adaptation
        .reject_suggestion(pending[0].id, "admin", "deploy is being fixed")
        .await
        .unwrap();
    assert_eq!(rejected.status(), SuggestionStatus::Rejected);
    assert!(adaptation.pending_suggestions().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_run_filter_limits_detection() {
    let config = GovernanceConfig::default();
    let store = Arc::new(InMemoryEventStore::new());
    let publisher = Arc::new(EventPublisher::unbuffered(store.clone()));

    let mut run_ids = Vec::new();
    for _ in 0..5 {
        run_ids.push(record_failing_deploy(publisher.clone()).await);
    }

    let adaptation = StandardAdaptationService::from_config(
        &config,
        store,
        Arc::new(InMemoryPatternRepository::new()),
        Arc::new(InMemorySuggestionRepository::new()),
        Arc::new(BroadcastEventBus::default()),
    );

    // One failure is below the detection frequency floor.
    let one_run = DetectionOptions::from_config(&config.spec.detection).for_runs(vec![run_ids[0]]);
    let report = adaptation.run_cycle(&one_run).await.unwrap();
    assert!(report.patterns.is_empty());

    let report = adaptation
        .run_cycle(&DetectionOptions::from_config(&config.spec.detection))
        .await
        .unwrap();
    assert_eq!(report.generated.len(), 1);
}
