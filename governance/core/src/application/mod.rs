// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod policy_applier;
pub mod proposal_workflow;
pub mod event_publisher;
pub mod run_recorder;

pub use policy_applier::PolicyApplier;
pub use proposal_workflow::ProposalWorkflowService;
pub use event_publisher::{EventPublisher, PublisherError};
pub use run_recorder::RunRecorder;
