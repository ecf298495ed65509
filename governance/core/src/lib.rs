// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `aegis-governance-core`: Governed Policy Adaptation (BC-4)
//!
//! Lets the orchestrator evolve an agent's operating policy (tool eligibility,
//! state transitions, budgets, approval gates) without ever applying a change
//! unsupervised.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | `RunEvent`, `Pattern`, `Suggestion`, `Proposal`, `PolicyVersion`, repository traits |
//! | [`application`] | Application | `PolicyApplier`, `ProposalWorkflowService`, `EventPublisher`, `RunRecorder` |
//! | [`infrastructure`] | Infrastructure | In-memory repositories, `InMemoryEventStore`, `GovernanceEventBus` |
//!
//! ## Flow
//!
//! ```text
//! RunRecorder ─► EventPublisher ─► EventStore ─► (aegis-cortex detectors/generators)
//!                                                      │
//!                                                      ▼
//!                    Suggestion ─► Proposal (Draft → PendingReview → Approved → Applied)
//!                                                      │
//!                                                      ▼
//!                               PolicyApplier ─► PolicyVersion N+1 (rollback ⇒ N+2)
//! ```

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
