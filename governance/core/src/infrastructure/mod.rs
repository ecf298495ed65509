// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod repositories;
pub mod event_store;
pub mod event_bus;

pub use repositories::{
    InMemoryPatternRepository, InMemoryPolicyVersionRepository, InMemoryProposalRepository,
    InMemorySuggestionRepository,
};
pub use event_store::InMemoryEventStore;
pub use event_bus::{EventBusError, GovernanceEventBus, ProposalEventReceiver};
