// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contracts for each aggregate, defined in the domain layer and
//! implemented in `crate::infrastructure`.
//!
//! | Trait | Aggregate | Implementations |
//! |-------|-----------|----------------|
//! | `EventStore` | `RunEvent` | `InMemoryEventStore` |
//! | `PatternRepository` | `Pattern` | `InMemoryPatternRepository` |
//! | `SuggestionRepository` | `Suggestion` | `InMemorySuggestionRepository` |
//! | `ProposalRepository` | `Proposal` | `InMemoryProposalRepository` |
//! | `PolicyVersionRepository` | `PolicyVersion` | `InMemoryPolicyVersionRepository` |
//!
//! Blocking, timeouts and cancellation are properties of the backend; the
//! core only awaits these futures.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::events::{EventSubscription, RunEvent, RunId};
use crate::domain::pattern::{Pattern, PatternId, PatternType};
use crate::domain::policy::PolicyVersion;
use crate::domain::proposal::{Proposal, ProposalId, ProposalStatus};
use crate::domain::suggestion::{Suggestion, SuggestionId, SuggestionStatus};

/// Append-only run history.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append a batch atomically: either every event is stored or none is.
    /// An event whose `(run_id, sequence)` is already stored under the same
    /// id is skipped; under a different id the batch fails with `Conflict`.
    async fn append(&self, events: &[RunEvent]) -> Result<(), RepositoryError>;

    /// Full history of a run in sequence order. Unknown runs yield no events.
    async fn load_events(&self, run_id: RunId) -> Result<Vec<RunEvent>, RepositoryError>;

    /// Events with `sequence >= from_sequence`, in order.
    async fn load_events_from(
        &self,
        run_id: RunId,
        from_sequence: u64,
    ) -> Result<Vec<RunEvent>, RepositoryError>;

    /// Events appended after this call. No replay.
    async fn subscribe(&self, run_id: RunId) -> Result<EventSubscription, RepositoryError>;

    /// Every run with at least one event, sorted.
    async fn list_runs(&self) -> Result<Vec<RunId>, RepositoryError>;
}

#[async_trait]
pub trait PatternRepository: Send + Sync {
    async fn save(&self, pattern: &Pattern) -> Result<(), RepositoryError>;

    async fn get(&self, id: PatternId) -> Result<Pattern, RepositoryError>;

    async fn list(&self, filter: &PatternFilter) -> Result<Vec<Pattern>, RepositoryError>;

    async fn delete(&self, id: PatternId) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait SuggestionRepository: Send + Sync {
    /// Insert a new suggestion. Fails with `AlreadyExists` on a duplicate id.
    async fn save(&self, suggestion: &Suggestion) -> Result<(), RepositoryError>;

    async fn get(&self, id: SuggestionId) -> Result<Suggestion, RepositoryError>;

    async fn list(&self, filter: &SuggestionFilter) -> Result<Vec<Suggestion>, RepositoryError>;

    /// Replace a stored suggestion. Fails with `NotFound` if it was never saved.
    async fn update(&self, suggestion: &Suggestion) -> Result<(), RepositoryError>;

    async fn delete(&self, id: SuggestionId) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ProposalRepository: Send + Sync {
    async fn save(&self, proposal: &Proposal) -> Result<(), RepositoryError>;

    async fn get(&self, id: ProposalId) -> Result<Proposal, RepositoryError>;

    async fn list(&self, filter: &ProposalFilter) -> Result<Vec<Proposal>, RepositoryError>;

    async fn update(&self, proposal: &Proposal) -> Result<(), RepositoryError>;

    async fn delete(&self, id: ProposalId) -> Result<(), RepositoryError>;
}

/// Versions are immutable and gap-free: `save` only accepts the successor of
/// the current version (or 0 when the store is empty).
#[async_trait]
pub trait PolicyVersionRepository: Send + Sync {
    async fn save(&self, version: &PolicyVersion) -> Result<(), RepositoryError>;

    async fn get(&self, version: u64) -> Result<Option<PolicyVersion>, RepositoryError>;

    async fn get_current(&self) -> Result<Option<PolicyVersion>, RepositoryError>;

    /// All versions in ascending order.
    async fn list(&self) -> Result<Vec<PolicyVersion>, RepositoryError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrderBy {
    #[default]
    CreatedAt,
    UpdatedAt,
    /// Falls back to `CreatedAt` for aggregates without a confidence.
    Confidence,
}

/// Shared list filter for suggestion and proposal stores.
#[derive(Debug, Clone)]
pub struct ListFilter<S> {
    /// Empty means any status.
    pub statuses: Vec<S>,
    pub created_by: Option<String>,
    pub pattern_id: Option<PatternId>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub offset: usize,
    pub order_by: OrderBy,
    pub descending: bool,
}

impl<S> Default for ListFilter<S> {
    fn default() -> Self {
        Self {
            statuses: Vec::new(),
            created_by: None,
            pattern_id: None,
            created_after: None,
            created_before: None,
            limit: None,
            offset: 0,
            order_by: OrderBy::CreatedAt,
            descending: false,
        }
    }
}

impl<S: PartialEq> ListFilter<S> {
    pub fn with_status(mut self, status: S) -> Self {
        self.statuses.push(status);
        self
    }

    pub fn with_created_by(mut self, actor: impl Into<String>) -> Self {
        self.created_by = Some(actor.into());
        self
    }

    pub fn with_pattern(mut self, pattern_id: PatternId) -> Self {
        self.pattern_id = Some(pattern_id);
        self
    }

    pub fn with_page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = Some(limit);
        self
    }

    pub fn ordered_by(mut self, order_by: OrderBy, descending: bool) -> Self {
        self.order_by = order_by;
        self.descending = descending;
        self
    }

    pub fn matches_status(&self, status: &S) -> bool {
        self.statuses.is_empty() || self.statuses.contains(status)
    }

    pub fn matches_created_at(&self, created_at: DateTime<Utc>) -> bool {
        self.created_after.is_none_or(|after| created_at >= after)
            && self.created_before.is_none_or(|before| created_at < before)
    }

    /// Apply `offset` and `limit` to an already sorted list.
    pub fn paginate<T>(&self, items: Vec<T>) -> Vec<T> {
        let iter = items.into_iter().skip(self.offset);
        match self.limit {
            Some(limit) => iter.take(limit).collect(),
            None => iter.collect(),
        }
    }
}

pub type SuggestionFilter = ListFilter<SuggestionStatus>;
pub type ProposalFilter = ListFilter<ProposalStatus>;

#[derive(Debug, Clone, Default)]
pub struct PatternFilter {
    /// Empty means any type.
    pub pattern_types: Vec<PatternType>,
    pub min_confidence: Option<f64>,
    pub limit: Option<usize>,
}

impl PatternFilter {
    pub fn matches(&self, pattern: &Pattern) -> bool {
        (self.pattern_types.is_empty() || self.pattern_types.contains(&pattern.pattern_type))
            && self.min_confidence.is_none_or(|min| pattern.confidence >= min)
    }
}

/// Repository errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Entity already exists: {0}")]
    AlreadyExists(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paginate() {
        let filter = ProposalFilter::default().with_page(1, 2);
        assert_eq!(filter.paginate(vec![1, 2, 3, 4]), vec![2, 3]);

        let unbounded = ProposalFilter::default();
        assert_eq!(unbounded.paginate(vec![1, 2]), vec![1, 2]);
    }

    #[test]
    fn test_status_filter() {
        let any = SuggestionFilter::default();
        assert!(any.matches_status(&SuggestionStatus::Rejected));

        let pending = SuggestionFilter::default().with_status(SuggestionStatus::Pending);
        assert!(pending.matches_status(&SuggestionStatus::Pending));
        assert!(!pending.matches_status(&SuggestionStatus::Accepted));
    }

    #[test]
    fn test_time_range_is_half_open() {
        let start = Utc::now();
        let end = start + chrono::Duration::seconds(10);
        let filter = ProposalFilter {
            created_after: Some(start),
            created_before: Some(end),
            ..Default::default()
        };
        assert!(filter.matches_created_at(start));
        assert!(!filter.matches_created_at(end));
    }
}
