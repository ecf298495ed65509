// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// In-memory repositories for development and tests.
//
// Each repository clones aggregates in and out, so callers never share
// mutable state with the store.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::pattern::{Pattern, PatternId};
use crate::domain::policy::PolicyVersion;
use crate::domain::proposal::{Proposal, ProposalId};
use crate::domain::repository::{
    OrderBy, PatternFilter, PatternRepository, PolicyVersionRepository, ProposalFilter,
    ProposalRepository, RepositoryError, SuggestionFilter, SuggestionRepository,
};
use crate::domain::suggestion::{Suggestion, SuggestionId};

#[derive(Clone, Default)]
pub struct InMemoryPatternRepository {
    patterns: Arc<RwLock<HashMap<PatternId, Pattern>>>,
}

impl InMemoryPatternRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PatternRepository for InMemoryPatternRepository {
    async fn save(&self, pattern: &Pattern) -> Result<(), RepositoryError> {
        let mut patterns = self.patterns.write();
        if patterns.contains_key(&pattern.id) {
            return Err(RepositoryError::AlreadyExists(pattern.id.to_string()));
        }
        patterns.insert(pattern.id, pattern.clone());
        Ok(())
    }

    async fn get(&self, id: PatternId) -> Result<Pattern, RepositoryError> {
        self.patterns
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }

    /// Highest confidence first.
    async fn list(&self, filter: &PatternFilter) -> Result<Vec<Pattern>, RepositoryError> {
        let mut matched: Vec<Pattern> = self
            .patterns
            .read()
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        matched.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a.detected_at.cmp(&b.detected_at))
                .then_with(|| a.id.0.cmp(&b.id.0))
        });
        if let Some(limit) = filter.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    async fn delete(&self, id: PatternId) -> Result<(), RepositoryError> {
        self.patterns
            .write()
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }
}

#[derive(Clone, Default)]
pub struct InMemorySuggestionRepository {
    suggestions: Arc<RwLock<HashMap<SuggestionId, Suggestion>>>,
}

impl InMemorySuggestionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SuggestionRepository for InMemorySuggestionRepository {
    async fn save(&self, suggestion: &Suggestion) -> Result<(), RepositoryError> {
        let mut suggestions = self.suggestions.write();
        if suggestions.contains_key(&suggestion.id) {
            return Err(RepositoryError::AlreadyExists(suggestion.id.to_string()));
        }
        suggestions.insert(suggestion.id, suggestion.clone());
        Ok(())
    }

    async fn get(&self, id: SuggestionId) -> Result<Suggestion, RepositoryError> {
        self.suggestions
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }

    async fn list(&self, filter: &SuggestionFilter) -> Result<Vec<Suggestion>, RepositoryError> {
        let mut matched: Vec<Suggestion> = self
            .suggestions
            .read()
            .values()
            .filter(|s| {
                filter.matches_status(&s.status())
                    && filter.matches_created_at(s.created_at)
                    && filter.pattern_id.is_none_or(|id| s.pattern_ids.contains(&id))
            })
            .cloned()
            .collect();

        matched.sort_by(|a, b| {
            let primary = match filter.order_by {
                OrderBy::CreatedAt => a.created_at.cmp(&b.created_at),
                OrderBy::UpdatedAt => a.updated_at.cmp(&b.updated_at),
                OrderBy::Confidence => a.confidence.total_cmp(&b.confidence),
            };
            directed(primary.then_with(|| a.id.0.cmp(&b.id.0)), filter.descending)
        });
        Ok(filter.paginate(matched))
    }

    async fn update(&self, suggestion: &Suggestion) -> Result<(), RepositoryError> {
        let mut suggestions = self.suggestions.write();
        match suggestions.get_mut(&suggestion.id) {
            Some(stored) => {
                *stored = suggestion.clone();
                Ok(())
            }
            None => Err(RepositoryError::NotFound(suggestion.id.to_string())),
        }
    }

    async fn delete(&self, id: SuggestionId) -> Result<(), RepositoryError> {
        self.suggestions
            .write()
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }
}

#[derive(Clone, Default)]
pub struct InMemoryProposalRepository {
    proposals: Arc<RwLock<HashMap<ProposalId, Proposal>>>,
}

impl InMemoryProposalRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProposalRepository for InMemoryProposalRepository {
    async fn save(&self, proposal: &Proposal) -> Result<(), RepositoryError> {
        let mut proposals = self.proposals.write();
        if proposals.contains_key(&proposal.id) {
            return Err(RepositoryError::AlreadyExists(proposal.id.to_string()));
        }
        proposals.insert(proposal.id, proposal.clone());
        Ok(())
    }

    async fn get(&self, id: ProposalId) -> Result<Proposal, RepositoryError> {
        self.proposals
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }

    async fn list(&self, filter: &ProposalFilter) -> Result<Vec<Proposal>, RepositoryError> {
        let pattern_ref = filter.pattern_id.map(|id| id.to_string());
        let mut matched: Vec<Proposal> = self
            .proposals
            .read()
            .values()
            .filter(|p| {
                filter.matches_status(&p.status())
                    && filter.matches_created_at(p.created_at)
                    && filter.created_by.as_ref().is_none_or(|actor| &p.created_by == actor)
                    && pattern_ref
                        .as_ref()
                        .is_none_or(|r| p.evidence().iter().any(|e| &e.reference == r))
            })
            .cloned()
            .collect();

        matched.sort_by(|a, b| {
            let primary = match filter.order_by {
                OrderBy::UpdatedAt => a.updated_at.cmp(&b.updated_at),
                OrderBy::CreatedAt | OrderBy::Confidence => a.created_at.cmp(&b.created_at),
            };
            directed(primary.then_with(|| a.id.0.cmp(&b.id.0)), filter.descending)
        });
        Ok(filter.paginate(matched))
    }

    async fn update(&self, proposal: &Proposal) -> Result<(), RepositoryError> {
        let mut proposals = self.proposals.write();
        match proposals.get_mut(&proposal.id) {
            Some(stored) => {
                *stored = proposal.clone();
                Ok(())
            }
            None => Err(RepositoryError::NotFound(proposal.id.to_string())),
        }
    }

    async fn delete(&self, id: ProposalId) -> Result<(), RepositoryError> {
        self.proposals
            .write()
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }
}

/// Append-only, gap-free version history. Index `n` holds version `n`.
#[derive(Clone, Default)]
pub struct InMemoryPolicyVersionRepository {
    versions: Arc<RwLock<Vec<PolicyVersion>>>,
}

impl InMemoryPolicyVersionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PolicyVersionRepository for InMemoryPolicyVersionRepository {
    async fn save(&self, version: &PolicyVersion) -> Result<(), RepositoryError> {
        let mut versions = self.versions.write();
        let expected = versions.len() as u64;
        if version.version != expected {
            return Err(RepositoryError::Conflict(format!(
                "policy version {} does not follow current {}",
                version.version,
                expected as i64 - 1
            )));
        }
        versions.push(version.clone());
        Ok(())
    }

    async fn get(&self, version: u64) -> Result<Option<PolicyVersion>, RepositoryError> {
        let Ok(index) = usize::try_from(version) else {
            return Ok(None);
        };
        Ok(self.versions.read().get(index).cloned())
    }

    async fn get_current(&self) -> Result<Option<PolicyVersion>, RepositoryError> {
        Ok(self.versions.read().last().cloned())
    }

    async fn list(&self) -> Result<Vec<PolicyVersion>, RepositoryError> {
        Ok(self.versions.read().clone())
    }
}

fn directed(ordering: Ordering, descending: bool) -> Ordering {
    if descending {
        ordering.reverse()
    } else {
        ordering
    }
}
