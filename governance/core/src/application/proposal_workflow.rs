// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Proposal Workflow Service
//!
//! Drives [`Proposal`]s through review and commits approved changes to the
//! policy version store.
//!
//! ## Apply / Rollback
//!
//! ```text
//! apply(id):     current (bootstrap v0 if empty) ─► PolicyApplier ─► save vN+1 ─► proposal.apply(N, N+1)
//! rollback(id):  load v[before] ─► save v[after+1] with its content ─► proposal.rollback(reason)
//! ```
//!
//! The version store and the proposal store are written independently. If
//! the proposal update is lost after the version was saved, calling
//! `apply`/`rollback` again finds the current version already attributed to
//! this proposal (same `proposal_id` and matching `origin`) and only finishes
//! the proposal transition. No second version is written.

use std::sync::Arc;

use tracing::{info, warn};

use crate::application::policy_applier::PolicyApplier;
use crate::domain::notification::{ProposalEvent, ProposalNotifier};
use crate::domain::policy::{PolicyError, PolicyVersion, VersionOrigin};
use crate::domain::proposal::{
    Evidence, PolicyChange, Proposal, ProposalError, ProposalId, ProposalStatus,
};
use crate::domain::repository::{
    PolicyVersionRepository, ProposalFilter, ProposalRepository, SuggestionRepository,
};
use crate::domain::suggestion::SuggestionId;

pub struct ProposalWorkflowService {
    proposals: Arc<dyn ProposalRepository>,
    suggestions: Arc<dyn SuggestionRepository>,
    versions: Arc<dyn PolicyVersionRepository>,
    applier: PolicyApplier,
    notifier: Option<Arc<dyn ProposalNotifier>>,
}

impl ProposalWorkflowService {
    pub fn new(
        proposals: Arc<dyn ProposalRepository>,
        suggestions: Arc<dyn SuggestionRepository>,
        versions: Arc<dyn PolicyVersionRepository>,
    ) -> Self {
        Self {
            proposals,
            suggestions,
            versions,
            applier: PolicyApplier::new(),
            notifier: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn ProposalNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub async fn create_proposal(
        &self,
        title: &str,
        description: &str,
        created_by: &str,
    ) -> Result<Proposal, ProposalError> {
        let proposal = Proposal::new(title, description, created_by)?;
        self.proposals.save(&proposal).await?;
        info!(proposal_id = %proposal.id, actor = created_by, "Proposal created");
        self.notify_created(&proposal).await;
        Ok(proposal)
    }

    /// Draft a proposal from a pending suggestion and mark the suggestion
    /// accepted. If the suggestion cannot be updated the draft is removed
    /// again.
    pub async fn create_from_suggestion(
        &self,
        suggestion_id: SuggestionId,
        created_by: &str,
    ) -> Result<Proposal, ProposalError> {
        let mut suggestion = self.suggestions.get(suggestion_id).await?;
        let proposal = Proposal::from_suggestion(&suggestion, created_by)?;
        suggestion.accept(proposal.id)?;

        self.proposals.save(&proposal).await?;
        if let Err(e) = self.suggestions.update(&suggestion).await {
            // Drop the draft so the suggestion stays pending and a retry
            // does not leave two proposals behind.
            if let Err(cleanup) = self.proposals.delete(proposal.id).await {
                warn!(
                    proposal_id = %proposal.id,
                    error = %cleanup,
                    "Failed to remove draft after suggestion update failed"
                );
            }
            return Err(e.into());
        }

        info!(
            proposal_id = %proposal.id,
            suggestion_id = %suggestion_id,
            actor = created_by,
            "Proposal created from suggestion"
        );
        self.notify_created(&proposal).await;
        Ok(proposal)
    }

    /// Fold a pending suggestion's changes and evidence into a draft proposal.
    pub async fn add_suggestion(
        &self,
        proposal_id: ProposalId,
        suggestion_id: SuggestionId,
    ) -> Result<Proposal, ProposalError> {
        let mut proposal = self.proposals.get(proposal_id).await?;
        let mut suggestion = self.suggestions.get(suggestion_id).await?;

        for change in suggestion.to_policy_changes()? {
            proposal.add_change(change)?;
        }
        for pattern_id in &suggestion.pattern_ids {
            proposal.add_evidence(Evidence {
                kind: "pattern".to_string(),
                reference: pattern_id.to_string(),
                summary: suggestion.rationale.clone(),
            })?;
        }
        suggestion.accept(proposal_id)?;

        self.proposals.update(&proposal).await?;
        self.suggestions.update(&suggestion).await?;
        info!(proposal_id = %proposal_id, suggestion_id = %suggestion_id, "Suggestion added to proposal");
        Ok(proposal)
    }

    pub async fn add_change(
        &self,
        proposal_id: ProposalId,
        change: PolicyChange,
    ) -> Result<Proposal, ProposalError> {
        let mut proposal = self.proposals.get(proposal_id).await?;
        proposal.add_change(change)?;
        self.proposals.update(&proposal).await?;
        Ok(proposal)
    }

    pub async fn add_note(
        &self,
        proposal_id: ProposalId,
        author: &str,
        content: &str,
    ) -> Result<Proposal, ProposalError> {
        let mut proposal = self.proposals.get(proposal_id).await?;
        proposal.add_note(author, content)?;
        self.proposals.update(&proposal).await?;

        self.notify(ProposalEvent::NoteAdded {
            proposal_id,
            author: author.to_string(),
            content: content.to_string(),
            added_at: proposal.updated_at,
        })
        .await;
        Ok(proposal)
    }

    pub async fn submit(&self, proposal_id: ProposalId, submitter: &str) -> Result<Proposal, ProposalError> {
        let mut proposal = self.proposals.get(proposal_id).await?;
        proposal.submit(submitter)?;
        self.proposals.update(&proposal).await?;

        info!(proposal_id = %proposal_id, actor = submitter, "Proposal submitted for review");
        self.notify(ProposalEvent::Submitted {
            proposal_id,
            submitted_by: submitter.to_string(),
            change_count: proposal.changes().len(),
            submitted_at: proposal.updated_at,
        })
        .await;
        Ok(proposal)
    }

    pub async fn approve(
        &self,
        proposal_id: ProposalId,
        approver: &str,
        reason: &str,
    ) -> Result<Proposal, ProposalError> {
        let mut proposal = self.proposals.get(proposal_id).await?;
        proposal.approve(approver, reason)?;
        self.proposals.update(&proposal).await?;

        info!(proposal_id = %proposal_id, actor = approver, "Proposal approved");
        self.notify(ProposalEvent::Approved {
            proposal_id,
            approved_by: approver.to_string(),
            reason: reason.to_string(),
            approved_at: proposal.updated_at,
        })
        .await;
        Ok(proposal)
    }

    pub async fn reject(
        &self,
        proposal_id: ProposalId,
        rejector: &str,
        reason: &str,
    ) -> Result<Proposal, ProposalError> {
        let mut proposal = self.proposals.get(proposal_id).await?;
        proposal.reject(rejector, reason)?;
        self.proposals.update(&proposal).await?;

        info!(proposal_id = %proposal_id, actor = rejector, "Proposal rejected");
        self.notify(ProposalEvent::Rejected {
            proposal_id,
            rejected_by: rejector.to_string(),
            reason: reason.to_string(),
            rejected_at: proposal.updated_at,
        })
        .await;
        Ok(proposal)
    }

    pub async fn withdraw(&self, proposal_id: ProposalId) -> Result<Proposal, ProposalError> {
        let mut proposal = self.proposals.get(proposal_id).await?;
        proposal.withdraw()?;
        self.proposals.update(&proposal).await?;
        info!(proposal_id = %proposal_id, "Proposal withdrawn from review");
        Ok(proposal)
    }

    pub async fn return_to_draft(&self, proposal_id: ProposalId) -> Result<Proposal, ProposalError> {
        let mut proposal = self.proposals.get(proposal_id).await?;
        proposal.return_to_draft()?;
        self.proposals.update(&proposal).await?;
        info!(proposal_id = %proposal_id, "Proposal reopened as draft");
        Ok(proposal)
    }

    pub async fn get(&self, proposal_id: ProposalId) -> Result<Proposal, ProposalError> {
        Ok(self.proposals.get(proposal_id).await?)
    }

    pub async fn list(&self, filter: &ProposalFilter) -> Result<Vec<Proposal>, ProposalError> {
        Ok(self.proposals.list(filter).await?)
    }

    /// Commit an approved proposal as the next policy version.
    pub async fn apply(&self, proposal_id: ProposalId) -> Result<Proposal, ProposalError> {
        let mut proposal = self.proposals.get(proposal_id).await?;
        proposal.ensure_transition(ProposalStatus::Applied)?;

        let current = self.current_or_bootstrap().await?;

        let (before, after) = if current.proposal_id == Some(proposal_id)
            && current.origin == VersionOrigin::Applied
        {
            warn!(
                proposal_id = %proposal_id,
                version = current.version,
                "Policy version already committed for proposal; reconciling proposal status"
            );
            (current.version.saturating_sub(1), current.version)
        } else {
            let next = self
                .applier
                .apply(&current, proposal.changes())
                .map_err(ProposalError::ApplyFailed)?
                .attributed_to(proposal_id, proposal.title.clone());
            self.versions
                .save(&next)
                .await
                .map_err(|e| ProposalError::ApplyFailed(PolicyError::from(e)))?;
            info!(
                proposal_id = %proposal_id,
                version = next.version,
                "Policy version committed"
            );
            (current.version, next.version)
        };

        proposal.apply(before, after)?;
        self.proposals.update(&proposal).await?;

        metrics::counter!("governance_proposals_applied_total").increment(1);
        info!(proposal_id = %proposal_id, before, after, "Proposal applied");
        self.notify(ProposalEvent::Applied {
            proposal_id,
            policy_version_before: before,
            policy_version_after: after,
            applied_at: proposal.updated_at,
        })
        .await;
        Ok(proposal)
    }

    /// Restore the pre-apply snapshot as a new version `after + 1`. Fails with
    /// `RollbackFailed` if another version was committed since this proposal.
    pub async fn rollback(&self, proposal_id: ProposalId, reason: &str) -> Result<Proposal, ProposalError> {
        let mut proposal = self.proposals.get(proposal_id).await?;
        proposal.ensure_transition(ProposalStatus::RolledBack)?;

        let (before, after) = match (proposal.policy_version_before, proposal.policy_version_after) {
            (Some(before), Some(after)) => (before, after),
            _ => {
                return Err(ProposalError::RollbackFailed(
                    "proposal has no recorded policy versions".to_string(),
                ))
            }
        };
        let restored_version = after.checked_add(1).ok_or_else(|| {
            ProposalError::RollbackFailed(format!("no version can follow {}", after))
        })?;

        let current = self.versions.get_current().await?.ok_or_else(|| {
            ProposalError::RollbackFailed("policy version store is empty".to_string())
        })?;

        if current.proposal_id == Some(proposal_id)
            && current.origin == VersionOrigin::RolledBack
            && current.version == restored_version
        {
            warn!(
                proposal_id = %proposal_id,
                version = current.version,
                "Rollback version already committed for proposal; reconciling proposal status"
            );
        } else {
            if current.version != after {
                return Err(ProposalError::RollbackFailed(format!(
                    "version {} is no longer current (current is {})",
                    after, current.version
                )));
            }
            let source = self.versions.get(before).await?.ok_or_else(|| {
                ProposalError::RollbackFailed(format!("policy version {} not found", before))
            })?;
            let restored = PolicyVersion::restored_from(
                &source,
                restored_version,
                proposal_id,
                format!("rollback of '{}': {}", proposal.title, reason),
            );
            self.versions
                .save(&restored)
                .await
                .map_err(|e| ProposalError::RollbackFailed(e.to_string()))?;
            info!(
                proposal_id = %proposal_id,
                version = restored_version,
                restored_from = before,
                "Policy version committed"
            );
        }

        proposal.rollback(reason)?;
        self.proposals.update(&proposal).await?;

        metrics::counter!("governance_proposals_rolled_back_total").increment(1);
        info!(proposal_id = %proposal_id, restored_from = before, version = restored_version, "Proposal rolled back");
        self.notify(ProposalEvent::RolledBack {
            proposal_id,
            reason: reason.to_string(),
            restored_version: before,
            new_version: restored_version,
            rolled_back_at: proposal.updated_at,
        })
        .await;
        Ok(proposal)
    }

    /// Effective policy. An empty store reads as the initial version.
    pub async fn current_policy(&self) -> Result<PolicyVersion, ProposalError> {
        Ok(self
            .versions
            .get_current()
            .await?
            .unwrap_or_else(PolicyVersion::initial))
    }

    pub async fn policy_version(&self, version: u64) -> Result<Option<PolicyVersion>, ProposalError> {
        Ok(self.versions.get(version).await?)
    }

    pub async fn policy_history(&self) -> Result<Vec<PolicyVersion>, ProposalError> {
        Ok(self.versions.list().await?)
    }

    async fn current_or_bootstrap(&self) -> Result<PolicyVersion, ProposalError> {
        if let Some(current) = self.versions.get_current().await? {
            return Ok(current);
        }
        let initial = PolicyVersion::initial();
        self.versions
            .save(&initial)
            .await
            .map_err(|e| ProposalError::ApplyFailed(PolicyError::from(e)))?;
        info!(version = 0, "Bootstrapped empty policy version");
        Ok(initial)
    }

    async fn notify_created(&self, proposal: &Proposal) {
        self.notify(ProposalEvent::Created {
            proposal_id: proposal.id,
            title: proposal.title.clone(),
            created_by: proposal.created_by.clone(),
            created_at: proposal.created_at,
        })
        .await;
    }

    async fn notify(&self, event: ProposalEvent) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        let event_type = event.event_type();
        let proposal_id = event.proposal_id();
        if let Err(e) = notifier.notify(event).await {
            warn!(
                proposal_id = %proposal_id,
                event_type,
                error = %e,
                "Failed to deliver proposal notification"
            );
        }
    }
}
