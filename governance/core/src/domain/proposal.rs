// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Proposal Aggregate
//!
//! A human-reviewable bundle of [`PolicyChange`]s. The proposal is the only
//! path by which policy changes: every transition that leads to `Applied`
//! passes through `approve`, and `approve` refuses an empty actor.
//!
//! ## State Machine
//!
//! ```text
//!            ┌──────────── withdraw ───────────┐
//!            ▼                                 │
//!   Draft ──submit──► PendingReview ──approve──► Approved ──apply──► Applied
//!     │  ▲                 │                       │                   │
//!     │  │               reject                  reject             rollback
//!     │  │                 ▼                       ▼                   ▼
//!     └──┼─reject──────► Rejected ◄────────────────┘              RolledBack
//!        │                 │                                           │
//!        └── return_to_draft ◄─────────────────────────────────────────┘
//! ```
//!
//! `Rejected` and `RolledBack` report [`ProposalStatus::is_terminal`] even
//! though both can be reopened into `Draft`: they are closed for review but
//! not deleted.
//!
//! ## Invariants
//!
//! - Changes and evidence are frozen once the proposal leaves `Draft`.
//! - `policy_version_after == policy_version_before + 1` for an applied proposal.
//! - Status changes only follow [`ProposalStatus::valid_transitions`].

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::payload::Payload;
use super::policy::PolicyError;
use super::repository::RepositoryError;
use super::suggestion::{Suggestion, SuggestionError, SuggestionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProposalId(pub Uuid);

impl ProposalId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ProposalId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ProposalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Draft,
    PendingReview,
    Approved,
    Rejected,
    Applied,
    RolledBack,
}

impl ProposalStatus {
    pub const ALL: [ProposalStatus; 6] = [
        ProposalStatus::Draft,
        ProposalStatus::PendingReview,
        ProposalStatus::Approved,
        ProposalStatus::Rejected,
        ProposalStatus::Applied,
        ProposalStatus::RolledBack,
    ];

    pub fn valid_transitions(&self) -> &'static [ProposalStatus] {
        use ProposalStatus::*;
        match self {
            Draft => &[PendingReview, Rejected],
            PendingReview => &[Approved, Rejected, Draft],
            Approved => &[Applied, Rejected],
            Applied => &[RolledBack],
            Rejected => &[Draft],
            RolledBack => &[Draft],
        }
    }

    pub fn can_transition_to(&self, to: ProposalStatus) -> bool {
        self.valid_transitions().contains(&to)
    }

    /// Closed for review. Both terminal states can still return to `Draft`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProposalStatus::Rejected | ProposalStatus::RolledBack)
    }

    pub fn requires_human_action(&self) -> bool {
        matches!(self, ProposalStatus::PendingReview)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalStatus::Draft => "draft",
            ProposalStatus::PendingReview => "pending_review",
            ProposalStatus::Approved => "approved",
            ProposalStatus::Rejected => "rejected",
            ProposalStatus::Applied => "applied",
            ProposalStatus::RolledBack => "rolled_back",
        }
    }
}

impl std::fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyChangeType {
    Eligibility,
    Transition,
    Budget,
    Approval,
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for PolicyChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PolicyChangeType::Eligibility => "eligibility",
            PolicyChangeType::Transition => "transition",
            PolicyChangeType::Budget => "budget",
            PolicyChangeType::Approval => "approval",
            PolicyChangeType::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// One policy mutation. `before` is informational and may be absent; `after`
/// is what the applier writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyChange {
    pub change_type: PolicyChangeType,
    pub target: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<Payload>,
    pub after: Payload,
}

impl PolicyChange {
    pub fn new<B: Serialize, A: Serialize>(
        change_type: PolicyChangeType,
        target: &str,
        description: &str,
        before: Option<&B>,
        after: &A,
    ) -> Result<Self, ProposalError> {
        let encode_err = |e: serde_json::Error| ProposalError::PayloadEncode(e.to_string());
        let before = before.map(Payload::encode).transpose().map_err(encode_err)?;
        let after = Payload::encode(after).map_err(encode_err)?;

        Ok(Self {
            change_type,
            target: target.to_string(),
            description: description.to_string(),
            before,
            after,
        })
    }

    pub fn before<T: DeserializeOwned>(&self) -> Result<Option<T>, ProposalError> {
        self.before
            .as_ref()
            .map(|payload| payload.decode())
            .transpose()
            .map_err(|e| ProposalError::PayloadDecode(format!("{} before: {}", self.target, e)))
    }

    pub fn after<T: DeserializeOwned>(&self) -> Result<T, ProposalError> {
        self.after
            .decode()
            .map_err(|e| ProposalError::PayloadDecode(format!("{} after: {}", self.target, e)))
    }
}

/// Supporting material attached while drafting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub kind: String,
    pub reference: String,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalNote {
    pub author: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProposalError {
    #[error("Proposal not found: {0}")]
    NotFound(String),

    #[error("Proposal already exists: {0}")]
    Exists(String),

    #[error("Invalid proposal: {0}")]
    InvalidProposal(String),

    #[error("Invalid proposal status transition: {from} -> {to}")]
    InvalidStatusTransition {
        from: ProposalStatus,
        to: ProposalStatus,
    },

    #[error("Cannot modify proposal in status {0}")]
    CannotModifyNonDraft(ProposalStatus),

    #[error("Proposal has no changes")]
    NoChanges,

    #[error("A human actor is required")]
    HumanActorRequired,

    #[error("Failed to apply proposal: {0}")]
    ApplyFailed(PolicyError),

    #[error("Failed to roll back proposal: {0}")]
    RollbackFailed(String),

    #[error("Failed to encode change payload: {0}")]
    PayloadEncode(String),

    #[error("Failed to decode change payload: {0}")]
    PayloadDecode(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Suggestion(#[from] SuggestionError),
}

impl From<RepositoryError> for ProposalError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(id) => ProposalError::NotFound(id),
            RepositoryError::AlreadyExists(id) => ProposalError::Exists(id),
            other => ProposalError::Storage(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: ProposalId,
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion_id: Option<SuggestionId>,
    pub created_by: String,
    status: ProposalStatus,
    changes: Vec<PolicyChange>,
    #[serde(default)]
    evidence: Vec<Evidence>,
    #[serde(default)]
    notes: Vec<ProposalNote>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub submitted_by: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_reason: Option<String>,
    pub applied_at: Option<DateTime<Utc>>,
    pub rolled_back_at: Option<DateTime<Utc>>,

    pub policy_version_before: Option<u64>,
    pub policy_version_after: Option<u64>,
    pub rollback_reason: Option<String>,
}

impl Proposal {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        created_by: impl Into<String>,
    ) -> Result<Self, ProposalError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(ProposalError::InvalidProposal("title is required".to_string()));
        }

        let now = Utc::now();
        Ok(Self {
            id: ProposalId::new(),
            title,
            description: description.into(),
            suggestion_id: None,
            created_by: created_by.into(),
            status: ProposalStatus::Draft,
            changes: Vec::new(),
            evidence: Vec::new(),
            notes: Vec::new(),
            created_at: now,
            updated_at: now,
            submitted_by: None,
            submitted_at: None,
            reviewed_by: None,
            reviewed_at: None,
            review_reason: None,
            applied_at: None,
            rolled_back_at: None,
            policy_version_before: None,
            policy_version_after: None,
            rollback_reason: None,
        })
    }

    /// Draft a proposal carrying the suggestion's changes, with one evidence
    /// entry per source pattern. The suggestion itself is left untouched.
    pub fn from_suggestion(
        suggestion: &Suggestion,
        created_by: impl Into<String>,
    ) -> Result<Self, ProposalError> {
        let mut proposal = Self::new(
            suggestion.title.clone(),
            suggestion.description.clone(),
            created_by,
        )?;
        proposal.suggestion_id = Some(suggestion.id);
        proposal.changes = suggestion.to_policy_changes()?;
        proposal.evidence = suggestion
            .pattern_ids
            .iter()
            .map(|pattern_id| Evidence {
                kind: "pattern".to_string(),
                reference: pattern_id.to_string(),
                summary: suggestion.rationale.clone(),
            })
            .collect();
        Ok(proposal)
    }

    pub fn status(&self) -> ProposalStatus {
        self.status
    }

    pub fn changes(&self) -> &[PolicyChange] {
        &self.changes
    }

    pub fn evidence(&self) -> &[Evidence] {
        &self.evidence
    }

    pub fn notes(&self) -> &[ProposalNote] {
        &self.notes
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn requires_human_action(&self) -> bool {
        self.status.requires_human_action()
    }

    pub fn add_change(&mut self, change: PolicyChange) -> Result<(), ProposalError> {
        self.ensure_draft()?;
        self.changes.push(change);
        self.touch();
        Ok(())
    }

    pub fn remove_change(&mut self, index: usize) -> Result<PolicyChange, ProposalError> {
        self.ensure_draft()?;
        if index >= self.changes.len() {
            return Err(ProposalError::InvalidProposal(format!(
                "no change at index {}",
                index
            )));
        }
        let removed = self.changes.remove(index);
        self.touch();
        Ok(removed)
    }

    pub fn add_evidence(&mut self, evidence: Evidence) -> Result<(), ProposalError> {
        self.ensure_draft()?;
        self.evidence.push(evidence);
        self.touch();
        Ok(())
    }

    /// Notes are discussion, not content: allowed in every status.
    pub fn add_note(&mut self, author: &str, content: &str) -> Result<(), ProposalError> {
        if author.trim().is_empty() {
            return Err(ProposalError::HumanActorRequired);
        }
        self.notes.push(ProposalNote {
            author: author.to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
        });
        self.touch();
        Ok(())
    }

    pub fn submit(&mut self, submitter: &str) -> Result<(), ProposalError> {
        if self.changes.is_empty() {
            return Err(ProposalError::NoChanges);
        }
        self.ensure_transition(ProposalStatus::PendingReview)?;

        let now = Utc::now();
        self.status = ProposalStatus::PendingReview;
        self.submitted_by = Some(submitter.to_string());
        self.submitted_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn approve(&mut self, approver: &str, reason: &str) -> Result<(), ProposalError> {
        self.review(ProposalStatus::Approved, approver, reason)
    }

    pub fn reject(&mut self, rejector: &str, reason: &str) -> Result<(), ProposalError> {
        self.review(ProposalStatus::Rejected, rejector, reason)
    }

    fn review(&mut self, to: ProposalStatus, actor: &str, reason: &str) -> Result<(), ProposalError> {
        if actor.trim().is_empty() {
            return Err(ProposalError::HumanActorRequired);
        }
        self.ensure_transition(to)?;

        let now = Utc::now();
        self.status = to;
        self.reviewed_by = Some(actor.to_string());
        self.reviewed_at = Some(now);
        self.review_reason = Some(reason.to_string());
        self.updated_at = now;
        Ok(())
    }

    /// Record that the policy moved from version `before` to `after`.
    pub fn apply(&mut self, before: u64, after: u64) -> Result<(), ProposalError> {
        self.ensure_transition(ProposalStatus::Applied)?;
        if before.checked_add(1) != Some(after) {
            return Err(ProposalError::InvalidProposal(format!(
                "applied version {} does not follow {}",
                after, before
            )));
        }

        let now = Utc::now();
        self.status = ProposalStatus::Applied;
        self.policy_version_before = Some(before);
        self.policy_version_after = Some(after);
        self.applied_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn rollback(&mut self, reason: &str) -> Result<(), ProposalError> {
        self.ensure_transition(ProposalStatus::RolledBack)?;

        let now = Utc::now();
        self.status = ProposalStatus::RolledBack;
        self.rollback_reason = Some(reason.to_string());
        self.rolled_back_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Reopen a rejected or rolled-back proposal for editing. Review,
    /// submission and version bookkeeping from the previous round is cleared.
    pub fn return_to_draft(&mut self) -> Result<(), ProposalError> {
        if !self.status.is_terminal() {
            return Err(ProposalError::InvalidStatusTransition {
                from: self.status,
                to: ProposalStatus::Draft,
            });
        }
        self.ensure_transition(ProposalStatus::Draft)?;
        self.reset_to_draft();
        Ok(())
    }

    /// Pull a proposal back out of review without a decision.
    pub fn withdraw(&mut self) -> Result<(), ProposalError> {
        if self.status != ProposalStatus::PendingReview {
            return Err(ProposalError::InvalidStatusTransition {
                from: self.status,
                to: ProposalStatus::Draft,
            });
        }
        self.reset_to_draft();
        Ok(())
    }

    fn reset_to_draft(&mut self) {
        self.status = ProposalStatus::Draft;
        self.submitted_by = None;
        self.submitted_at = None;
        self.reviewed_by = None;
        self.reviewed_at = None;
        self.review_reason = None;
        self.applied_at = None;
        self.rolled_back_at = None;
        self.policy_version_before = None;
        self.policy_version_after = None;
        self.rollback_reason = None;
        self.touch();
    }

    pub fn ensure_transition(&self, to: ProposalStatus) -> Result<(), ProposalError> {
        if self.status.can_transition_to(to) {
            Ok(())
        } else {
            Err(ProposalError::InvalidStatusTransition { from: self.status, to })
        }
    }

    pub fn validate(&self) -> Result<(), ProposalError> {
        if self.title.trim().is_empty() {
            return Err(ProposalError::InvalidProposal("title is required".to_string()));
        }
        for change in &self.changes {
            if change.target.trim().is_empty() {
                return Err(ProposalError::InvalidProposal(
                    "change target is required".to_string(),
                ));
            }
        }
        if let (Some(before), Some(after)) = (self.policy_version_before, self.policy_version_after) {
            if before.checked_add(1) != Some(after) {
                return Err(ProposalError::InvalidProposal(format!(
                    "applied version {} does not follow {}",
                    after, before
                )));
            }
        }
        Ok(())
    }

    fn ensure_draft(&self) -> Result<(), ProposalError> {
        if self.status != ProposalStatus::Draft {
            return Err(ProposalError::CannotModifyNonDraft(self.status));
        }
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::policy::EligibilityValue;

    fn budget_change(from: i64, to: i64) -> PolicyChange {
        PolicyChange::new(
            PolicyChangeType::Budget,
            "tool_calls",
            "raise tool_calls",
            Some(&from),
            &to,
        )
        .unwrap()
    }

    fn draft_with_change() -> Proposal {
        let mut proposal = Proposal::new("Raise budget", "", "dev").unwrap();
        proposal.add_change(budget_change(100, 200)).unwrap();
        proposal
    }

    #[test]
    fn test_transition_table() {
        use ProposalStatus::*;
        let allowed = [
            (Draft, PendingReview),
            (Draft, Rejected),
            (PendingReview, Approved),
            (PendingReview, Rejected),
            (PendingReview, Draft),
            (Approved, Applied),
            (Approved, Rejected),
            (Applied, RolledBack),
            (Rejected, Draft),
            (RolledBack, Draft),
        ];

        for from in ProposalStatus::ALL {
            for to in ProposalStatus::ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_terminal_and_human_action_flags() {
        for status in ProposalStatus::ALL {
            assert_eq!(
                status.is_terminal(),
                matches!(status, ProposalStatus::Rejected | ProposalStatus::RolledBack)
            );
            assert_eq!(
                status.requires_human_action(),
                status == ProposalStatus::PendingReview
            );
        }
        assert!(ProposalStatus::Rejected.can_transition_to(ProposalStatus::Draft));
        assert!(ProposalStatus::RolledBack.can_transition_to(ProposalStatus::Draft));
    }

    #[test]
    fn test_change_payload_roundtrip() {
        let change = budget_change(100, 200);
        assert_eq!(change.before::<i64>().unwrap(), Some(100));
        assert_eq!(change.after::<i64>().unwrap(), 200);

        let value = EligibilityValue { tool: "search".to_string(), eligible: true };
        let no_before = PolicyChange::new::<EligibilityValue, _>(
            PolicyChangeType::Eligibility,
            "plan",
            "",
            None,
            &value,
        )
        .unwrap();
        assert_eq!(no_before.before::<EligibilityValue>().unwrap(), None);
        assert_eq!(no_before.after::<EligibilityValue>().unwrap(), value);
    }

    #[test]
    fn test_malformed_after_is_decode_error() {
        let mut change = budget_change(1, 2);
        change.after = Payload::from_bytes(b"\"not a number\"".to_vec());
        assert!(matches!(change.after::<i64>(), Err(ProposalError::PayloadDecode(_))));
    }

    #[test]
    fn test_submit_without_changes_fails_in_any_status() {
        let mut proposal = Proposal::new("Empty", "", "dev").unwrap();
        assert_eq!(proposal.submit("dev"), Err(ProposalError::NoChanges));

        proposal.reject("admin", "empty").unwrap();
        assert_eq!(proposal.submit("dev"), Err(ProposalError::NoChanges));
    }

    #[test]
    fn test_resubmit_from_pending_review_is_invalid() {
        let mut proposal = draft_with_change();
        proposal.submit("dev").unwrap();
        assert_eq!(
            proposal.submit("dev"),
            Err(ProposalError::InvalidStatusTransition {
                from: ProposalStatus::PendingReview,
                to: ProposalStatus::PendingReview,
            })
        );
    }

    #[test]
    fn test_human_actor_required() {
        let mut proposal = draft_with_change();
        proposal.submit("dev").unwrap();
        assert_eq!(proposal.approve("", "ok"), Err(ProposalError::HumanActorRequired));
        assert_eq!(proposal.reject("  ", "no"), Err(ProposalError::HumanActorRequired));

        // The actor check wins over the transition check.
        let mut draft = Proposal::new("x", "", "dev").unwrap();
        assert_eq!(draft.approve("", "ok"), Err(ProposalError::HumanActorRequired));
    }

    #[test]
    fn test_changes_frozen_after_submit() {
        let mut proposal = draft_with_change();
        proposal.submit("dev").unwrap();

        assert_eq!(
            proposal.add_change(budget_change(1, 2)),
            Err(ProposalError::CannotModifyNonDraft(ProposalStatus::PendingReview))
        );
        assert!(proposal.remove_change(0).is_err());
        proposal.add_note("admin", "looks fine").unwrap();
        assert_eq!(proposal.notes().len(), 1);
    }

    #[test]
    fn test_full_lifecycle() {
        let mut proposal = draft_with_change();
        proposal.submit("dev").unwrap();
        proposal.approve("admin", "ok").unwrap();
        proposal.apply(0, 1).unwrap();

        assert_eq!(proposal.status(), ProposalStatus::Applied);
        assert_eq!(proposal.policy_version_before, Some(0));
        assert_eq!(proposal.policy_version_after, Some(1));

        proposal.rollback("regression").unwrap();
        assert_eq!(proposal.status(), ProposalStatus::RolledBack);
        assert!(proposal.is_terminal());

        proposal.return_to_draft().unwrap();
        assert_eq!(proposal.status(), ProposalStatus::Draft);
        assert_eq!(proposal.policy_version_after, None);
        assert_eq!(proposal.changes().len(), 1);
    }

    #[test]
    fn test_apply_requires_approved() {
        let mut proposal = draft_with_change();
        assert_eq!(
            proposal.apply(0, 1),
            Err(ProposalError::InvalidStatusTransition {
                from: ProposalStatus::Draft,
                to: ProposalStatus::Applied,
            })
        );
        assert!(proposal.rollback("nothing to undo").is_err());
        assert!(proposal.return_to_draft().is_err());
    }

    #[test]
    fn test_apply_rejects_versions_past_u64_max() {
        let mut proposal = draft_with_change();
        proposal.submit("dev").unwrap();
        proposal.approve("admin", "ok").unwrap();

        assert!(matches!(
            proposal.apply(u64::MAX, 0),
            Err(ProposalError::InvalidProposal(_))
        ));
        assert_eq!(proposal.status(), ProposalStatus::Approved);

        proposal.policy_version_before = Some(u64::MAX);
        proposal.policy_version_after = Some(0);
        assert!(matches!(proposal.validate(), Err(ProposalError::InvalidProposal(_))));
    }

    #[test]
    fn test_withdraw_returns_to_draft() {
        let mut proposal = draft_with_change();
        proposal.submit("dev").unwrap();
        proposal.withdraw().unwrap();
        assert_eq!(proposal.status(), ProposalStatus::Draft);
        assert!(proposal.submitted_by.is_none());
        assert!(proposal.withdraw().is_err());
    }

    #[test]
    fn test_empty_title_rejected() {
        assert!(matches!(
            Proposal::new("  ", "", "dev"),
            Err(ProposalError::InvalidProposal(_))
        ));
    }
}
