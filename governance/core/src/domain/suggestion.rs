// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Suggestion Aggregate
//!
//! A proposed policy change derived from one or more [`Pattern`]s. Suggestions
//! are advisory: nothing reaches the policy store until a human promotes one
//! into a [`Proposal`](super::proposal::Proposal) and that proposal is approved.
//!
//! ## Lifecycle
//!
//! ```text
//! Pending ──accept──► Accepted   (promoted into a proposal)
//!         ──reject──► Rejected
//!         ──supersede► Superseded (a newer suggestion with the same key replaced it)
//! ```
//!
//! Leaving `Pending` is one-way; every other transition fails with
//! [`SuggestionError::InvalidStatusTransition`].
//!
//! [`Pattern`]: super::pattern::Pattern

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::pattern::{clamp_unit, PatternId};
use super::payload::Payload;
use super::policy::{ApprovalValue, EligibilityValue, TransitionValue};
use super::proposal::{PolicyChange, PolicyChangeType, ProposalError, ProposalId};
use super::repository::RepositoryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SuggestionId(pub Uuid);

impl SuggestionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SuggestionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SuggestionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionType {
    AddEligibility,
    RemoveEligibility,
    AddTransition,
    RemoveTransition,
    IncreaseBudget,
    DecreaseBudget,
    AddApproval,
    RemoveApproval,
}

impl SuggestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestionType::AddEligibility => "add_eligibility",
            SuggestionType::RemoveEligibility => "remove_eligibility",
            SuggestionType::AddTransition => "add_transition",
            SuggestionType::RemoveTransition => "remove_transition",
            SuggestionType::IncreaseBudget => "increase_budget",
            SuggestionType::DecreaseBudget => "decrease_budget",
            SuggestionType::AddApproval => "add_approval",
            SuggestionType::RemoveApproval => "remove_approval",
        }
    }
}

impl std::fmt::Display for SuggestionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Impact {
    Low,
    Medium,
    High,
    #[serde(other)]
    Unknown,
}

impl Impact {
    /// Ranking weight used to break confidence ties.
    pub fn weight(&self) -> u8 {
        match self {
            Impact::High => 3,
            Impact::Medium => 2,
            Impact::Low => 1,
            Impact::Unknown => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionStatus {
    Pending,
    Accepted,
    Rejected,
    Superseded,
}

impl std::fmt::Display for SuggestionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SuggestionStatus::Pending => "pending",
            SuggestionStatus::Accepted => "accepted",
            SuggestionStatus::Rejected => "rejected",
            SuggestionStatus::Superseded => "superseded",
        };
        f.write_str(s)
    }
}

/// What the suggestion would change: `target` is the policy key (state,
/// budget name, action), `to` the proposed value rendered as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangeDescriptor {
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityChangeData {
    pub state: String,
    pub tools: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionChangeData {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetChangeData {
    pub budget_name: String,
    pub current: i64,
    pub proposed: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalChangeData {
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Typed change payload. Which variant is legal depends on the [`SuggestionType`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeData {
    Eligibility(EligibilityChangeData),
    Transition(TransitionChangeData),
    Budget(BudgetChangeData),
    Approval(ApprovalChangeData),
}

impl ChangeData {
    fn matches(&self, suggestion_type: SuggestionType) -> bool {
        matches!(
            (self, suggestion_type),
            (ChangeData::Eligibility(_), SuggestionType::AddEligibility | SuggestionType::RemoveEligibility)
                | (ChangeData::Transition(_), SuggestionType::AddTransition | SuggestionType::RemoveTransition)
                | (ChangeData::Budget(_), SuggestionType::IncreaseBudget | SuggestionType::DecreaseBudget)
                | (ChangeData::Approval(_), SuggestionType::AddApproval | SuggestionType::RemoveApproval)
        )
    }

    fn encode(&self) -> Result<Payload, serde_json::Error> {
        match self {
            ChangeData::Eligibility(d) => Payload::encode(d),
            ChangeData::Transition(d) => Payload::encode(d),
            ChangeData::Budget(d) => Payload::encode(d),
            ChangeData::Approval(d) => Payload::encode(d),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SuggestionError {
    #[error("Suggestion not found: {0}")]
    NotFound(String),

    #[error("Suggestion already exists: {0}")]
    Exists(String),

    #[error("Invalid suggestion: {0}")]
    InvalidSuggestion(String),

    #[error("Change data does not match suggestion type {0}")]
    InvalidSuggestionType(SuggestionType),

    #[error("Invalid suggestion status transition: {from} -> {to}")]
    InvalidStatusTransition {
        from: SuggestionStatus,
        to: SuggestionStatus,
    },

    #[error("Suggestion generation failed: {0}")]
    GenerationFailed(String),

    #[error("No patterns to generate suggestions from")]
    NoPatterns,

    #[error("Malformed change data: {0}")]
    ChangeDataDecode(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<RepositoryError> for SuggestionError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(id) => SuggestionError::NotFound(id),
            RepositoryError::AlreadyExists(id) => SuggestionError::Exists(id),
            other => SuggestionError::Storage(other.to_string()),
        }
    }
}

/// Key under which suggestions are considered duplicates of each other.
pub type SuggestionKey = (SuggestionType, String, String);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub id: SuggestionId,
    pub suggestion_type: SuggestionType,
    pub title: String,
    pub description: String,
    pub rationale: String,
    pub confidence: f64,
    pub impact: Impact,
    pub pattern_ids: Vec<PatternId>,
    pub change: ChangeDescriptor,
    #[serde(default)]
    pub change_data: Payload,
    status: SuggestionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposal_id: Option<ProposalId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<SuggestionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Suggestion {
    /// Build a pending suggestion. Fails with `InvalidSuggestionType` when the
    /// change data does not belong to `suggestion_type`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        suggestion_type: SuggestionType,
        title: impl Into<String>,
        description: impl Into<String>,
        rationale: impl Into<String>,
        confidence: f64,
        impact: Impact,
        pattern_ids: Vec<PatternId>,
        change: ChangeDescriptor,
        change_data: ChangeData,
    ) -> Result<Self, SuggestionError> {
        if !change_data.matches(suggestion_type) {
            return Err(SuggestionError::InvalidSuggestionType(suggestion_type));
        }
        let payload = change_data
            .encode()
            .map_err(|e| SuggestionError::InvalidSuggestion(e.to_string()))?;

        let now = Utc::now();
        let suggestion = Self {
            id: SuggestionId::new(),
            suggestion_type,
            title: title.into(),
            description: description.into(),
            rationale: rationale.into(),
            confidence: clamp_unit(confidence),
            impact,
            pattern_ids,
            change,
            change_data: payload,
            status: SuggestionStatus::Pending,
            proposal_id: None,
            superseded_by: None,
            reviewed_by: None,
            rejection_reason: None,
            created_at: now,
            updated_at: now,
        };
        suggestion.validate()?;
        Ok(suggestion)
    }

    pub fn status(&self) -> SuggestionStatus {
        self.status
    }

    pub fn dedup_key(&self) -> SuggestionKey {
        (
            self.suggestion_type,
            self.change.target.clone(),
            self.change.to.clone(),
        )
    }

    pub fn validate(&self) -> Result<(), SuggestionError> {
        if self.title.trim().is_empty() {
            return Err(SuggestionError::InvalidSuggestion("title is required".to_string()));
        }
        if self.change.target.trim().is_empty() {
            return Err(SuggestionError::InvalidSuggestion(
                "change target is required".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(SuggestionError::InvalidSuggestion(format!(
                "confidence {} outside [0, 1]",
                self.confidence
            )));
        }
        Ok(())
    }

    /// Decode `change_data` into the variant matching `suggestion_type`.
    pub fn change_data(&self) -> Result<ChangeData, SuggestionError> {
        let decode_err = |e: serde_json::Error| SuggestionError::ChangeDataDecode(e.to_string());
        let data = match self.suggestion_type {
            SuggestionType::AddEligibility | SuggestionType::RemoveEligibility => {
                ChangeData::Eligibility(self.change_data.decode().map_err(decode_err)?)
            }
            SuggestionType::AddTransition | SuggestionType::RemoveTransition => {
                ChangeData::Transition(self.change_data.decode().map_err(decode_err)?)
            }
            SuggestionType::IncreaseBudget | SuggestionType::DecreaseBudget => {
                ChangeData::Budget(self.change_data.decode().map_err(decode_err)?)
            }
            SuggestionType::AddApproval | SuggestionType::RemoveApproval => {
                ChangeData::Approval(self.change_data.decode().map_err(decode_err)?)
            }
        };
        Ok(data)
    }

    /// Mark as promoted into `proposal_id`.
    pub fn accept(&mut self, proposal_id: ProposalId) -> Result<(), SuggestionError> {
        self.leave_pending(SuggestionStatus::Accepted)?;
        self.proposal_id = Some(proposal_id);
        Ok(())
    }

    pub fn reject(&mut self, reviewer: &str, reason: &str) -> Result<(), SuggestionError> {
        self.leave_pending(SuggestionStatus::Rejected)?;
        self.reviewed_by = Some(reviewer.to_string());
        self.rejection_reason = Some(reason.to_string());
        Ok(())
    }

    pub fn supersede(&mut self, replacement: SuggestionId) -> Result<(), SuggestionError> {
        self.leave_pending(SuggestionStatus::Superseded)?;
        self.superseded_by = Some(replacement);
        Ok(())
    }

    fn leave_pending(&mut self, to: SuggestionStatus) -> Result<(), SuggestionError> {
        if self.status != SuggestionStatus::Pending {
            return Err(SuggestionError::InvalidStatusTransition { from: self.status, to });
        }
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Translate the suggestion into concrete policy changes. Eligibility
    /// suggestions produce one change per tool.
    pub fn to_policy_changes(&self) -> Result<Vec<PolicyChange>, ProposalError> {
        let data = self.change_data()?;
        let description = self.title.clone();

        let changes = match data {
            ChangeData::Eligibility(d) => {
                let eligible = self.suggestion_type == SuggestionType::AddEligibility;
                d.tools
                    .iter()
                    .map(|tool| {
                        let before = EligibilityValue { tool: tool.clone(), eligible: !eligible };
                        let after = EligibilityValue { tool: tool.clone(), eligible };
                        PolicyChange::new(
                            PolicyChangeType::Eligibility,
                            &d.state,
                            &description,
                            Some(&before),
                            &after,
                        )
                    })
                    .collect::<Result<Vec<_>, _>>()?
            }
            ChangeData::Transition(d) => {
                let allowed = self.suggestion_type == SuggestionType::AddTransition;
                let before = TransitionValue { to: d.to.clone(), allowed: !allowed };
                let after = TransitionValue { to: d.to, allowed };
                vec![PolicyChange::new(
                    PolicyChangeType::Transition,
                    &d.from,
                    &description,
                    Some(&before),
                    &after,
                )?]
            }
            ChangeData::Budget(d) => vec![PolicyChange::new(
                PolicyChangeType::Budget,
                &d.budget_name,
                &description,
                Some(&d.current),
                &d.proposed,
            )?],
            ChangeData::Approval(d) => {
                let required = self.suggestion_type == SuggestionType::AddApproval;
                let after = ApprovalValue { required, reason: d.reason };
                vec![PolicyChange::new::<ApprovalValue, _>(
                    PolicyChangeType::Approval,
                    &d.action,
                    &description,
                    None,
                    &after,
                )?]
            }
        };

        Ok(changes)
    }
}
