// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::proposal::{PolicyChangeType, ProposalId};
use super::repository::RepositoryError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("Policy version not found: {0}")]
    VersionNotFound(u64),

    #[error("Policy version conflict: expected {expected}, got {actual}")]
    VersionConflict { expected: u64, actual: u64 },

    #[error("Unsupported change type {change_type} for target '{target}'")]
    UnsupportedChangeType {
        change_type: PolicyChangeType,
        target: String,
    },

    #[error("Invalid change for '{target}': {reason}")]
    InvalidChange { target: String, reason: String },

    #[error("Failed to decode change for '{target}': {reason}")]
    PayloadDecode { target: String, reason: String },

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<RepositoryError> for PolicyError {
    fn from(err: RepositoryError) -> Self {
        PolicyError::Storage(err.to_string())
    }
}

/// Tools each agent state may invoke.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EligibilityPolicy(pub BTreeMap<String, BTreeSet<String>>);

impl EligibilityPolicy {
    pub fn allow(&mut self, state: &str, tool: &str) {
        self.0
            .entry(state.to_string())
            .or_default()
            .insert(tool.to_string());
    }

    /// Removing the last tool of a state drops the state entry.
    pub fn deny(&mut self, state: &str, tool: &str) {
        if let Some(tools) = self.0.get_mut(state) {
            tools.remove(tool);
            if tools.is_empty() {
                self.0.remove(state);
            }
        }
    }

    pub fn allows(&self, state: &str, tool: &str) -> bool {
        self.0.get(state).is_some_and(|tools| tools.contains(tool))
    }

    pub fn tools_for(&self, state: &str) -> impl Iterator<Item = &str> {
        self.0.get(state).into_iter().flatten().map(String::as_str)
    }
}

/// Allowed state transitions, keyed by source state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransitionPolicy(pub BTreeMap<String, BTreeSet<String>>);

impl TransitionPolicy {
    pub fn allow(&mut self, from: &str, to: &str) {
        self.0.entry(from.to_string()).or_default().insert(to.to_string());
    }

    pub fn deny(&mut self, from: &str, to: &str) {
        if let Some(targets) = self.0.get_mut(from) {
            targets.remove(to);
            if targets.is_empty() {
                self.0.remove(from);
            }
        }
    }

    pub fn allows(&self, from: &str, to: &str) -> bool {
        self.0.get(from).is_some_and(|targets| targets.contains(to))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BudgetPolicy(pub BTreeMap<String, i64>);

impl BudgetPolicy {
    pub fn set(&mut self, name: &str, limit: i64) {
        self.0.insert(name.to_string(), limit);
    }

    pub fn limit(&self, name: &str) -> Option<i64> {
        self.0.get(name).copied()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequirement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Actions that need human sign-off before the agent may perform them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApprovalPolicy(pub BTreeMap<String, ApprovalRequirement>);

impl ApprovalPolicy {
    pub fn require(&mut self, action: &str, reason: Option<String>) {
        self.0.insert(action.to_string(), ApprovalRequirement { reason });
    }

    pub fn release(&mut self, action: &str) {
        self.0.remove(action);
    }

    pub fn requires(&self, action: &str) -> bool {
        self.0.contains_key(action)
    }
}

/// `after` value of an eligibility change; the change target is the state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityValue {
    pub tool: String,
    pub eligible: bool,
}

/// `after` value of a transition change; the change target is the source state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionValue {
    pub to: String,
    pub allowed: bool,
}

/// `after` value of an approval change; the change target is the action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalValue {
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// How a version came to exist. Used to recognise a version that was
/// already written for a proposal whose own status update was lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionOrigin {
    Bootstrap,
    Applied,
    RolledBack,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyVersion {
    pub version: u64,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposal_id: Option<ProposalId>,
    pub description: String,
    pub origin: VersionOrigin,
    #[serde(default)]
    pub eligibility: EligibilityPolicy,
    #[serde(default)]
    pub transitions: TransitionPolicy,
    #[serde(default)]
    pub budgets: BudgetPolicy,
    #[serde(default)]
    pub approvals: ApprovalPolicy,
}

impl PolicyVersion {
    /// Empty version 0.
    pub fn initial() -> Self {
        Self {
            version: 0,
            created_at: Utc::now(),
            proposal_id: None,
            description: "initial policy".to_string(),
            origin: VersionOrigin::Bootstrap,
            eligibility: EligibilityPolicy::default(),
            transitions: TransitionPolicy::default(),
            budgets: BudgetPolicy::default(),
            approvals: ApprovalPolicy::default(),
        }
    }

    /// Deep copy of the four snapshots under the next version number.
    pub fn successor(&self) -> Self {
        Self {
            version: self.version + 1,
            created_at: Utc::now(),
            proposal_id: None,
            description: String::new(),
            origin: VersionOrigin::Applied,
            eligibility: self.eligibility.clone(),
            transitions: self.transitions.clone(),
            budgets: self.budgets.clone(),
            approvals: self.approvals.clone(),
        }
    }

    pub fn attributed_to(mut self, proposal_id: ProposalId, description: impl Into<String>) -> Self {
        self.proposal_id = Some(proposal_id);
        self.description = description.into();
        self
    }

    /// A new version numbered `version` whose content copies `source`.
    pub fn restored_from(
        source: &PolicyVersion,
        version: u64,
        proposal_id: ProposalId,
        description: impl Into<String>,
    ) -> Self {
        Self {
            version,
            created_at: Utc::now(),
            proposal_id: Some(proposal_id),
            description: description.into(),
            origin: VersionOrigin::RolledBack,
            eligibility: source.eligibility.clone(),
            transitions: source.transitions.clone(),
            budgets: source.budgets.clone(),
            approvals: source.approvals.clone(),
        }
    }

    /// Compares the four snapshots only.
    pub fn same_content_as(&self, other: &PolicyVersion) -> bool {
        self.eligibility == other.eligibility
            && self.transitions == other.transitions
            && self.budgets == other.budgets
            && self.approvals == other.approvals
    }

    pub fn is_tool_eligible(&self, state: &str, tool: &str) -> bool {
        self.eligibility.allows(state, tool)
    }

    pub fn is_transition_allowed(&self, from: &str, to: &str) -> bool {
        self.transitions.allows(from, to)
    }

    pub fn budget_limit(&self, name: &str) -> Option<i64> {
        self.budgets.limit(name)
    }

    pub fn requires_approval(&self, action: &str) -> bool {
        self.approvals.requires(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eligibility_allow_and_deny() {
        let mut policy = EligibilityPolicy::default();
        policy.allow("research", "search");
        policy.allow("research", "summarize");
        assert!(policy.allows("research", "search"));
        assert_eq!(policy.tools_for("research").count(), 2);

        policy.deny("research", "search");
        policy.deny("research", "summarize");
        assert!(!policy.allows("research", "search"));
        assert!(policy.0.is_empty());

        // Unknown state is a no-op.
        policy.deny("plan", "search");
    }

    #[test]
    fn test_successor_is_a_deep_copy() {
        let mut v0 = PolicyVersion::initial();
        v0.budgets.set("tool_calls", 100);

        let mut v1 = v0.successor().attributed_to(ProposalId::new(), "raise");
        v1.budgets.set("tool_calls", 200);

        assert_eq!(v1.version, 1);
        assert_eq!(v1.origin, VersionOrigin::Applied);
        assert_eq!(v0.budget_limit("tool_calls"), Some(100));
        assert_eq!(v1.budget_limit("tool_calls"), Some(200));
        assert!(!v0.same_content_as(&v1));
    }

    #[test]
    fn test_restored_from_copies_content_not_number() {
        let mut v0 = PolicyVersion::initial();
        v0.transitions.allow("plan", "act");
        v0.approvals.require("deploy", Some("production".to_string()));
        let mut v1 = v0.successor();
        v1.transitions.deny("plan", "act");

        let v2 = PolicyVersion::restored_from(&v0, v1.version + 1, ProposalId::new(), "rollback");
        assert_eq!(v2.version, 2);
        assert_eq!(v2.origin, VersionOrigin::RolledBack);
        assert!(v2.same_content_as(&v0));
        assert!(v2.is_transition_allowed("plan", "act"));
        assert!(v2.requires_approval("deploy"));
    }

    #[test]
    fn test_snapshot_serializes_as_plain_maps() {
        let mut v0 = PolicyVersion::initial();
        v0.eligibility.allow("plan", "search");
        v0.budgets.set("tool_calls", 50);

        let json = serde_json::to_value(&v0).unwrap();
        assert_eq!(json["eligibility"]["plan"][0], "search");
        assert_eq!(json["budgets"]["tool_calls"], 50);

        let back: PolicyVersion = serde_json::from_value(json).unwrap();
        assert!(back.same_content_as(&v0));
    }
}
