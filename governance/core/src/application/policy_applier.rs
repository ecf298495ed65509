// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Copy-then-mutate application of [`PolicyChange`]s to a [`PolicyVersion`].
//!
//! The applier never touches `current`. It clones the four snapshots into the
//! successor version and applies the changes in order; the first failing
//! change aborts the whole call and no snapshot is returned.

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::domain::policy::{
    ApprovalValue, EligibilityValue, PolicyError, PolicyVersion, TransitionValue,
};
use crate::domain::proposal::{PolicyChange, PolicyChangeType};

#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyApplier;

impl PolicyApplier {
    pub fn new() -> Self {
        Self
    }

    /// Produce version `current.version + 1` with every change applied.
    pub fn apply(
        &self,
        current: &PolicyVersion,
        changes: &[PolicyChange],
    ) -> Result<PolicyVersion, PolicyError> {
        let mut next = current.successor();
        for change in changes {
            Self::apply_change(&mut next, change)?;
        }
        debug!(
            from = current.version,
            to = next.version,
            changes = changes.len(),
            "Computed policy successor"
        );
        Ok(next)
    }

    fn apply_change(policy: &mut PolicyVersion, change: &PolicyChange) -> Result<(), PolicyError> {
        let target = change.target.as_str();
        if target.trim().is_empty() {
            return Err(PolicyError::InvalidChange {
                target: target.to_string(),
                reason: "empty target".to_string(),
            });
        }

        match change.change_type {
            PolicyChangeType::Eligibility => {
                let value: EligibilityValue = decode_after(change)?;
                require_non_empty(target, "tool", &value.tool)?;
                if value.eligible {
                    policy.eligibility.allow(target, &value.tool);
                } else {
                    policy.eligibility.deny(target, &value.tool);
                }
            }
            PolicyChangeType::Transition => {
                let value: TransitionValue = decode_after(change)?;
                require_non_empty(target, "transition target", &value.to)?;
                if value.allowed {
                    policy.transitions.allow(target, &value.to);
                } else {
                    policy.transitions.deny(target, &value.to);
                }
            }
            PolicyChangeType::Budget => {
                let limit: i64 = decode_after(change)?;
                if limit < 0 {
                    return Err(PolicyError::InvalidChange {
                        target: target.to_string(),
                        reason: format!("negative budget limit {}", limit),
                    });
                }
                policy.budgets.set(target, limit);
            }
            PolicyChangeType::Approval => {
                let value: ApprovalValue = decode_after(change)?;
                if value.required {
                    policy.approvals.require(target, value.reason);
                } else {
                    policy.approvals.release(target);
                }
            }
            PolicyChangeType::Unknown => {
                return Err(PolicyError::UnsupportedChangeType {
                    change_type: change.change_type,
                    target: target.to_string(),
                });
            }
        }

        Ok(())
    }
}

fn decode_after<T: DeserializeOwned>(change: &PolicyChange) -> Result<T, PolicyError> {
    change.after.decode().map_err(|e| PolicyError::PayloadDecode {
        target: change.target.clone(),
        reason: e.to_string(),
    })
}

fn require_non_empty(target: &str, field: &str, value: &str) -> Result<(), PolicyError> {
    if value.trim().is_empty() {
        return Err(PolicyError::InvalidChange {
            target: target.to_string(),
            reason: format!("empty {}", field),
        });
    }
    Ok(())
}
