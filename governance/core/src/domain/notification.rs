// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Proposal lifecycle notifications.
//!
//! The workflow service emits one [`ProposalEvent`] per successful transition.
//! Delivery (webhooks, retries, fan-out) belongs to whoever implements
//! [`ProposalNotifier`]; a failed notification never fails the transition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::proposal::ProposalId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProposalEvent {
    #[serde(rename = "proposal.created")]
    Created {
        proposal_id: ProposalId,
        title: String,
        created_by: String,
        created_at: DateTime<Utc>,
    },
    #[serde(rename = "proposal.submitted")]
    Submitted {
        proposal_id: ProposalId,
        submitted_by: String,
        change_count: usize,
        submitted_at: DateTime<Utc>,
    },
    #[serde(rename = "proposal.approved")]
    Approved {
        proposal_id: ProposalId,
        approved_by: String,
        reason: String,
        approved_at: DateTime<Utc>,
    },
    #[serde(rename = "proposal.rejected")]
    Rejected {
        proposal_id: ProposalId,
        rejected_by: String,
        reason: String,
        rejected_at: DateTime<Utc>,
    },
    #[serde(rename = "proposal.applied")]
    Applied {
        proposal_id: ProposalId,
        policy_version_before: u64,
        policy_version_after: u64,
        applied_at: DateTime<Utc>,
    },
    #[serde(rename = "proposal.rolled_back")]
    RolledBack {
        proposal_id: ProposalId,
        reason: String,
        restored_version: u64,
        new_version: u64,
        rolled_back_at: DateTime<Utc>,
    },
    #[serde(rename = "proposal.note_added")]
    NoteAdded {
        proposal_id: ProposalId,
        author: String,
        content: String,
        added_at: DateTime<Utc>,
    },
}

impl ProposalEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            ProposalEvent::Created { .. } => "proposal.created",
            ProposalEvent::Submitted { .. } => "proposal.submitted",
            ProposalEvent::Approved { .. } => "proposal.approved",
            ProposalEvent::Rejected { .. } => "proposal.rejected",
            ProposalEvent::Applied { .. } => "proposal.applied",
            ProposalEvent::RolledBack { .. } => "proposal.rolled_back",
            ProposalEvent::NoteAdded { .. } => "proposal.note_added",
        }
    }

    pub fn proposal_id(&self) -> ProposalId {
        match self {
            ProposalEvent::Created { proposal_id, .. }
            | ProposalEvent::Submitted { proposal_id, .. }
            | ProposalEvent::Approved { proposal_id, .. }
            | ProposalEvent::Rejected { proposal_id, .. }
            | ProposalEvent::Applied { proposal_id, .. }
            | ProposalEvent::RolledBack { proposal_id, .. }
            | ProposalEvent::NoteAdded { proposal_id, .. } => *proposal_id,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            ProposalEvent::Created { created_at, .. } => *created_at,
            ProposalEvent::Submitted { submitted_at, .. } => *submitted_at,
            ProposalEvent::Approved { approved_at, .. } => *approved_at,
            ProposalEvent::Rejected { rejected_at, .. } => *rejected_at,
            ProposalEvent::Applied { applied_at, .. } => *applied_at,
            ProposalEvent::RolledBack { rolled_back_at, .. } => *rolled_back_at,
            ProposalEvent::NoteAdded { added_at, .. } => *added_at,
        }
    }
}

/// Outbound boundary for proposal events.
#[async_trait]
pub trait ProposalNotifier: Send + Sync {
    async fn notify(&self, event: ProposalEvent) -> anyhow::Result<()>;
}
