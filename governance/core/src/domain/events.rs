// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Run events: the append-only history of one agent run.
//!
//! Every event carries a `sequence` that is strictly increasing within its run.
//! The payload is stored as opaque JSON and decoded through [`RunEvent::data`],
//! which picks the payload struct from `event_type`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::warn;
use uuid::Uuid;

use super::payload::Payload;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunEventType {
    RunStarted,
    RunCompleted,
    RunFailed,
    StateTransitioned,
    ToolCalled,
    ToolSucceeded,
    ToolFailed,
    BudgetConsumed,
    BudgetExhausted,
    ApprovalRequested,
    ApprovalGranted,
    ApprovalDenied,
}

impl RunEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunEventType::RunStarted => "run_started",
            RunEventType::RunCompleted => "run_completed",
            RunEventType::RunFailed => "run_failed",
            RunEventType::StateTransitioned => "state_transitioned",
            RunEventType::ToolCalled => "tool_called",
            RunEventType::ToolSucceeded => "tool_succeeded",
            RunEventType::ToolFailed => "tool_failed",
            RunEventType::BudgetConsumed => "budget_consumed",
            RunEventType::BudgetExhausted => "budget_exhausted",
            RunEventType::ApprovalRequested => "approval_requested",
            RunEventType::ApprovalGranted => "approval_granted",
            RunEventType::ApprovalDenied => "approval_denied",
        }
    }
}

impl std::fmt::Display for RunEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStartedData {
    pub initial_state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunCompletedData {
    pub final_state: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFailedData {
    pub state: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTransitionData {
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallData {
    pub state: String,
    pub tool_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSucceededData {
    pub state: String,
    pub tool_name: String,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolFailedData {
    pub state: String,
    pub tool_name: String,
    /// Error class used as the failure signature (e.g. `timeout`, `rate_limited`).
    pub error_type: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetData {
    pub budget_name: String,
    pub consumed: i64,
    pub limit: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalData {
    pub state: String,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
}

/// Typed view of a run event payload. The variant determines the stored
/// [`RunEventType`].
#[derive(Debug, Clone, PartialEq)]
pub enum RunEventData {
    RunStarted(RunStartedData),
    RunCompleted(RunCompletedData),
    RunFailed(RunFailedData),
    StateTransitioned(StateTransitionData),
    ToolCalled(ToolCallData),
    ToolSucceeded(ToolSucceededData),
    ToolFailed(ToolFailedData),
    BudgetConsumed(BudgetData),
    BudgetExhausted(BudgetData),
    ApprovalRequested(ApprovalData),
    ApprovalGranted(ApprovalData),
    ApprovalDenied(ApprovalData),
}

impl RunEventData {
    pub fn event_type(&self) -> RunEventType {
        match self {
            RunEventData::RunStarted(_) => RunEventType::RunStarted,
            RunEventData::RunCompleted(_) => RunEventType::RunCompleted,
            RunEventData::RunFailed(_) => RunEventType::RunFailed,
            RunEventData::StateTransitioned(_) => RunEventType::StateTransitioned,
            RunEventData::ToolCalled(_) => RunEventType::ToolCalled,
            RunEventData::ToolSucceeded(_) => RunEventType::ToolSucceeded,
            RunEventData::ToolFailed(_) => RunEventType::ToolFailed,
            RunEventData::BudgetConsumed(_) => RunEventType::BudgetConsumed,
            RunEventData::BudgetExhausted(_) => RunEventType::BudgetExhausted,
            RunEventData::ApprovalRequested(_) => RunEventType::ApprovalRequested,
            RunEventData::ApprovalGranted(_) => RunEventType::ApprovalGranted,
            RunEventData::ApprovalDenied(_) => RunEventType::ApprovalDenied,
        }
    }

    fn encode(&self) -> Result<Payload, serde_json::Error> {
        match self {
            RunEventData::RunStarted(d) => Payload::encode(d),
            RunEventData::RunCompleted(d) => Payload::encode(d),
            RunEventData::RunFailed(d) => Payload::encode(d),
            RunEventData::StateTransitioned(d) => Payload::encode(d),
            RunEventData::ToolCalled(d) => Payload::encode(d),
            RunEventData::ToolSucceeded(d) => Payload::encode(d),
            RunEventData::ToolFailed(d) => Payload::encode(d),
            RunEventData::BudgetConsumed(d) | RunEventData::BudgetExhausted(d) => Payload::encode(d),
            RunEventData::ApprovalRequested(d)
            | RunEventData::ApprovalGranted(d)
            | RunEventData::ApprovalDenied(d) => Payload::encode(d),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    #[error("Failed to encode {event_type} payload: {reason}")]
    PayloadEncode { event_type: RunEventType, reason: String },

    #[error("Failed to decode {event_type} payload: {reason}")]
    PayloadDecode { event_type: RunEventType, reason: String },
}

/// One immutable entry in a run's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEvent {
    pub id: EventId,
    pub run_id: RunId,
    pub event_type: RunEventType,
    pub timestamp: DateTime<Utc>,
    pub sequence: u64,
    #[serde(default)]
    pub payload: Payload,
}

impl RunEvent {
    /// Build an event for `run_id` at `sequence`, encoding the typed payload.
    pub fn new(run_id: RunId, sequence: u64, data: RunEventData) -> Result<Self, EventError> {
        let event_type = data.event_type();
        let payload = data.encode().map_err(|e| EventError::PayloadEncode {
            event_type,
            reason: e.to_string(),
        })?;

        Ok(Self {
            id: EventId::new(),
            run_id,
            event_type,
            timestamp: Utc::now(),
            sequence,
            payload,
        })
    }

    /// Override the timestamp, used when replaying history recorded elsewhere.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Decode the payload into the struct matching `event_type`.
    pub fn data(&self) -> Result<RunEventData, EventError> {
        let decode_err = |e: serde_json::Error| EventError::PayloadDecode {
            event_type: self.event_type,
            reason: e.to_string(),
        };
        let p = &self.payload;

        let data = match self.event_type {
            RunEventType::RunStarted => RunEventData::RunStarted(p.decode().map_err(decode_err)?),
            RunEventType::RunCompleted => RunEventData::RunCompleted(p.decode().map_err(decode_err)?),
            RunEventType::RunFailed => RunEventData::RunFailed(p.decode().map_err(decode_err)?),
            RunEventType::StateTransitioned => {
                RunEventData::StateTransitioned(p.decode().map_err(decode_err)?)
            }
            RunEventType::ToolCalled => RunEventData::ToolCalled(p.decode().map_err(decode_err)?),
            RunEventType::ToolSucceeded => RunEventData::ToolSucceeded(p.decode().map_err(decode_err)?),
            RunEventType::ToolFailed => RunEventData::ToolFailed(p.decode().map_err(decode_err)?),
            RunEventType::BudgetConsumed => RunEventData::BudgetConsumed(p.decode().map_err(decode_err)?),
            RunEventType::BudgetExhausted => {
                RunEventData::BudgetExhausted(p.decode().map_err(decode_err)?)
            }
            RunEventType::ApprovalRequested => {
                RunEventData::ApprovalRequested(p.decode().map_err(decode_err)?)
            }
            RunEventType::ApprovalGranted => RunEventData::ApprovalGranted(p.decode().map_err(decode_err)?),
            RunEventType::ApprovalDenied => RunEventData::ApprovalDenied(p.decode().map_err(decode_err)?),
        };

        Ok(data)
    }
}

/// Errors that can occur when receiving from an [`EventSubscription`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscriptionError {
    #[error("Event subscription is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Subscriber lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

/// Live feed of events appended to one run after the subscription was taken.
/// No replay: use `load_events_from` to catch up on history.
pub struct EventSubscription {
    run_id: RunId,
    receiver: broadcast::Receiver<RunEvent>,
}

impl EventSubscription {
    pub fn new(run_id: RunId, receiver: broadcast::Receiver<RunEvent>) -> Self {
        Self { run_id, receiver }
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Receive the next event (waits until one is available)
    pub async fn recv(&mut self) -> Result<RunEvent, SubscriptionError> {
        self.receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => SubscriptionError::Closed,
            broadcast::error::RecvError::Lagged(n) => {
                warn!(run_id = %self.run_id, "Run event subscriber lagged by {} events", n);
                SubscriptionError::Lagged(n)
            }
        })
    }

    /// Try to receive an event without waiting
    pub fn try_recv(&mut self) -> Result<RunEvent, SubscriptionError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => SubscriptionError::Empty,
            broadcast::error::TryRecvError::Closed => SubscriptionError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!(run_id = %self.run_id, "Run event subscriber lagged by {} events", n);
                SubscriptionError::Lagged(n)
            }
        })
    }
}
