// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Per-run event producer that owns sequence numbering.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::application::event_publisher::{EventPublisher, PublisherError};
use crate::domain::events::{
    BudgetData, RunCompletedData, RunEvent, RunEventData, RunFailedData, RunId, RunStartedData,
    StateTransitionData, ToolCallData, ToolFailedData, ToolSucceededData,
};

/// Records the events of one run. Sequence numbers start at 1 and are
/// assigned under a lock held across the publish, so events reach the
/// publisher in sequence order even when `record` is called concurrently.
pub struct RunRecorder {
    run_id: RunId,
    next_sequence: Mutex<u64>,
    publisher: Arc<EventPublisher>,
}

impl RunRecorder {
    pub fn new(publisher: Arc<EventPublisher>) -> Self {
        Self::resume(publisher, RunId::new(), 0)
    }

    /// Continue a run whose last stored event has `last_sequence`.
    pub fn resume(publisher: Arc<EventPublisher>, run_id: RunId, last_sequence: u64) -> Self {
        Self {
            run_id,
            next_sequence: Mutex::new(last_sequence + 1),
            publisher,
        }
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// A sequence number is consumed once the publisher holds the event. An
    /// `Append` error still consumes it: the event stays buffered for retry.
    pub async fn record(&self, data: RunEventData) -> Result<RunEvent, PublisherError> {
        let mut next = self.next_sequence.lock().await;
        let event = RunEvent::new(self.run_id, *next, data)?;
        match self.publisher.publish_one(event.clone()).await {
            Ok(()) => {
                *next += 1;
                Ok(event)
            }
            Err(PublisherError::Append(e)) => {
                *next += 1;
                Err(PublisherError::Append(e))
            }
            Err(e) => Err(e),
        }
    }

    pub async fn start(&self, initial_state: &str, agent_name: Option<&str>) -> Result<RunEvent, PublisherError> {
        self.record(RunEventData::RunStarted(RunStartedData {
            initial_state: initial_state.to_string(),
            agent_name: agent_name.map(str::to_string),
        }))
        .await
    }

    pub async fn transition(&self, from: &str, to: &str) -> Result<RunEvent, PublisherError> {
        self.record(RunEventData::StateTransitioned(StateTransitionData {
            from: from.to_string(),
            to: to.to_string(),
            trigger: None,
        }))
        .await
    }

    pub async fn tool_called(&self, state: &str, tool_name: &str) -> Result<RunEvent, PublisherError> {
        self.record(RunEventData::ToolCalled(ToolCallData {
            state: state.to_string(),
            tool_name: tool_name.to_string(),
        }))
        .await
    }

    pub async fn tool_succeeded(
        &self,
        state: &str,
        tool_name: &str,
        duration_ms: u64,
    ) -> Result<RunEvent, PublisherError> {
        self.record(RunEventData::ToolSucceeded(ToolSucceededData {
            state: state.to_string(),
            tool_name: tool_name.to_string(),
            duration_ms,
        }))
        .await
    }

    pub async fn tool_failed(
        &self,
        state: &str,
        tool_name: &str,
        error_type: &str,
        message: &str,
    ) -> Result<RunEvent, PublisherError> {
        self.record(RunEventData::ToolFailed(ToolFailedData {
            state: state.to_string(),
            tool_name: tool_name.to_string(),
            error_type: error_type.to_string(),
            message: message.to_string(),
        }))
        .await
    }

    pub async fn budget_exhausted(&self, budget_name: &str, consumed: i64, limit: i64) -> Result<RunEvent, PublisherError> {
        self.record(RunEventData::BudgetExhausted(BudgetData {
            budget_name: budget_name.to_string(),
            consumed,
            limit,
        }))
        .await
    }

    pub async fn complete(&self, final_state: &str) -> Result<RunEvent, PublisherError> {
        self.record(RunEventData::RunCompleted(RunCompletedData {
            final_state: final_state.to_string(),
        }))
        .await
    }

    pub async fn fail(&self, state: &str, error: &str) -> Result<RunEvent, PublisherError> {
        self.record(RunEventData::RunFailed(RunFailedData {
            state: state.to_string(),
            error: error.to_string(),
        }))
        .await
    }
}
