// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Client-side buffering in front of an [`EventStore`].
//!
//! With `buffer_size == 0` every publish is appended immediately. Otherwise
//! events accumulate until the buffer holds `buffer_size` events and are then
//! appended as one batch. A failed append keeps the buffer intact, so the next
//! publish, `flush` or `close` retries the same events; duplicate suppression
//! is left to the store's idempotent `(run_id, sequence)` handling.
//!
//! Retained events are capped at `max_buffered`. A publish that would cross
//! the cap retries the pending batch first and fails with
//! [`PublisherError::BufferFull`] if the store is still refusing it.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::config::PublisherConfig;
use crate::domain::events::{EventError, RunEvent};
use crate::domain::repository::{EventStore, RepositoryError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublisherError {
    #[error("Event publisher is closed")]
    Closed,

    #[error("Event buffer is full ({capacity} events pending)")]
    BufferFull { capacity: usize },

    #[error("Failed to append events: {0}")]
    Append(#[from] RepositoryError),

    #[error(transparent)]
    Encode(#[from] EventError),
}

#[derive(Default)]
struct PublisherState {
    buffer: Vec<RunEvent>,
    closed: bool,
}

pub struct EventPublisher {
    store: Arc<dyn EventStore>,
    buffer_size: usize,
    max_buffered: usize,
    state: Mutex<PublisherState>,
}

impl EventPublisher {
    pub fn new(store: Arc<dyn EventStore>, buffer_size: usize) -> Self {
        Self {
            store,
            buffer_size,
            max_buffered: PublisherConfig::default().max_buffered,
            state: Mutex::new(PublisherState::default()),
        }
    }

    pub fn from_config(store: Arc<dyn EventStore>, config: &PublisherConfig) -> Self {
        Self::new(store, config.buffer_size).with_max_buffered(config.max_buffered)
    }

    pub fn with_max_buffered(mut self, max_buffered: usize) -> Self {
        self.max_buffered = max_buffered;
        self
    }

    pub fn unbuffered(store: Arc<dyn EventStore>) -> Self {
        Self::new(store, 0)
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub async fn publish_one(&self, event: RunEvent) -> Result<(), PublisherError> {
        self.publish(vec![event]).await
    }

    pub async fn publish(&self, events: Vec<RunEvent>) -> Result<(), PublisherError> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(PublisherError::Closed);
        }

        let capacity = self.max_buffered.max(self.buffer_size);
        if !state.buffer.is_empty()
            && state.buffer.len() + events.len() > capacity
            && self.flush_locked(&mut state).await.is_err()
        {
            return Err(PublisherError::BufferFull { capacity });
        }

        if self.buffer_size == 0 {
            // Anything still buffered (left over from a failed flush) goes first.
            state.buffer.extend(events);
            return self.flush_locked(&mut state).await;
        }

        state.buffer.extend(events);
        if state.buffer.len() >= self.buffer_size {
            self.flush_locked(&mut state).await?;
        }
        Ok(())
    }

    pub async fn flush(&self) -> Result<(), PublisherError> {
        let mut state = self.state.lock().await;
        self.flush_locked(&mut state).await
    }

    /// Flush, then refuse further publishes. A failed flush leaves the
    /// publisher open so the caller can retry.
    pub async fn close(&self) -> Result<(), PublisherError> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Ok(());
        }
        self.flush_locked(&mut state).await?;
        state.closed = true;
        debug!("Event publisher closed");
        Ok(())
    }

    /// Number of events waiting for the next flush.
    pub async fn buffered(&self) -> usize {
        self.state.lock().await.buffer.len()
    }

    async fn flush_locked(&self, state: &mut PublisherState) -> Result<(), PublisherError> {
        if state.buffer.is_empty() {
            return Ok(());
        }

        match self.store.append(&state.buffer).await {
            Ok(()) => {
                debug!(events = state.buffer.len(), "Flushed run events");
                state.buffer.clear();
                Ok(())
            }
            Err(e) => {
                warn!(
                    events = state.buffer.len(),
                    error = %e,
                    "Failed to flush run events; keeping buffer for retry"
                );
                Err(PublisherError::Append(e))
            }
        }
    }
}
