// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Adaptation event buses
//
// TracingEventBus writes each event to the log. BroadcastEventBus fans events
// out to in-process subscribers over a tokio broadcast channel.

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::application::adaptation_service::EventBus;
use crate::domain::events::AdaptationEvent;

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventBus;

#[async_trait]
impl EventBus for TracingEventBus {
    async fn publish(&self, event: AdaptationEvent) -> Result<()> {
        let payload = serde_json::to_string(&event)?;
        info!(event_type = event.event_type(), event = %payload, "Adaptation event");
        Ok(())
    }
}

#[derive(Clone)]
pub struct BroadcastEventBus {
    sender: broadcast::Sender<AdaptationEvent>,
}

impl BroadcastEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AdaptationEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastEventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[async_trait]
impl EventBus for BroadcastEventBus {
    async fn publish(&self, event: AdaptationEvent) -> Result<()> {
        // No subscribers is not an error.
        let receivers = self.sender.send(event).unwrap_or(0);
        debug!(receivers, "Broadcast adaptation event");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn completed() -> AdaptationEvent {
        AdaptationEvent::CycleCompleted {
            patterns: 1,
            generated: 1,
            superseded: 0,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_broadcast_reaches_subscribers() {
        let bus = BroadcastEventBus::new(4);
        let mut receiver = bus.subscribe();

        bus.publish(completed()).await.unwrap();
        assert_eq!(receiver.recv().await.unwrap().event_type(), "cycle_completed");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        BroadcastEventBus::default().publish(completed()).await.unwrap();
        TracingEventBus.publish(completed()).await.unwrap();
    }
}
