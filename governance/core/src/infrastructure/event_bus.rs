// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Governance Event Bus - Pub/Sub for proposal lifecycle events
//
// In-memory fan-out over tokio broadcast channels. Webhook dispatchers, audit
// loggers and dashboards subscribe here; the workflow service publishes
// through the ProposalNotifier trait.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::domain::config::NotificationConfig;
use crate::domain::notification::{ProposalEvent, ProposalNotifier};
use crate::domain::proposal::ProposalId;

#[derive(Clone)]
pub struct GovernanceEventBus {
    sender: Arc<broadcast::Sender<ProposalEvent>>,
}

impl GovernanceEventBus {
    /// Capacity determines how many events can be buffered before slow
    /// subscribers start dropping old ones.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::from_config(&NotificationConfig::default())
    }

    pub fn from_config(config: &NotificationConfig) -> Self {
        Self::new(config.channel_capacity)
    }

    pub fn publish(&self, event: ProposalEvent) {
        debug!(event_type = event.event_type(), proposal_id = %event.proposal_id(), "Publishing proposal event");

        let receiver_count = self.sender.send(event).unwrap_or(0);
        if receiver_count == 0 {
            debug!("No subscribers listening to proposal events");
        }
    }

    pub fn subscribe(&self) -> ProposalEventReceiver {
        ProposalEventReceiver {
            receiver: self.sender.subscribe(),
            proposal_id: None,
        }
    }

    /// Subscribe to the events of a single proposal.
    pub fn subscribe_proposal(&self, proposal_id: ProposalId) -> ProposalEventReceiver {
        ProposalEventReceiver {
            receiver: self.sender.subscribe(),
            proposal_id: Some(proposal_id),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for GovernanceEventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[async_trait]
impl ProposalNotifier for GovernanceEventBus {
    async fn notify(&self, event: ProposalEvent) -> anyhow::Result<()> {
        self.publish(event);
        Ok(())
    }
}

pub struct ProposalEventReceiver {
    receiver: broadcast::Receiver<ProposalEvent>,
    proposal_id: Option<ProposalId>,
}

impl ProposalEventReceiver {
    /// Receive the next matching event (waits until one is available)
    pub async fn recv(&mut self) -> Result<ProposalEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(|e| match e {
                broadcast::error::RecvError::Closed => EventBusError::Closed,
                broadcast::error::RecvError::Lagged(n) => {
                    warn!("Proposal event receiver lagged by {} events", n);
                    EventBusError::Lagged(n)
                }
            })?;
            if self.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// Try to receive a matching event without waiting
    pub fn try_recv(&mut self) -> Result<ProposalEvent, EventBusError> {
        loop {
            let event = self.receiver.try_recv().map_err(|e| match e {
                broadcast::error::TryRecvError::Empty => EventBusError::Empty,
                broadcast::error::TryRecvError::Closed => EventBusError::Closed,
                broadcast::error::TryRecvError::Lagged(n) => {
                    warn!("Proposal event receiver lagged by {} events", n);
                    EventBusError::Lagged(n)
                }
            })?;
            if self.matches(&event) {
                return Ok(event);
            }
        }
    }

    fn matches(&self, event: &ProposalEvent) -> bool {
        self.proposal_id.is_none_or(|id| event.proposal_id() == id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn created(proposal_id: ProposalId) -> ProposalEvent {
        ProposalEvent::Created {
            proposal_id,
            title: "Raise budget".to_string(),
            created_by: "dev".to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_event_bus_publish_subscribe() {
        let bus = GovernanceEventBus::new(10);
        let mut receiver = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        let id = ProposalId::new();
        bus.notify(created(id)).await.unwrap();

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.proposal_id(), id);
        assert_eq!(event.event_type(), "proposal.created");
    }

    #[tokio::test]
    async fn test_capacity_from_config() {
        let bus = GovernanceEventBus::from_config(&NotificationConfig { channel_capacity: 2 });
        let mut receiver = bus.subscribe();

        for _ in 0..3 {
            bus.publish(created(ProposalId::new()));
        }
        assert_eq!(receiver.try_recv().unwrap_err(), EventBusError::Lagged(1));
    }

    #[tokio::test]
    async fn test_proposal_filter() {
        let bus = GovernanceEventBus::new(10);
        let watched = ProposalId::new();
        let mut receiver = bus.subscribe_proposal(watched);

        bus.publish(created(ProposalId::new()));
        bus.publish(created(watched));

        assert_eq!(receiver.recv().await.unwrap().proposal_id(), watched);
        assert_eq!(receiver.try_recv().unwrap_err(), EventBusError::Empty);
    }

    #[tokio::test]
    async fn test_lagged_receiver() {
        let bus = GovernanceEventBus::new(2);
        let mut receiver = bus.subscribe();
        for _ in 0..5 {
            bus.publish(created(ProposalId::new()));
        }
        assert!(matches!(receiver.try_recv(), Err(EventBusError::Lagged(_))));
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = GovernanceEventBus::default();
        bus.publish(created(ProposalId::new()));
        assert_eq!(bus.subscriber_count(), 0);
    }
}
