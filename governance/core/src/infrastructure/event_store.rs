// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// In-memory run event store.
//
// Events are kept per run in sequence order. Each run owns a broadcast
// channel that feeds live subscriptions; subscribers only see events appended
// after they subscribed.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

use crate::domain::events::{EventSubscription, RunEvent, RunId};
use crate::domain::repository::{EventStore, RepositoryError};

const DEFAULT_SUBSCRIPTION_CAPACITY: usize = 1000;

struct RunLog {
    events: Vec<RunEvent>,
    sender: broadcast::Sender<RunEvent>,
}

impl RunLog {
    fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            events: Vec::new(),
            sender,
        }
    }

    fn find(&self, sequence: u64) -> Option<&RunEvent> {
        self.events
            .binary_search_by_key(&sequence, |e| e.sequence)
            .ok()
            .map(|index| &self.events[index])
    }

    fn last_sequence(&self) -> Option<u64> {
        self.events.last().map(|e| e.sequence)
    }
}

#[derive(Clone)]
pub struct InMemoryEventStore {
    runs: Arc<RwLock<HashMap<RunId, RunLog>>>,
    subscription_capacity: usize,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::with_subscription_capacity(DEFAULT_SUBSCRIPTION_CAPACITY)
    }

    /// Capacity of each run's broadcast channel; slower subscribers lag.
    pub fn with_subscription_capacity(capacity: usize) -> Self {
        Self {
            runs: Arc::new(RwLock::new(HashMap::new())),
            subscription_capacity: capacity.max(1),
        }
    }

    /// Split a batch into the events that must be written, skipping exact
    /// replays. Nothing is written if any event conflicts.
    fn plan_append<'a>(
        runs: &HashMap<RunId, RunLog>,
        events: &'a [RunEvent],
    ) -> Result<Vec<&'a RunEvent>, RepositoryError> {
        let mut accepted: Vec<&RunEvent> = Vec::with_capacity(events.len());
        let mut last_in_batch: HashMap<RunId, u64> = HashMap::new();

        for event in events {
            let log = runs.get(&event.run_id);

            let existing = log.and_then(|l| l.find(event.sequence)).or_else(|| {
                accepted
                    .iter()
                    .copied()
                    .find(|e| e.run_id == event.run_id && e.sequence == event.sequence)
            });
            if let Some(existing) = existing {
                if existing.id == event.id {
                    continue;
                }
                return Err(RepositoryError::Conflict(format!(
                    "run {} already has a different event at sequence {}",
                    event.run_id, event.sequence
                )));
            }

            let last = last_in_batch
                .get(&event.run_id)
                .copied()
                .or_else(|| log.and_then(RunLog::last_sequence));
            if let Some(last) = last {
                if event.sequence <= last {
                    return Err(RepositoryError::Conflict(format!(
                        "run {} sequence {} is not after {}",
                        event.run_id, event.sequence, last
                    )));
                }
            }

            last_in_batch.insert(event.run_id, event.sequence);
            accepted.push(event);
        }

        Ok(accepted)
    }
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, events: &[RunEvent]) -> Result<(), RepositoryError> {
        let mut runs = self.runs.write();
        let accepted = Self::plan_append(&runs, events)?;
        let skipped = events.len() - accepted.len();

        for event in &accepted {
            let log = runs
                .entry(event.run_id)
                .or_insert_with(|| RunLog::new(self.subscription_capacity));
            log.events.push((*event).clone());
            // No receivers is not an error.
            let _ = log.sender.send((*event).clone());
        }

        metrics::counter!("governance_events_appended_total").increment(accepted.len() as u64);
        debug!(appended = accepted.len(), skipped, "Appended run events");
        Ok(())
    }

    async fn load_events(&self, run_id: RunId) -> Result<Vec<RunEvent>, RepositoryError> {
        Ok(self
            .runs
            .read()
            .get(&run_id)
            .map(|log| log.events.clone())
            .unwrap_or_default())
    }

    async fn load_events_from(
        &self,
        run_id: RunId,
        from_sequence: u64,
    ) -> Result<Vec<RunEvent>, RepositoryError> {
        let runs = self.runs.read();
        let Some(log) = runs.get(&run_id) else {
            return Ok(Vec::new());
        };
        let start = log.events.partition_point(|e| e.sequence < from_sequence);
        Ok(log.events[start..].to_vec())
    }

    async fn subscribe(&self, run_id: RunId) -> Result<EventSubscription, RepositoryError> {
        let mut runs = self.runs.write();
        let log = runs
            .entry(run_id)
            .or_insert_with(|| RunLog::new(self.subscription_capacity));
        Ok(EventSubscription::new(run_id, log.sender.subscribe()))
    }

    async fn list_runs(&self) -> Result<Vec<RunId>, RepositoryError> {
        let mut run_ids: Vec<RunId> = self
            .runs
            .read()
            .iter()
            .filter(|(_, log)| !log.events.is_empty())
            .map(|(id, _)| *id)
            .collect();
        run_ids.sort();
        Ok(run_ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::{RunEventData, SubscriptionError, ToolCallData};

    fn tool_call(run_id: RunId, sequence: u64, tool: &str) -> RunEvent {
        RunEvent::new(
            run_id,
            sequence,
            RunEventData::ToolCalled(ToolCallData {
                state: "act".to_string(),
                tool_name: tool.to_string(),
            }),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_append_and_load_in_order() {
        let store = InMemoryEventStore::new();
        let run_id = RunId::new();
        let batch: Vec<_> = (1..=4).map(|s| tool_call(run_id, s, "search")).collect();

        store.append(&batch).await.unwrap();
        let all = store.load_events(run_id).await.unwrap();
        assert_eq!(all, batch);

        let suffix = store.load_events_from(run_id, 3).await.unwrap();
        assert_eq!(suffix.iter().map(|e| e.sequence).collect::<Vec<_>>(), vec![3, 4]);
        assert!(store.load_events(RunId::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_replayed_batch_is_a_no_op() {
        let store = InMemoryEventStore::new();
        let run_id = RunId::new();
        let first = vec![tool_call(run_id, 1, "a"), tool_call(run_id, 2, "b")];
        store.append(&first).await.unwrap();

        let mut retry = first.clone();
        retry.push(tool_call(run_id, 3, "c"));
        store.append(&retry).await.unwrap();

        assert_eq!(store.load_events(run_id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_conflicting_batch_is_rejected_whole() {
        let store = InMemoryEventStore::new();
        let run_id = RunId::new();
        store.append(&[tool_call(run_id, 1, "a")]).await.unwrap();

        let other_run = RunId::new();
        let batch = vec![tool_call(other_run, 1, "x"), tool_call(run_id, 1, "impostor")];
        let err = store.append(&batch).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
        assert!(store.load_events(other_run).await.unwrap().is_empty());

        let out_of_order = vec![tool_call(run_id, 3, "c"), tool_call(run_id, 2, "b")];
        assert!(store.append(&out_of_order).await.is_err());
        assert_eq!(store.load_events(run_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_subscribe_sees_only_future_events() {
        let store = InMemoryEventStore::new();
        let run_id = RunId::new();
        store.append(&[tool_call(run_id, 1, "a")]).await.unwrap();

        let mut subscription = store.subscribe(run_id).await.unwrap();
        assert_eq!(subscription.try_recv().unwrap_err(), SubscriptionError::Empty);

        store.append(&[tool_call(run_id, 2, "b")]).await.unwrap();
        let received = subscription.recv().await.unwrap();
        assert_eq!(received.sequence, 2);
    }

    #[tokio::test]
    async fn test_list_runs_skips_subscribe_only_runs() {
        let store = InMemoryEventStore::new();
        let a = RunId::new();
        let b = RunId::new();
        store.append(&[tool_call(a, 1, "x")]).await.unwrap();
        store.append(&[tool_call(b, 1, "y")]).await.unwrap();
        let _idle = store.subscribe(RunId::new()).await.unwrap();

        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(store.list_runs().await.unwrap(), expected);
    }
}
