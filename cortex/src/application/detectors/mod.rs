// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Pattern detectors over recorded run history.
//!
//! | Detector | Pattern type |
//! |----------|--------------|
//! | [`SequenceDetector`] | `ToolSequence` |
//! | [`AffinityDetector`] | `ToolAffinity` |
//! | [`FailureDetector`] | `ToolFailure` |
//! | [`BudgetDetector`] | `BudgetExhaustion` |
//! | [`LongRunDetector`] | `LongRuns` |
//!
//! [`CompositeDetector`] fans out to any set of them.

pub mod sequence;
pub mod affinity;
pub mod failure;
pub mod budget;
pub mod long_runs;
pub mod composite;

pub use sequence::SequenceDetector;
pub use affinity::AffinityDetector;
pub use failure::FailureDetector;
pub use budget::BudgetDetector;
pub use long_runs::LongRunDetector;
pub use composite::CompositeDetector;

use chrono::{DateTime, Utc};
use tracing::warn;

use aegis_governance_core::events::{RunEvent, RunEventData, RunId, ToolCallData};
use aegis_governance_core::repository::EventStore;

use crate::domain::detector::{DetectionError, DetectionOptions};

pub(crate) struct DecodedEvent {
    pub timestamp: DateTime<Utc>,
    pub data: RunEventData,
}

/// A run's history with payloads decoded, in sequence order.
pub(crate) struct RunHistory {
    pub run_id: RunId,
    pub events: Vec<DecodedEvent>,
}

impl RunHistory {
    /// Events whose payload cannot be decoded are skipped with a warning so
    /// one corrupt entry does not hide the rest of the run.
    fn decode(run_id: RunId, events: &[RunEvent]) -> Self {
        let events = events
            .iter()
            .filter_map(|event| match event.data() {
                Ok(data) => Some(DecodedEvent {
                    timestamp: event.timestamp,
                    data,
                }),
                Err(e) => {
                    warn!(run_id = %run_id, sequence = event.sequence, error = %e, "Skipping undecodable run event");
                    None
                }
            })
            .collect();
        Self { run_id, events }
    }

    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolCallData> {
        self.events.iter().filter_map(|e| match &e.data {
            RunEventData::ToolCalled(call) => Some(call),
            _ => None,
        })
    }
}

/// Load the runs selected by `options`, or every known run when none are named.
pub(crate) async fn load_history(
    store: &dyn EventStore,
    options: &DetectionOptions,
) -> Result<Vec<RunHistory>, DetectionError> {
    let run_ids = if options.run_ids.is_empty() {
        store.list_runs().await?
    } else {
        options.run_ids.clone()
    };

    let mut runs = Vec::with_capacity(run_ids.len());
    for run_id in run_ids {
        let events = store.load_events(run_id).await?;
        if events.is_empty() {
            continue;
        }
        runs.push(RunHistory::decode(run_id, &events));
    }
    Ok(runs)
}

/// Ratio of two counts, zero when the denominator is zero.
pub(crate) fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use aegis_governance_core::infrastructure::InMemoryEventStore;
    use aegis_governance_core::payload::Payload;

    #[tokio::test]
    async fn test_load_history_respects_run_filter() {
        let store = InMemoryEventStore::new();
        let a = seed_run(&store, vec![call("plan", "search")]).await;
        let _b = seed_run(&store, vec![call("plan", "fetch")]).await;

        let all = load_history(&store, &permissive()).await.unwrap();
        assert_eq!(all.len(), 2);

        let only_a = load_history(&store, &permissive().for_runs(vec![a, RunId::new()]))
            .await
            .unwrap();
        assert_eq!(only_a.len(), 1);
        assert_eq!(only_a[0].run_id, a);
        assert_eq!(only_a[0].tool_calls().next().unwrap().tool_name, "search");
    }

    #[tokio::test]
    async fn test_undecodable_events_are_skipped() {
        let store = InMemoryEventStore::new();
        let run_id = RunId::new();
        let mut corrupt = RunEvent::new(run_id, 1, call("plan", "search")).unwrap();
        corrupt.payload = Payload::from_bytes(b"not json".to_vec());
        let good = RunEvent::new(run_id, 2, call("plan", "fetch")).unwrap();
        store.append(&[corrupt, good]).await.unwrap();

        let runs = load_history(&store, &permissive()).await.unwrap();
        let tools: Vec<_> = runs[0].tool_calls().map(|c| c.tool_name.as_str()).collect();
        assert_eq!(tools, vec!["fetch"]);
    }

    #[test]
    fn test_ratio_handles_zero() {
        assert_eq!(ratio(3, 0), 0.0);
        assert_eq!(ratio(1, 4), 0.25);
    }
}
