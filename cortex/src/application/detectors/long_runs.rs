// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use aegis_governance_core::events::{RunEventData, RunId};
use aegis_governance_core::pattern::{LongRunsData, Pattern, PatternData, PatternType};
use aegis_governance_core::repository::EventStore;

use super::{load_history, ratio, RunHistory};
use crate::domain::detector::{DetectionError, DetectionOptions, PatternDetector};

pub const DEFAULT_THRESHOLD_SECONDS: u64 = 300;

/// Seconds from the first RunStarted to the last RunCompleted or RunFailed.
/// Runs that never started or never finished are not measured.
fn run_duration(run: &RunHistory) -> Option<u64> {
    let started = run
        .events
        .iter()
        .find(|e| matches!(e.data, RunEventData::RunStarted(_)))?
        .timestamp;
    let finished = run
        .events
        .iter()
        .rev()
        .find(|e| matches!(e.data, RunEventData::RunCompleted(_) | RunEventData::RunFailed(_)))?
        .timestamp;
    let seconds = (finished - started).num_seconds();
    u64::try_from(seconds).ok()
}

/// Emits at most one pattern summarising every measured run that exceeded
/// the threshold.
pub struct LongRunDetector {
    store: Arc<dyn EventStore>,
    threshold_seconds: u64,
}

impl LongRunDetector {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self {
            store,
            threshold_seconds: DEFAULT_THRESHOLD_SECONDS,
        }
    }

    pub fn with_threshold_seconds(mut self, threshold_seconds: u64) -> Self {
        self.threshold_seconds = threshold_seconds;
        self
    }
}

#[async_trait]
impl PatternDetector for LongRunDetector {
    fn name(&self) -> &str {
        "long_runs"
    }

    fn pattern_types(&self) -> Vec<PatternType> {
        vec![PatternType::LongRuns]
    }

    async fn detect(&self, options: &DetectionOptions) -> Result<Vec<Pattern>, DetectionError> {
        options.validate()?;
        let runs = load_history(self.store.as_ref(), options).await?;

        let measured: Vec<(RunId, u64)> = runs
            .iter()
            .filter_map(|run| run_duration(run).map(|d| (run.run_id, d)))
            .collect();
        let long: Vec<(RunId, u64)> = measured
            .iter()
            .copied()
            .filter(|(_, d)| *d > self.threshold_seconds)
            .collect();

        debug!(
            detector = self.name(),
            measured = measured.len(),
            long = long.len(),
            threshold_seconds = self.threshold_seconds,
            "Long run detection complete"
        );

        let long_run_count = long.len() as u64;
        let total_runs = measured.len() as u64;
        let confidence = ratio(long_run_count, total_runs);
        if long_run_count == 0 || !options.accepts(confidence, long_run_count) {
            return Ok(Vec::new());
        }

        let average_duration_seconds =
            measured.iter().map(|(_, d)| *d as f64).sum::<f64>() / total_runs as f64;
        let max_duration_seconds = long.iter().map(|(_, d)| *d).max().unwrap_or(0);

        let pattern = Pattern::new(
            "Runs exceed time threshold",
            format!(
                "{long_run_count} of {total_runs} runs took longer than {}s (max {max_duration_seconds}s)",
                self.threshold_seconds
            ),
            confidence,
            long_run_count,
            PatternData::LongRuns(LongRunsData {
                long_run_count,
                total_runs,
                threshold_seconds: self.threshold_seconds,
                average_duration_seconds,
                max_duration_seconds,
            }),
        )?
        .with_runs(long.into_iter().map(|(id, _)| id).collect());

        Ok(vec![pattern])
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use aegis_governance_core::infrastructure::InMemoryEventStore;

    #[tokio::test]
    async fn test_detects_runs_over_threshold() {
        let store = Arc::new(InMemoryEventStore::new());
        // seed_run spaces events one second apart.
        let slow = seed_run(store.as_ref(), vec![started(), call("s", "a"), call("s", "b"), completed()]).await;
        seed_run(store.as_ref(), vec![started(), completed()]).await;
        seed_run(store.as_ref(), vec![started(), call("s", "a")]).await;

        let detector = LongRunDetector::new(store).with_threshold_seconds(2);
        let patterns = detector.detect(&permissive()).await.unwrap();

        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].run_ids, vec![slow]);
        assert_eq!(patterns[0].confidence, 0.5);
        let PatternData::LongRuns(data) = patterns[0].data().unwrap() else {
            panic!("expected long run data");
        };
        assert_eq!(data.long_run_count, 1);
        assert_eq!(data.total_runs, 2);
        assert_eq!(data.max_duration_seconds, 3);
        assert_eq!(data.average_duration_seconds, 2.0);
    }

    #[tokio::test]
    async fn test_no_pattern_when_all_runs_are_fast() {
        let store = Arc::new(InMemoryEventStore::new());
        seed_run(store.as_ref(), vec![started(), completed()]).await;

        let patterns = LongRunDetector::new(store).detect(&permissive()).await.unwrap();
        assert!(patterns.is_empty());
    }
}
