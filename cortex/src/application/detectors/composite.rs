// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, warn};

use aegis_governance_core::config::DetectionConfig;
use aegis_governance_core::pattern::{Pattern, PatternType};
use aegis_governance_core::repository::EventStore;

use super::{AffinityDetector, BudgetDetector, FailureDetector, LongRunDetector, SequenceDetector};
use crate::domain::detector::{DetectionError, DetectionOptions, PatternDetector};

/// Runs every registered detector concurrently and concatenates their
/// patterns in registration order. No deduplication is done across
/// detectors. The first failing detector (in registration order) fails the
/// whole pass.
#[derive(Default)]
pub struct CompositeDetector {
    detectors: Vec<Arc<dyn PatternDetector>>,
}

impl CompositeDetector {
    pub fn new(detectors: Vec<Arc<dyn PatternDetector>>) -> Self {
        Self { detectors }
    }

    /// All five built-in detectors, tuned by `config`.
    pub fn from_config(store: Arc<dyn EventStore>, config: &DetectionConfig) -> Self {
        Self::new(vec![
            Arc::new(SequenceDetector::new(store.clone()).with_sequence_length(config.sequence_length)),
            Arc::new(AffinityDetector::new(store.clone()).with_min_co_occurrence(config.affinity_min_co_occurrence)),
            Arc::new(FailureDetector::new(store.clone())),
            Arc::new(BudgetDetector::new(store.clone())),
            Arc::new(LongRunDetector::new(store).with_threshold_seconds(config.long_run_threshold_seconds)),
        ])
    }

    pub fn with_detector(mut self, detector: Arc<dyn PatternDetector>) -> Self {
        self.detectors.push(detector);
        self
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }
}

#[async_trait]
impl PatternDetector for CompositeDetector {
    fn name(&self) -> &str {
        "composite"
    }

    fn pattern_types(&self) -> Vec<PatternType> {
        let mut types = Vec::new();
        for t in self.detectors.iter().flat_map(|d| d.pattern_types()) {
            if !types.contains(&t) {
                types.push(t);
            }
        }
        types
    }

    async fn detect(&self, options: &DetectionOptions) -> Result<Vec<Pattern>, DetectionError> {
        options.validate()?;

        let results = join_all(self.detectors.iter().map(|d| d.detect(options))).await;

        let mut patterns = Vec::new();
        for (detector, result) in self.detectors.iter().zip(results) {
            match result {
                Ok(found) => {
                    debug!(detector = detector.name(), patterns = found.len(), "Detector finished");
                    patterns.extend(found);
                }
                Err(e) => {
                    warn!(detector = detector.name(), error = %e, "Detector failed");
                    return Err(e);
                }
            }
        }

        Ok(patterns)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use aegis_governance_core::infrastructure::InMemoryEventStore;
    use aegis_governance_core::pattern::{LongRunsData, PatternData};
    use aegis_governance_core::repository::RepositoryError;

    struct FixedDetector {
        name: &'static str,
        result: Result<usize, DetectionError>,
    }

    #[async_trait]
    impl PatternDetector for FixedDetector {
        fn name(&self) -> &str {
            self.name
        }

        fn pattern_types(&self) -> Vec<PatternType> {
            vec![PatternType::LongRuns]
        }

        async fn detect(&self, _options: &DetectionOptions) -> Result<Vec<Pattern>, DetectionError> {
            let count = self.result.clone()?;
            Ok((0..count)
                .map(|_| {
                    Pattern::new(
                        self.name,
                        "",
                        0.5,
                        1,
                        PatternData::LongRuns(LongRunsData {
                            long_run_count: 1,
                            total_runs: 2,
                            threshold_seconds: 10,
                            average_duration_seconds: 8.0,
                            max_duration_seconds: 12,
                        }),
                    )
                    .unwrap()
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn test_concatenates_in_registration_order() {
        let composite = CompositeDetector::default()
            .with_detector(Arc::new(FixedDetector { name: "first", result: Ok(2) }))
            .with_detector(Arc::new(FixedDetector { name: "second", result: Ok(1) }));

        let patterns = composite.detect(&permissive()).await.unwrap();
        let names: Vec<_> = patterns.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["first", "first", "second"]);
        assert_eq!(composite.pattern_types(), vec![PatternType::LongRuns]);
    }

    #[tokio::test]
    async fn test_any_failure_fails_the_pass() {
        let failure = DetectionError::Store(RepositoryError::Backend("offline".to_string()));
        let composite = CompositeDetector::new(vec![
            Arc::new(FixedDetector { name: "ok", result: Ok(1) }),
            Arc::new(FixedDetector { name: "broken", result: Err(failure.clone()) }),
        ]);

        assert_eq!(composite.detect(&permissive()).await.unwrap_err(), failure);
    }

    #[tokio::test]
    async fn test_from_config_covers_every_pattern_type() {
        let store = Arc::new(InMemoryEventStore::new());
        let composite = CompositeDetector::from_config(store, &DetectionConfig::default());

        assert_eq!(composite.len(), 5);
        assert_eq!(composite.pattern_types().len(), 5);
        assert!(composite.detect(&DetectionOptions::default()).await.unwrap().is_empty());
    }
}
