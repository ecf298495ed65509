// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

use aegis_governance_core::events::{BudgetData, RunEventData, RunId};
use aegis_governance_core::pattern::{BudgetExhaustionData, Pattern, PatternData, PatternType};
use aegis_governance_core::repository::EventStore;

use super::{load_history, ratio};
use crate::domain::detector::{DetectionError, DetectionOptions, PatternDetector};

#[derive(Default)]
struct BudgetStats {
    touched: BTreeSet<RunId>,
    exhausted: BTreeSet<RunId>,
    latest_limit: Option<(DateTime<Utc>, i64)>,
    peak_consumed: i64,
}

impl BudgetStats {
    fn observe(&mut self, run_id: RunId, timestamp: DateTime<Utc>, data: &BudgetData) {
        self.touched.insert(run_id);
        self.peak_consumed = self.peak_consumed.max(data.consumed);
        if self.latest_limit.is_none_or(|(seen, _)| timestamp >= seen) {
            self.latest_limit = Some((timestamp, data.limit));
        }
    }
}

/// Budgets that runs keep running out of. Frequency counts runs with at least
/// one BudgetExhausted event; confidence is that count over every run that
/// reported the budget at all.
pub struct BudgetDetector {
    store: Arc<dyn EventStore>,
}

impl BudgetDetector {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl PatternDetector for BudgetDetector {
    fn name(&self) -> &str {
        "budget"
    }

    fn pattern_types(&self) -> Vec<PatternType> {
        vec![PatternType::BudgetExhaustion]
    }

    async fn detect(&self, options: &DetectionOptions) -> Result<Vec<Pattern>, DetectionError> {
        options.validate()?;
        let runs = load_history(self.store.as_ref(), options).await?;

        let mut budgets: BTreeMap<String, BudgetStats> = BTreeMap::new();
        for run in &runs {
            for event in &run.events {
                match &event.data {
                    RunEventData::BudgetConsumed(data) => {
                        budgets
                            .entry(data.budget_name.clone())
                            .or_default()
                            .observe(run.run_id, event.timestamp, data);
                    }
                    RunEventData::BudgetExhausted(data) => {
                        let stats = budgets.entry(data.budget_name.clone()).or_default();
                        stats.observe(run.run_id, event.timestamp, data);
                        stats.exhausted.insert(run.run_id);
                    }
                    _ => {}
                }
            }
        }

        let mut patterns = Vec::new();
        for (budget_name, stats) in budgets {
            let exhaustion_count = stats.exhausted.len() as u64;
            if exhaustion_count == 0 {
                continue;
            }
            let confidence = ratio(exhaustion_count, stats.touched.len() as u64);
            if !options.accepts(confidence, exhaustion_count) {
                continue;
            }

            let current_limit = stats.latest_limit.map(|(_, limit)| limit).unwrap_or_default();
            let pattern = Pattern::new(
                format!("{budget_name} budget exhausted"),
                format!(
                    "{exhaustion_count} of {} runs exhausted {budget_name} (limit {current_limit}, peak {})",
                    stats.touched.len(),
                    stats.peak_consumed
                ),
                confidence,
                exhaustion_count,
                PatternData::BudgetExhaustion(BudgetExhaustionData {
                    budget_name,
                    exhaustion_count,
                    current_limit,
                    peak_consumed: stats.peak_consumed,
                }),
            )?
            .with_runs(stats.exhausted.into_iter().collect());
            patterns.push(pattern);
        }

        debug!(detector = self.name(), runs = runs.len(), patterns = patterns.len(), "Budget detection complete");
        Ok(patterns)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use aegis_governance_core::infrastructure::InMemoryEventStore;

    fn consumed(consumed: i64, limit: i64) -> RunEventData {
        RunEventData::BudgetConsumed(BudgetData {
            budget_name: "tool_calls".to_string(),
            consumed,
            limit,
        })
    }

    fn exhausted(consumed: i64, limit: i64) -> RunEventData {
        RunEventData::BudgetExhausted(BudgetData {
            budget_name: "tool_calls".to_string(),
            consumed,
            limit,
        })
    }

    #[tokio::test]
    async fn test_counts_exhausted_runs() {
        let store = Arc::new(InMemoryEventStore::new());
        for _ in 0..3 {
            seed_run(store.as_ref(), vec![consumed(50, 100), exhausted(100, 100), exhausted(104, 100)]).await;
        }
        seed_run(store.as_ref(), vec![consumed(40, 100)]).await;

        let patterns = BudgetDetector::new(store).detect(&permissive()).await.unwrap();

        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].frequency, 3);
        assert_eq!(patterns[0].confidence, 0.75);
        let PatternData::BudgetExhaustion(data) = patterns[0].data().unwrap() else {
            panic!("expected budget data");
        };
        assert_eq!(data.exhaustion_count, 3);
        assert_eq!(data.current_limit, 100);
        assert_eq!(data.peak_consumed, 104);
    }

    #[tokio::test]
    async fn test_budget_never_exhausted_is_ignored() {
        let store = Arc::new(InMemoryEventStore::new());
        seed_run(store.as_ref(), vec![consumed(10, 100), consumed(20, 100)]).await;

        assert!(BudgetDetector::new(store).detect(&permissive()).await.unwrap().is_empty());
    }
}
