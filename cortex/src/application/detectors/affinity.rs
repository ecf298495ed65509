// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Affinity Detector - tools used together in the same state
//
// A pair co-occurs in a run when both tools are called while the agent is in
// the same state. Correlation divides the number of co-occurring runs by the
// number of runs using the less frequently used tool of the pair.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

use aegis_governance_core::events::RunId;
use aegis_governance_core::pattern::{Pattern, PatternData, PatternType, ToolAffinityData};
use aegis_governance_core::repository::EventStore;

use super::{load_history, ratio};
use crate::domain::detector::{DetectionError, DetectionOptions, PatternDetector};

pub const DEFAULT_MIN_CO_OCCURRENCE: u64 = 3;

#[derive(Default)]
struct PairStats {
    runs: BTreeSet<RunId>,
    states: BTreeMap<String, u64>,
}

pub struct AffinityDetector {
    store: Arc<dyn EventStore>,
    min_co_occurrence: u64,
}

impl AffinityDetector {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self {
            store,
            min_co_occurrence: DEFAULT_MIN_CO_OCCURRENCE,
        }
    }

    pub fn with_min_co_occurrence(mut self, min_co_occurrence: u64) -> Self {
        self.min_co_occurrence = min_co_occurrence.max(1);
        self
    }
}

#[async_trait]
impl PatternDetector for AffinityDetector {
    fn name(&self) -> &str {
        "affinity"
    }

    fn pattern_types(&self) -> Vec<PatternType> {
        vec![PatternType::ToolAffinity]
    }

    async fn detect(&self, options: &DetectionOptions) -> Result<Vec<Pattern>, DetectionError> {
        options.validate()?;
        let runs = load_history(self.store.as_ref(), options).await?;

        let mut tool_runs: BTreeMap<String, u64> = BTreeMap::new();
        let mut pairs: BTreeMap<(String, String), PairStats> = BTreeMap::new();

        for run in &runs {
            let mut by_state: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
            for call in run.tool_calls() {
                by_state.entry(call.state.as_str()).or_default().insert(call.tool_name.as_str());
            }

            let used: BTreeSet<&str> = by_state.values().flatten().copied().collect();
            for tool in used {
                *tool_runs.entry(tool.to_string()).or_default() += 1;
            }

            for (state, tools) in &by_state {
                let tools: Vec<&str> = tools.iter().copied().collect();
                for (i, first) in tools.iter().enumerate() {
                    for second in &tools[i + 1..] {
                        let stats = pairs.entry((first.to_string(), second.to_string())).or_default();
                        stats.runs.insert(run.run_id);
                        *stats.states.entry(state.to_string()).or_default() += 1;
                    }
                }
            }
        }

        let mut patterns = Vec::new();
        for ((first, second), stats) in pairs {
            let co_occurrences = stats.runs.len() as u64;
            if co_occurrences < self.min_co_occurrence {
                continue;
            }
            let usage = |tool: &str| tool_runs.get(tool).copied().unwrap_or(0);
            let correlation = ratio(co_occurrences, usage(&first).min(usage(&second)));
            if !options.accepts(correlation, co_occurrences) {
                continue;
            }

            let primary_state = stats
                .states
                .iter()
                .fold(None::<(&String, u64)>, |best, (state, count)| match best {
                    Some((_, c)) if c >= *count => best,
                    _ => Some((state, *count)),
                })
                .map(|(s, _)| s.clone())
                .unwrap_or_default();

            let pattern = Pattern::new(
                format!("{first} with {second}"),
                format!(
                    "{first} and {second} were used together in state {primary_state} in {co_occurrences} runs"
                ),
                correlation,
                co_occurrences,
                PatternData::ToolAffinity(ToolAffinityData {
                    tools: vec![first, second],
                    primary_state,
                    correlation,
                    co_occurrences,
                }),
            )?
            .with_runs(stats.runs.into_iter().collect());
            patterns.push(pattern);
        }

        debug!(detector = self.name(), runs = runs.len(), patterns = patterns.len(), "Affinity detection complete");
        Ok(patterns)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use aegis_governance_core::infrastructure::InMemoryEventStore;

    #[tokio::test]
    async fn test_correlation_uses_less_frequent_tool() {
        let store = Arc::new(InMemoryEventStore::new());
        for _ in 0..3 {
            seed_run(store.as_ref(), vec![call("research", "search"), call("research", "fetch")]).await;
        }
        seed_run(store.as_ref(), vec![call("research", "search")]).await;
        // Same tools in different states do not co-occur.
        seed_run(store.as_ref(), vec![call("plan", "search"), call("write", "fetch")]).await;

        let detector = AffinityDetector::new(store);
        let patterns = detector.detect(&permissive()).await.unwrap();

        assert_eq!(patterns.len(), 1);
        let PatternData::ToolAffinity(data) = patterns[0].data().unwrap() else {
            panic!("expected affinity data");
        };
        assert_eq!(data.tools, vec!["fetch", "search"]);
        assert_eq!(data.primary_state, "research");
        assert_eq!(data.co_occurrences, 3);
        // fetch appears in 4 runs, search in 5.
        assert_eq!(data.correlation, 0.75);
        assert_eq!(patterns[0].frequency, 3);
    }

    #[tokio::test]
    async fn test_min_co_occurrence() {
        let store = Arc::new(InMemoryEventStore::new());
        for _ in 0..2 {
            seed_run(store.as_ref(), vec![call("s", "a"), call("s", "b")]).await;
        }

        let strict = AffinityDetector::new(store.clone());
        assert!(strict.detect(&permissive()).await.unwrap().is_empty());

        let lenient = AffinityDetector::new(store).with_min_co_occurrence(2);
        let patterns = lenient.detect(&permissive()).await.unwrap();
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].confidence, 1.0);
    }
}
