// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::debug;

use aegis_governance_core::events::{RunEventData, RunId};
use aegis_governance_core::pattern::{Pattern, PatternData, PatternType, ToolFailureData};
use aegis_governance_core::repository::EventStore;

use super::{load_history, ratio};
use crate::domain::detector::{DetectionError, DetectionOptions, PatternDetector};

#[derive(Default)]
struct FailureStats {
    error_count: u64,
    states: BTreeMap<String, u64>,
    sample_message: Option<String>,
    runs: BTreeSet<RunId>,
}

impl FailureStats {
    /// Most frequent state; ties go to the lexicographically first.
    fn dominant_state(&self) -> String {
        let mut best: Option<(&String, u64)> = None;
        for (state, count) in &self.states {
            if best.is_none_or(|(_, c)| *count > c) {
                best = Some((state, *count));
            }
        }
        best.map(|(s, _)| s.clone()).unwrap_or_default()
    }
}

/// Groups ToolFailed events by tool and error type. Confidence is the failure
/// rate of that signature against all calls of the tool.
pub struct FailureDetector {
    store: Arc<dyn EventStore>,
}

impl FailureDetector {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl PatternDetector for FailureDetector {
    fn name(&self) -> &str {
        "failure"
    }

    fn pattern_types(&self) -> Vec<PatternType> {
        vec![PatternType::ToolFailure]
    }

    async fn detect(&self, options: &DetectionOptions) -> Result<Vec<Pattern>, DetectionError> {
        options.validate()?;
        let runs = load_history(self.store.as_ref(), options).await?;

        let mut calls: HashMap<String, u64> = HashMap::new();
        let mut failures: BTreeMap<(String, String), FailureStats> = BTreeMap::new();

        for run in &runs {
            for event in &run.events {
                match &event.data {
                    RunEventData::ToolCalled(call) => {
                        *calls.entry(call.tool_name.clone()).or_default() += 1;
                    }
                    RunEventData::ToolFailed(failure) => {
                        let stats = failures
                            .entry((failure.tool_name.clone(), failure.error_type.clone()))
                            .or_default();
                        stats.error_count += 1;
                        *stats.states.entry(failure.state.clone()).or_default() += 1;
                        stats.runs.insert(run.run_id);
                        if stats.sample_message.is_none() && !failure.message.is_empty() {
                            stats.sample_message = Some(failure.message.clone());
                        }
                    }
                    _ => {}
                }
            }
        }

        let mut patterns = Vec::new();
        for ((tool_name, error_type), stats) in failures {
            // Failures recorded without a matching ToolCalled still count as calls.
            let total_calls = calls.get(&tool_name).copied().unwrap_or(0).max(stats.error_count);
            let failure_rate = ratio(stats.error_count, total_calls);
            if !options.accepts(failure_rate, stats.error_count) {
                continue;
            }

            let state = stats.dominant_state();
            let pattern = Pattern::new(
                format!("{tool_name} fails with {error_type}"),
                format!(
                    "{tool_name} failed with {error_type} {} of {total_calls} calls, mostly in state {state}",
                    stats.error_count
                ),
                failure_rate,
                stats.error_count,
                PatternData::ToolFailure(ToolFailureData {
                    tool_name,
                    error_type,
                    state,
                    error_count: stats.error_count,
                    total_calls,
                    failure_rate,
                    sample_message: stats.sample_message,
                }),
            )?
            .with_runs(stats.runs.into_iter().collect());
            patterns.push(pattern);
        }

        debug!(detector = self.name(), runs = runs.len(), patterns = patterns.len(), "Failure detection complete");
        Ok(patterns)
    }
}
