// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Sequence Detector - repeated N-tool call windows across runs
//
// Each run's ToolCalled events are scanned with a sliding window of
// `sequence_length` calls. Frequency is the raw number of windows seen;
// confidence is the share of runs (long enough to hold a window) that
// contain the sequence at least once.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

use aegis_governance_core::events::RunId;
use aegis_governance_core::pattern::{Pattern, PatternData, PatternType, ToolSequenceData, ToolStatePair};
use aegis_governance_core::repository::EventStore;

use super::{load_history, ratio};
use crate::domain::detector::{DetectionError, DetectionOptions, PatternDetector};

pub const DEFAULT_SEQUENCE_LENGTH: usize = 3;

#[derive(Default)]
struct WindowStats {
    occurrences: u64,
    runs: BTreeSet<RunId>,
    tool_states: BTreeSet<ToolStatePair>,
}

pub struct SequenceDetector {
    store: Arc<dyn EventStore>,
    sequence_length: usize,
}

impl SequenceDetector {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self {
            store,
            sequence_length: DEFAULT_SEQUENCE_LENGTH,
        }
    }

    /// Window length, at least 2.
    pub fn with_sequence_length(mut self, sequence_length: usize) -> Self {
        self.sequence_length = sequence_length.max(2);
        self
    }
}

#[async_trait]
impl PatternDetector for SequenceDetector {
    fn name(&self) -> &str {
        "sequence"
    }

    fn pattern_types(&self) -> Vec<PatternType> {
        vec![PatternType::ToolSequence]
    }

    async fn detect(&self, options: &DetectionOptions) -> Result<Vec<Pattern>, DetectionError> {
        options.validate()?;
        let runs = load_history(self.store.as_ref(), options).await?;

        let mut windows: BTreeMap<Vec<String>, WindowStats> = BTreeMap::new();
        let mut eligible_runs = 0u64;

        for run in &runs {
            let calls: Vec<_> = run.tool_calls().collect();
            if calls.len() < self.sequence_length {
                continue;
            }
            eligible_runs += 1;

            for window in calls.windows(self.sequence_length) {
                let key: Vec<String> = window.iter().map(|c| c.tool_name.clone()).collect();
                let stats = windows.entry(key).or_default();
                stats.occurrences += 1;
                stats.runs.insert(run.run_id);
                stats.tool_states.extend(window.iter().map(|c| ToolStatePair {
                    tool: c.tool_name.clone(),
                    state: c.state.clone(),
                }));
            }
        }

        let candidates = windows.len();
        let mut patterns = Vec::new();
        for (tools, stats) in windows {
            let run_count = stats.runs.len() as u64;
            let confidence = ratio(run_count, eligible_runs);
            if !options.accepts(confidence, stats.occurrences) {
                continue;
            }

            let sequence = tools.join(" -> ");
            let pattern = Pattern::new(
                format!("Tool sequence {sequence}"),
                format!(
                    "{sequence} occurred {} times in {run_count} of {eligible_runs} runs",
                    stats.occurrences
                ),
                confidence,
                stats.occurrences,
                PatternData::ToolSequence(ToolSequenceData {
                    tools,
                    tool_states: stats.tool_states.into_iter().collect(),
                    run_count,
                }),
            )?
            .with_runs(stats.runs.into_iter().collect());
            patterns.push(pattern);
        }

        debug!(
            detector = self.name(),
            runs = runs.len(),
            eligible_runs,
            candidates,
            patterns = patterns.len(),
            "Sequence detection complete"
        );
        Ok(patterns)
    }
}
