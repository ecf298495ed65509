// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use tracing::{debug, warn};

use aegis_governance_core::config::GenerationConfig;
use aegis_governance_core::pattern::{BudgetExhaustionData, LongRunsData, Pattern, PatternData};
use aegis_governance_core::suggestion::{
    BudgetChangeData, ChangeData, ChangeDescriptor, Impact, Suggestion, SuggestionError,
    SuggestionType,
};

use crate::domain::generator::SuggestionGenerator;

pub const EXHAUSTION_MIN_COUNT: u64 = 3;
pub const LONG_RUN_MIN_COUNT: u64 = 5;
pub const LONG_RUN_CONFIDENCE_FACTOR: f64 = 0.9;

/// Raise `current` by `rate`, rounding up, and always by at least one.
/// `None` when the limit is already at the top of the `i64` range.
pub fn scale_limit(current: i64, rate: f64) -> Option<i64> {
    let base = current.max(1);
    let floor = base.checked_add(1)?;
    // Float to int casts saturate, so huge products land on i64::MAX.
    let scaled = (base as f64 * (1.0 + rate)).ceil() as i64;
    Some(scaled.max(floor))
}

/// Proposes budget increases for exhausted budgets and for runs that keep
/// running past the time threshold.
pub struct BudgetGenerator {
    min_confidence: f64,
    increase_rate: f64,
    timeout_budget_name: String,
}

impl BudgetGenerator {
    pub fn new(min_confidence: f64) -> Self {
        let defaults = GenerationConfig::default();
        Self {
            min_confidence,
            increase_rate: defaults.budget_increase_rate,
            timeout_budget_name: defaults.timeout_budget_name,
        }
    }

    pub fn from_config(config: &GenerationConfig) -> Self {
        Self::new(config.budget_min_confidence)
            .with_increase_rate(config.budget_increase_rate)
            .with_timeout_budget_name(config.timeout_budget_name.clone())
    }

    pub fn with_increase_rate(mut self, rate: f64) -> Self {
        self.increase_rate = rate;
        self
    }

    pub fn with_timeout_budget_name(mut self, name: impl Into<String>) -> Self {
        self.timeout_budget_name = name.into();
        self
    }

    fn from_exhaustion(
        &self,
        pattern: &Pattern,
        data: BudgetExhaustionData,
    ) -> Result<Option<Suggestion>, SuggestionError> {
        if data.exhaustion_count < EXHAUSTION_MIN_COUNT {
            return Ok(None);
        }

        let Some(proposed) = scale_limit(data.current_limit, self.increase_rate) else {
            debug!(budget = %data.budget_name, limit = data.current_limit, "Budget limit cannot be raised further");
            return Ok(None);
        };
        Suggestion::new(
            SuggestionType::IncreaseBudget,
            format!("Increase {} budget to {}", data.budget_name, proposed),
            format!("Raise {} from {} to {}", data.budget_name, data.current_limit, proposed),
            format!(
                "{} runs exhausted {} (peak {})",
                data.exhaustion_count, data.budget_name, data.peak_consumed
            ),
            pattern.confidence,
            Impact::Medium,
            vec![pattern.id],
            ChangeDescriptor {
                target: data.budget_name.clone(),
                from: Some(data.current_limit.to_string()),
                to: proposed.to_string(),
            },
            ChangeData::Budget(BudgetChangeData {
                budget_name: data.budget_name,
                current: data.current_limit,
                proposed,
            }),
        )
        .map(Some)
    }

    fn from_long_runs(
        &self,
        pattern: &Pattern,
        data: LongRunsData,
    ) -> Result<Option<Suggestion>, SuggestionError> {
        if data.long_run_count < LONG_RUN_MIN_COUNT {
            return Ok(None);
        }

        let current = i64::try_from(data.threshold_seconds).unwrap_or(i64::MAX);
        let longest = i64::try_from(data.max_duration_seconds).unwrap_or(i64::MAX);
        let Some(scaled) = scale_limit(current, self.increase_rate) else {
            debug!(budget = %self.timeout_budget_name, limit = current, "Timeout budget cannot be raised further");
            return Ok(None);
        };
        let proposed = scaled.max(longest);
        let name = &self.timeout_budget_name;

        Suggestion::new(
            SuggestionType::IncreaseBudget,
            format!("Raise {name} to {proposed}"),
            format!("Raise the run time budget {name} from {current}s to {proposed}s"),
            format!(
                "{} of {} runs exceeded {}s (average {:.0}s, max {}s)",
                data.long_run_count,
                data.total_runs,
                data.threshold_seconds,
                data.average_duration_seconds,
                data.max_duration_seconds
            ),
            pattern.confidence * LONG_RUN_CONFIDENCE_FACTOR,
            Impact::Low,
            vec![pattern.id],
            ChangeDescriptor {
                target: name.clone(),
                from: Some(current.to_string()),
                to: proposed.to_string(),
            },
            ChangeData::Budget(BudgetChangeData {
                budget_name: name.clone(),
                current,
                proposed,
            }),
        )
        .map(Some)
    }
}

impl Default for BudgetGenerator {
    fn default() -> Self {
        Self::from_config(&GenerationConfig::default())
    }
}

#[async_trait]
impl SuggestionGenerator for BudgetGenerator {
    fn name(&self) -> &str {
        "budget"
    }

    fn types(&self) -> Vec<SuggestionType> {
        vec![SuggestionType::IncreaseBudget]
    }

    async fn generate(&self, patterns: &[Pattern]) -> Result<Vec<Suggestion>, SuggestionError> {
        let mut suggestions = Vec::new();

        for pattern in patterns.iter().filter(|p| p.confidence >= self.min_confidence) {
            let data = match pattern.data() {
                Ok(data) => data,
                Err(e) => {
                    warn!(pattern_id = %pattern.id, error = %e, "Skipping pattern with undecodable data");
                    continue;
                }
            };
            let generated = match data {
                PatternData::BudgetExhaustion(d) => self.from_exhaustion(pattern, d)?,
                PatternData::LongRuns(d) => self.from_long_runs(pattern, d)?,
                _ => None,
            };
            suggestions.extend(generated);
        }

        debug!(generator = self.name(), patterns = patterns.len(), suggestions = suggestions.len(), "Generated budget suggestions");
        Ok(suggestions)
    }
}
