// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Composite Generator - fan-out, merge, dedup and rank
//
// Every registered generator sees the full pattern set. One success is
// enough: failures are logged and dropped unless every generator failed.
// Suggestions sharing (type, target, to) collapse to the first one produced,
// then the survivors are ranked by confidence and impact weight.

use async_trait::async_trait;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use aegis_governance_core::config::GenerationConfig;
use aegis_governance_core::pattern::Pattern;
use aegis_governance_core::suggestion::{Suggestion, SuggestionError, SuggestionType};

use super::{BudgetGenerator, EligibilityGenerator};
use crate::domain::generator::SuggestionGenerator;

#[derive(Default)]
pub struct CompositeGenerator {
    generators: Vec<Arc<dyn SuggestionGenerator>>,
}

impl CompositeGenerator {
    pub fn new(generators: Vec<Arc<dyn SuggestionGenerator>>) -> Self {
        Self { generators }
    }

    pub fn from_config(config: &GenerationConfig) -> Self {
        Self::new(vec![
            Arc::new(EligibilityGenerator::new(config.eligibility_min_confidence)),
            Arc::new(BudgetGenerator::from_config(config)),
        ])
    }

    pub fn with_generator(mut self, generator: Arc<dyn SuggestionGenerator>) -> Self {
        self.generators.push(generator);
        self
    }
}

/// Keep the first suggestion for every dedup key, preserving order.
pub fn deduplicate(suggestions: Vec<Suggestion>) -> Vec<Suggestion> {
    let mut seen = HashSet::new();
    suggestions
        .into_iter()
        .filter(|s| seen.insert(s.dedup_key()))
        .collect()
}

/// Confidence descending, then impact weight descending. Stable.
pub fn rank(suggestions: &mut [Suggestion]) {
    suggestions.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| b.impact.weight().cmp(&a.impact.weight()))
    });
}

#[async_trait]
impl SuggestionGenerator for CompositeGenerator {
    fn name(&self) -> &str {
        "composite"
    }

    fn types(&self) -> Vec<SuggestionType> {
        let mut types = Vec::new();
        for t in self.generators.iter().flat_map(|g| g.types()) {
            if !types.contains(&t) {
                types.push(t);
            }
        }
        types
    }

    async fn generate(&self, patterns: &[Pattern]) -> Result<Vec<Suggestion>, SuggestionError> {
        if patterns.is_empty() {
            return Err(SuggestionError::NoPatterns);
        }

        let results = join_all(self.generators.iter().map(|g| g.generate(patterns))).await;

        let mut merged = Vec::new();
        let mut failures = Vec::new();
        for (generator, result) in self.generators.iter().zip(results) {
            match result {
                Ok(suggestions) => merged.extend(suggestions),
                Err(e) => {
                    warn!(generator = generator.name(), error = %e, "Suggestion generator failed");
                    failures.push(format!("{}: {}", generator.name(), e));
                }
            }
        }

        if !self.generators.is_empty() && failures.len() == self.generators.len() {
            return Err(SuggestionError::GenerationFailed(failures.join("; ")));
        }

        let produced = merged.len();
        let mut suggestions = deduplicate(merged);
        rank(&mut suggestions);

        metrics::counter!("cortex_suggestions_generated_total").increment(suggestions.len() as u64);
        debug!(
            patterns = patterns.len(),
            produced,
            kept = suggestions.len(),
            failed_generators = failures.len(),
            "Composite generation complete"
        );
        Ok(suggestions)
    }
}
