// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Eligibility Generator - which tools should be allowed in which states
//
// Rules:
// - ToolSequence, frequency >= 5: allow each observed (tool, state) pair
// - ToolAffinity, correlation >= 0.7 over two or more tools: co-locate them
//   in the primary state
// - ToolFailure, error count >= 5 and confidence >= 0.7: withdraw the tool
//   from the failing state

use async_trait::async_trait;
use tracing::{debug, warn};

use aegis_governance_core::pattern::{
    Pattern, PatternData, ToolAffinityData, ToolFailureData, ToolSequenceData,
};
use aegis_governance_core::suggestion::{
    ChangeData, ChangeDescriptor, EligibilityChangeData, Impact, Suggestion, SuggestionError,
    SuggestionType,
};

use crate::domain::generator::SuggestionGenerator;

pub const SEQUENCE_MIN_FREQUENCY: u64 = 5;
pub const SEQUENCE_CONFIDENCE_FACTOR: f64 = 0.8;
pub const AFFINITY_MIN_CORRELATION: f64 = 0.7;
pub const FAILURE_MIN_ERRORS: u64 = 5;
pub const FAILURE_MIN_CONFIDENCE: f64 = 0.7;

pub struct EligibilityGenerator {
    min_confidence: f64,
}

impl EligibilityGenerator {
    pub fn new(min_confidence: f64) -> Self {
        Self { min_confidence }
    }

    fn from_sequence(
        &self,
        pattern: &Pattern,
        data: ToolSequenceData,
    ) -> Result<Vec<Suggestion>, SuggestionError> {
        if pattern.frequency < SEQUENCE_MIN_FREQUENCY {
            return Ok(Vec::new());
        }

        data.tool_states
            .into_iter()
            .map(|pair| {
                Suggestion::new(
                    SuggestionType::AddEligibility,
                    format!("Allow {} in state {}", pair.tool, pair.state),
                    format!("Add {} to the tools eligible in {}", pair.tool, pair.state),
                    format!(
                        "{} is part of the sequence {} seen {} times",
                        pair.tool,
                        data.tools.join(" -> "),
                        pattern.frequency
                    ),
                    pattern.confidence * SEQUENCE_CONFIDENCE_FACTOR,
                    Impact::Low,
                    vec![pattern.id],
                    ChangeDescriptor {
                        target: pair.state.clone(),
                        from: None,
                        to: pair.tool.clone(),
                    },
                    ChangeData::Eligibility(EligibilityChangeData {
                        state: pair.state,
                        tools: vec![pair.tool],
                    }),
                )
            })
            .collect()
    }

    fn from_affinity(
        &self,
        pattern: &Pattern,
        data: ToolAffinityData,
    ) -> Result<Vec<Suggestion>, SuggestionError> {
        if data.correlation < AFFINITY_MIN_CORRELATION || data.tools.len() < 2 {
            return Ok(Vec::new());
        }

        let tools = data.tools.join(",");
        let suggestion = Suggestion::new(
            SuggestionType::AddEligibility,
            format!("Co-locate {} in state {}", data.tools.join(" and "), data.primary_state),
            format!("Make {} eligible together in {}", tools, data.primary_state),
            format!(
                "Used together in {} runs with correlation {:.2}",
                data.co_occurrences, data.correlation
            ),
            pattern.confidence * data.correlation,
            Impact::Medium,
            vec![pattern.id],
            ChangeDescriptor {
                target: data.primary_state.clone(),
                from: None,
                to: tools,
            },
            ChangeData::Eligibility(EligibilityChangeData {
                state: data.primary_state,
                tools: data.tools,
            }),
        )?;
        Ok(vec![suggestion])
    }

    fn from_failure(
        &self,
        pattern: &Pattern,
        data: ToolFailureData,
    ) -> Result<Vec<Suggestion>, SuggestionError> {
        if data.error_count < FAILURE_MIN_ERRORS || pattern.confidence < FAILURE_MIN_CONFIDENCE {
            return Ok(Vec::new());
        }

        let suggestion = Suggestion::new(
            SuggestionType::RemoveEligibility,
            format!("Remove {} from state {}", data.tool_name, data.state),
            format!("Stop offering {} while in {}", data.tool_name, data.state),
            format!(
                "{} failed with {} in {} of {} calls",
                data.tool_name, data.error_type, data.error_count, data.total_calls
            ),
            pattern.confidence,
            Impact::High,
            vec![pattern.id],
            ChangeDescriptor {
                target: data.state.clone(),
                from: None,
                to: data.tool_name.clone(),
            },
            ChangeData::Eligibility(EligibilityChangeData {
                state: data.state,
                tools: vec![data.tool_name],
            }),
        )?;
        Ok(vec![suggestion])
    }
}

impl Default for EligibilityGenerator {
    fn default() -> Self {
        Self::new(0.5)
    }
}

#[async_trait]
impl SuggestionGenerator for EligibilityGenerator {
    fn name(&self) -> &str {
        "eligibility"
    }

    fn types(&self) -> Vec<SuggestionType> {
        vec![SuggestionType::AddEligibility, SuggestionType::RemoveEligibility]
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
                PatternData::ToolSequence(d) => self.from_sequence(pattern, d)?,
                PatternData::ToolAffinity(d) => self.from_affinity(pattern, d)?,
                PatternData::ToolFailure(d) => self.from_failure(pattern, d)?,
                PatternData::BudgetExhaustion(_) | PatternData::LongRuns(_) => continue,
            };
            suggestions.extend(generated);
        }

        debug!(generator = self.name(), patterns = patterns.len(), suggestions = suggestions.len(), "Generated eligibility suggestions");
        Ok(suggestions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_governance_core::pattern::ToolStatePair;

    fn sequence(frequency: u64, confidence: f64) -> Pattern {
        Pattern::new(
            "sequence",
            "",
            confidence,
            frequency,
            PatternData::ToolSequence(ToolSequenceData {
                tools: vec!["search".to_string(), "read".to_string()],
                tool_states: vec![
                    ToolStatePair { tool: "read".to_string(), state: "plan".to_string() },
                    ToolStatePair { tool: "search".to_string(), state: "plan".to_string() },
                ],
                run_count: 4,
            }),
        )
        .unwrap()
    }

    fn affinity(correlation: f64, tools: &[&str]) -> Pattern {
        Pattern::new(
            "affinity",
            "",
            correlation,
            4,
            PatternData::ToolAffinity(ToolAffinityData {
                tools: tools.iter().map(|t| t.to_string()).collect(),
                primary_state: "research".to_string(),
                correlation,
                co_occurrences: 4,
            }),
        )
        .unwrap()
    }

    fn failure(error_count: u64, confidence: f64) -> Pattern {
        Pattern::new(
            "failure",
            "",
            confidence,
            error_count,
            PatternData::ToolFailure(ToolFailureData {
                tool_name: "deploy".to_string(),
                error_type: "Timeout".to_string(),
                state: "act".to_string(),
                error_count,
                total_calls: error_count + 1,
                failure_rate: confidence,
                sample_message: None,
            }),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_sequence_yields_one_suggestion_per_pair() {
        let generator = EligibilityGenerator::default();
        let suggestions = generator.generate(&[sequence(5, 0.9)]).await.unwrap();

        assert_eq!(suggestions.len(), 2);
        for s in &suggestions {
            assert_eq!(s.suggestion_type, SuggestionType::AddEligibility);
            assert_eq!(s.impact, Impact::Low);
            assert!((s.confidence - 0.72).abs() < 1e-9);
            assert_eq!(s.change.target, "plan");
        }
        assert_eq!(suggestions[0].change.to, "read");

        assert!(generator.generate(&[sequence(4, 0.9)]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_affinity_rules() {
        let generator = EligibilityGenerator::default();

        let suggestions = generator.generate(&[affinity(0.8, &["fetch", "search"])]).await.unwrap();
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].impact, Impact::Medium);
        assert_eq!(suggestions[0].change.to, "fetch,search");
        assert!((suggestions[0].confidence - 0.64).abs() < 1e-9);

        assert!(generator.generate(&[affinity(0.69, &["fetch", "search"])]).await.unwrap().is_empty());
        assert!(generator.generate(&[affinity(0.9, &["fetch"])]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failure_rules() {
        let generator = EligibilityGenerator::default();

        let suggestions = generator.generate(&[failure(5, 0.7)]).await.unwrap();
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].suggestion_type, SuggestionType::RemoveEligibility);
        assert_eq!(suggestions[0].impact, Impact::High);
        assert_eq!(suggestions[0].confidence, 0.7);
        assert_eq!(suggestions[0].change.target, "act");
        assert_eq!(suggestions[0].change.to, "deploy");

        assert!(generator.generate(&[failure(4, 0.9)]).await.unwrap().is_empty());
        assert!(generator.generate(&[failure(9, 0.6)]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_min_confidence_filters_first() {
        let generator = EligibilityGenerator::new(0.95);
        assert!(generator.generate(&[sequence(10, 0.9), failure(10, 0.9)]).await.unwrap().is_empty());
    }
}
