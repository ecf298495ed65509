// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Domain events for the adaptation loop
//! Published to the event bus for observability and integration

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use aegis_governance_core::pattern::{PatternId, PatternType};
use aegis_governance_core::suggestion::{Impact, SuggestionId, SuggestionType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AdaptationEvent {
    /// A detection pass produced patterns
    PatternsDetected {
        pattern_ids: Vec<PatternId>,
        pattern_types: Vec<PatternType>,
        timestamp: DateTime<Utc>,
    },

    /// A new pending suggestion was stored
    SuggestionGenerated {
        suggestion_id: SuggestionId,
        suggestion_type: SuggestionType,
        target: String,
        confidence: f64,
        impact: Impact,
        timestamp: DateTime<Utc>,
    },

    /// An older pending suggestion was replaced by a fresher one with the same key
    SuggestionSuperseded {
        suggestion_id: SuggestionId,
        superseded_by: SuggestionId,
        timestamp: DateTime<Utc>,
    },

    /// A reviewer rejected a suggestion
    SuggestionRejected {
        suggestion_id: SuggestionId,
        reviewer: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    CycleCompleted {
        patterns: usize,
        generated: usize,
        superseded: usize,
        timestamp: DateTime<Utc>,
    },
}

impl AdaptationEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            AdaptationEvent::PatternsDetected { .. } => "patterns_detected",
            AdaptationEvent::SuggestionGenerated { .. } => "suggestion_generated",
            AdaptationEvent::SuggestionSuperseded { .. } => "suggestion_superseded",
            AdaptationEvent::SuggestionRejected { .. } => "suggestion_rejected",
            AdaptationEvent::CycleCompleted { .. } => "cycle_completed",
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            AdaptationEvent::PatternsDetected { timestamp, .. }
            | AdaptationEvent::SuggestionGenerated { timestamp, .. }
            | AdaptationEvent::SuggestionSuperseded { timestamp, .. }
            | AdaptationEvent::SuggestionRejected { timestamp, .. }
            | AdaptationEvent::CycleCompleted { timestamp, .. } => *timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_matches_serde_tag() {
        let event = AdaptationEvent::SuggestionSuperseded {
            suggestion_id: SuggestionId::new(),
            superseded_by: SuggestionId::new(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.event_type());

        let back: AdaptationEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
