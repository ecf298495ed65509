// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Patterns: scored observations mined from run history by the detectors in
//! `aegis-cortex`. Read-only once produced.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::events::RunId;
use super::payload::Payload;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PatternId(pub Uuid);

impl PatternId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PatternId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PatternId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    ToolSequence,
    ToolAffinity,
    ToolFailure,
    BudgetExhaustion,
    LongRuns,
}

impl PatternType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternType::ToolSequence => "tool_sequence",
            PatternType::ToolAffinity => "tool_affinity",
            PatternType::ToolFailure => "tool_failure",
            PatternType::BudgetExhaustion => "budget_exhaustion",
            PatternType::LongRuns => "long_runs",
        }
    }
}

impl std::fmt::Display for PatternType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tool observed in a given agent state.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ToolStatePair {
    pub tool: String,
    pub state: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSequenceData {
    /// Ordered tool names forming the repeated subsequence.
    pub tools: Vec<String>,
    /// Distinct (tool, state) pairs the subsequence was observed in.
    pub tool_states: Vec<ToolStatePair>,
    pub run_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolAffinityData {
    pub tools: Vec<String>,
    /// State in which the correlated tools were most often called.
    pub primary_state: String,
    pub correlation: f64,
    pub co_occurrences: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolFailureData {
    pub tool_name: String,
    pub error_type: String,
    /// State in which most of the failures happened.
    pub state: String,
    pub error_count: u64,
    pub total_calls: u64,
    pub failure_rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetExhaustionData {
    pub budget_name: String,
    pub exhaustion_count: u64,
    pub current_limit: i64,
    pub peak_consumed: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongRunsData {
    pub long_run_count: u64,
    pub total_runs: u64,
    pub threshold_seconds: u64,
    pub average_duration_seconds: f64,
    pub max_duration_seconds: u64,
}

/// Typed view of a pattern's data. The variant determines the [`PatternType`].
#[derive(Debug, Clone, PartialEq)]
pub enum PatternData {
    ToolSequence(ToolSequenceData),
    ToolAffinity(ToolAffinityData),
    ToolFailure(ToolFailureData),
    BudgetExhaustion(BudgetExhaustionData),
    LongRuns(LongRunsData),
}

impl PatternData {
    pub fn pattern_type(&self) -> PatternType {
        match self {
            PatternData::ToolSequence(_) => PatternType::ToolSequence,
            PatternData::ToolAffinity(_) => PatternType::ToolAffinity,
            PatternData::ToolFailure(_) => PatternType::ToolFailure,
            PatternData::BudgetExhaustion(_) => PatternType::BudgetExhaustion,
            PatternData::LongRuns(_) => PatternType::LongRuns,
        }
    }

    fn encode(&self) -> Result<Payload, serde_json::Error> {
        match self {
            PatternData::ToolSequence(d) => Payload::encode(d),
            PatternData::ToolAffinity(d) => Payload::encode(d),
            PatternData::ToolFailure(d) => Payload::encode(d),
            PatternData::BudgetExhaustion(d) => Payload::encode(d),
            PatternData::LongRuns(d) => Payload::encode(d),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("Failed to encode {pattern_type} data: {reason}")]
    DataEncode { pattern_type: PatternType, reason: String },

    #[error("Failed to decode {pattern_type} data: {reason}")]
    DataDecode { pattern_type: PatternType, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub id: PatternId,
    pub pattern_type: PatternType,
    pub name: String,
    pub description: String,
    /// Always within `[0.0, 1.0]`.
    pub confidence: f64,
    pub frequency: u64,
    #[serde(default)]
    pub run_ids: Vec<RunId>,
    #[serde(default)]
    pub data: Payload,
    pub detected_at: DateTime<Utc>,
}

impl Pattern {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        confidence: f64,
        frequency: u64,
        data: PatternData,
    ) -> Result<Self, PatternError> {
        let pattern_type = data.pattern_type();
        let payload = data.encode().map_err(|e| PatternError::DataEncode {
            pattern_type,
            reason: e.to_string(),
        })?;

        Ok(Self {
            id: PatternId::new(),
            pattern_type,
            name: name.into(),
            description: description.into(),
            confidence: clamp_unit(confidence),
            frequency,
            run_ids: Vec::new(),
            data: payload,
            detected_at: Utc::now(),
        })
    }

    pub fn with_runs(mut self, run_ids: Vec<RunId>) -> Self {
        self.run_ids = run_ids;
        self
    }

    /// Decode the data payload into the struct matching `pattern_type`.
    pub fn data(&self) -> Result<PatternData, PatternError> {
        let decode_err = |e: serde_json::Error| PatternError::DataDecode {
            pattern_type: self.pattern_type,
            reason: e.to_string(),
        };

        let data = match self.pattern_type {
            PatternType::ToolSequence => PatternData::ToolSequence(self.data.decode().map_err(decode_err)?),
            PatternType::ToolAffinity => PatternData::ToolAffinity(self.data.decode().map_err(decode_err)?),
            PatternType::ToolFailure => PatternData::ToolFailure(self.data.decode().map_err(decode_err)?),
            PatternType::BudgetExhaustion => {
                PatternData::BudgetExhaustion(self.data.decode().map_err(decode_err)?)
            }
            PatternType::LongRuns => PatternData::LongRuns(self.data.decode().map_err(decode_err)?),
        };

        Ok(data)
    }
}

/// Clamp a score into `[0.0, 1.0]`, mapping NaN to zero.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
