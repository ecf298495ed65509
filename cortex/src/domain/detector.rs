// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Pattern detector contract.
//!
//! Detectors read run history from an `EventStore` and derive scored
//! [`Pattern`]s. Every detector pre-filters its own output with the
//! thresholds carried in [`DetectionOptions`].

use async_trait::async_trait;
use thiserror::Error;

use aegis_governance_core::config::DetectionConfig;
use aegis_governance_core::events::RunId;
use aegis_governance_core::pattern::{Pattern, PatternError, PatternType};
use aegis_governance_core::repository::RepositoryError;

#[derive(Debug, Clone, PartialEq)]
pub struct DetectionOptions {
    pub min_confidence: f64,
    pub min_frequency: u64,
    /// Restrict detection to these runs. Empty means every known run.
    pub run_ids: Vec<RunId>,
}

impl DetectionOptions {
    pub fn from_config(config: &DetectionConfig) -> Self {
        Self {
            min_confidence: config.min_confidence,
            min_frequency: config.min_frequency,
            run_ids: Vec::new(),
        }
    }

    pub fn for_runs(mut self, run_ids: Vec<RunId>) -> Self {
        self.run_ids = run_ids;
        self
    }

    /// Whether a candidate clears both thresholds.
    pub fn accepts(&self, confidence: f64, frequency: u64) -> bool {
        confidence >= self.min_confidence && frequency >= self.min_frequency
    }

    pub fn validate(&self) -> Result<(), DetectionError> {
        if self.min_confidence.is_nan() || !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(DetectionError::InvalidOptions(format!(
                "min_confidence {} outside [0, 1]",
                self.min_confidence
            )));
        }
        Ok(())
    }
}

impl Default for DetectionOptions {
    fn default() -> Self {
        Self::from_config(&DetectionConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DetectionError {
    #[error("Invalid detection options: {0}")]
    InvalidOptions(String),

    #[error("Event store error: {0}")]
    Store(#[from] RepositoryError),

    #[error("Failed to build pattern: {0}")]
    Pattern(#[from] PatternError),

    #[error("Detector {detector} failed: {reason}")]
    DetectorFailed { detector: String, reason: String },
}

#[async_trait]
pub trait PatternDetector: Send + Sync {
    /// Stable name used in logs.
    fn name(&self) -> &str;

    fn pattern_types(&self) -> Vec<PatternType>;

    async fn detect(&self, options: &DetectionOptions) -> Result<Vec<Pattern>, DetectionError>;
}
