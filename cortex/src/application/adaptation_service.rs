// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # AdaptationService: Detect, Suggest, Supersede
//!
//! Application service driving one pass of the adaptation loop:
//! run history → [`Pattern`]s → pending [`Suggestion`]s awaiting review.
//!
//! ## Cycle
//!
//! 1. The detector (normally a [`CompositeDetector`]) scans the event store.
//! 2. Every detected pattern is stored.
//! 3. The generator (normally a [`CompositeGenerator`]) turns patterns into
//!    ranked, deduplicated suggestions.
//! 4. Each new suggestion is stored. Any older *Pending* suggestion with the
//!    same dedup key `(type, target, to)` is marked Superseded by it, so
//!    reviewers only ever see the freshest evidence for a change.
//!
//! Suggestions are never applied here. Promotion into a proposal happens in
//! the governance workflow, behind human approval.
//!
//! [`CompositeDetector`]: crate::application::detectors::CompositeDetector
//! [`CompositeGenerator`]: crate::application::generators::CompositeGenerator

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use aegis_governance_core::config::GovernanceConfig;
use aegis_governance_core::pattern::Pattern;
use aegis_governance_core::repository::{
    EventStore, OrderBy, PatternRepository, RepositoryError, SuggestionFilter, SuggestionRepository,
};
use aegis_governance_core::suggestion::{
    Suggestion, SuggestionError, SuggestionId, SuggestionKey, SuggestionStatus,
};

use crate::application::detectors::CompositeDetector;
use crate::application::generators::CompositeGenerator;
use crate::domain::detector::{DetectionError, DetectionOptions, PatternDetector};
use crate::domain::events::AdaptationEvent;
use crate::domain::generator::SuggestionGenerator;

/// Event bus trait for publishing adaptation events
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, event: AdaptationEvent) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AdaptationError {
    #[error(transparent)]
    Detection(#[from] DetectionError),

    #[error(transparent)]
    Suggestion(#[from] SuggestionError),

    #[error("Pattern store error: {0}")]
    PatternStore(#[from] RepositoryError),
}

/// Outcome of one adaptation cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub patterns: Vec<Pattern>,
    /// New pending suggestions, ranked.
    pub generated: Vec<Suggestion>,
    /// Older pending suggestions replaced during this cycle.
    pub superseded: Vec<SuggestionId>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

/// AdaptationService interface
#[async_trait]
pub trait AdaptationService: Send + Sync {
    /// Detect patterns, generate suggestions and supersede stale ones
    async fn run_cycle(&self, options: &DetectionOptions) -> Result<CycleReport, AdaptationError>;

    /// Reject a pending suggestion on behalf of a reviewer
    async fn reject_suggestion(
        &self,
        suggestion_id: SuggestionId,
        reviewer: &str,
        reason: &str,
    ) -> Result<Suggestion, AdaptationError>;

    /// Pending suggestions, highest confidence first
    async fn pending_suggestions(&self) -> Result<Vec<Suggestion>, AdaptationError>;
}

/// Standard implementation of AdaptationService
pub struct StandardAdaptationService {
    detector: Arc<dyn PatternDetector>,
    generator: Arc<dyn SuggestionGenerator>,
    pattern_repo: Arc<dyn PatternRepository>,
    suggestion_repo: Arc<dyn SuggestionRepository>,
    event_bus: Arc<dyn EventBus>,
}

impl StandardAdaptationService {
    pub fn new(
        detector: Arc<dyn PatternDetector>,
        generator: Arc<dyn SuggestionGenerator>,
        pattern_repo: Arc<dyn PatternRepository>,
        suggestion_repo: Arc<dyn SuggestionRepository>,
        event_bus: Arc<dyn EventBus>,
    ) -> Self {
        Self {
            detector,
            generator,
            pattern_repo,
            suggestion_repo,
            event_bus,
        }
    }

    /// Wire the built-in detectors and generators as configured.
    pub fn from_config(
        config: &GovernanceConfig,
        event_store: Arc<dyn EventStore>,
        pattern_repo: Arc<dyn PatternRepository>,
        suggestion_repo: Arc<dyn SuggestionRepository>,
        event_bus: Arc<dyn EventBus>,
    ) -> Self {
        Self::new(
            Arc::new(CompositeDetector::from_config(event_store, &config.spec.detection)),
            Arc::new(CompositeGenerator::from_config(&config.spec.generation)),
            pattern_repo,
            suggestion_repo,
            event_bus,
        )
    }

    /// Event delivery is best effort; a failing bus never fails the cycle.
    async fn emit(&self, event: AdaptationEvent) {
        let event_type = event.event_type();
        if let Err(e) = self.event_bus.publish(event).await {
            warn!(event_type, error = %e, "Failed to publish adaptation event");
        }
    }

    async fn pending_by_key(&self) -> Result<HashMap<SuggestionKey, Vec<Suggestion>>, AdaptationError> {
        let pending = self
            .suggestion_repo
            .list(&SuggestionFilter::default().with_status(SuggestionStatus::Pending))
            .await
            .map_err(SuggestionError::from)?;

        let mut by_key: HashMap<SuggestionKey, Vec<Suggestion>> = HashMap::new();
        for suggestion in pending {
            by_key.entry(suggestion.dedup_key()).or_default().push(suggestion);
        }
        Ok(by_key)
    }
}

#[async_trait]
impl AdaptationService for StandardAdaptationService {
    async fn run_cycle(&self, options: &DetectionOptions) -> Result<CycleReport, AdaptationError> {
        let started_at = Utc::now();

        let patterns = self.detector.detect(options).await?;
        for pattern in &patterns {
            self.pattern_repo.save(pattern).await?;
        }

        if patterns.is_empty() {
            info!(detector = self.detector.name(), "Adaptation cycle found no patterns");
            self.emit(AdaptationEvent::CycleCompleted {
                patterns: 0,
                generated: 0,
                superseded: 0,
                timestamp: Utc::now(),
            })
            .await;
            return Ok(CycleReport {
                patterns,
                generated: Vec::new(),
                superseded: Vec::new(),
                started_at,
                completed_at: Utc::now(),
            });
        }

        self.emit(AdaptationEvent::PatternsDetected {
            pattern_ids: patterns.iter().map(|p| p.id).collect(),
            pattern_types: patterns.iter().map(|p| p.pattern_type).collect(),
            timestamp: Utc::now(),
        })
        .await;

        let generated = self.generator.generate(&patterns).await?;
        let mut stale = self.pending_by_key().await?;
        let mut superseded = Vec::new();

        for suggestion in &generated {
            self.suggestion_repo
                .save(suggestion)
                .await
                .map_err(SuggestionError::from)?;
            self.emit(AdaptationEvent::SuggestionGenerated {
                suggestion_id: suggestion.id,
                suggestion_type: suggestion.suggestion_type,
                target: suggestion.change.target.clone(),
                confidence: suggestion.confidence,
                impact: suggestion.impact,
                timestamp: Utc::now(),
            })
            .await;

            for mut old in stale.remove(&suggestion.dedup_key()).unwrap_or_default() {
                old.supersede(suggestion.id)?;
                self.suggestion_repo
                    .update(&old)
                    .await
                    .map_err(SuggestionError::from)?;
                superseded.push(old.id);
                self.emit(AdaptationEvent::SuggestionSuperseded {
                    suggestion_id: old.id,
                    superseded_by: suggestion.id,
                    timestamp: Utc::now(),
                })
                .await;
            }
        }

        info!(
            patterns = patterns.len(),
            generated = generated.len(),
            superseded = superseded.len(),
            "Adaptation cycle completed"
        );
        self.emit(AdaptationEvent::CycleCompleted {
            patterns: patterns.len(),
            generated: generated.len(),
            superseded: superseded.len(),
            timestamp: Utc::now(),
        })
        .await;

        Ok(CycleReport {
            patterns,
            generated,
            superseded,
            started_at,
            completed_at: Utc::now(),
        })
    }

    async fn reject_suggestion(
        &self,
        suggestion_id: SuggestionId,
        reviewer: &str,
        reason: &str,
    ) -> Result<Suggestion, AdaptationError> {
        if reviewer.trim().is_empty() {
            return Err(SuggestionError::InvalidSuggestion("reviewer is required".to_string()).into());
        }

        let mut suggestion = self
            .suggestion_repo
            .get(suggestion_id)
            .await
            .map_err(SuggestionError::from)?;
        suggestion.reject(reviewer, reason)?;
        self.suggestion_repo
            .update(&suggestion)
            .await
            .map_err(SuggestionError::from)?;

        info!(suggestion_id = %suggestion_id, reviewer, "Suggestion rejected");
        self.emit(AdaptationEvent::SuggestionRejected {
            suggestion_id,
            reviewer: reviewer.to_string(),
            reason: reason.to_string(),
            timestamp: Utc::now(),
        })
        .await;

        Ok(suggestion)
    }

    async fn pending_suggestions(&self) -> Result<Vec<Suggestion>, AdaptationError> {
        let filter = SuggestionFilter::default()
            .with_status(SuggestionStatus::Pending)
            .ordered_by(OrderBy::Confidence, true);
        Ok(self
            .suggestion_repo
            .list(&filter)
            .await
            .map_err(SuggestionError::from)?)
    }
}
