// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;

use aegis_governance_core::pattern::Pattern;
use aegis_governance_core::suggestion::{Suggestion, SuggestionError, SuggestionType};

/// Turns detected patterns into pending policy suggestions.
///
/// Implementations discard patterns below their own confidence floor before
/// applying any rule, and never fail on patterns they do not handle.
#[async_trait]
pub trait SuggestionGenerator: Send + Sync {
    fn name(&self) -> &str;

    fn types(&self) -> Vec<SuggestionType>;

    async fn generate(&self, patterns: &[Pattern]) -> Result<Vec<Suggestion>, SuggestionError>;
}
