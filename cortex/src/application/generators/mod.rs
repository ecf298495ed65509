// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Suggestion generators: pattern rules that propose policy changes.

pub mod eligibility;
pub mod budget;
pub mod composite;

pub use eligibility::EligibilityGenerator;
pub use budget::BudgetGenerator;
pub use composite::CompositeGenerator;
