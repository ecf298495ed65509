// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod detectors;
pub mod generators;
pub mod adaptation_service;

pub use adaptation_service::{
    AdaptationError, AdaptationService, CycleReport, EventBus, StandardAdaptationService,
};
