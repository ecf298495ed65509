// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Cortex
//!
//! Learns from recorded agent runs. Detectors derive patterns from the run
//! event log; generators turn patterns into pending policy suggestions that a
//! human can promote into a governance proposal.
//!
//! # Architecture
//!
//! - **Layer:** Learning & Memory Layer
//! - **Purpose:** Pattern detection and suggestion generation

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
pub use infrastructure::*;
