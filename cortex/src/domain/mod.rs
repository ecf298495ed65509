// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Contracts of the adaptation loop: how patterns are detected, how
//! suggestions are generated, and the events the loop publishes.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Detector and generator traits, adaptation events

pub mod detector;
pub mod generator;
pub mod events;

pub use detector::*;
pub use generator::*;
pub use events::*;
