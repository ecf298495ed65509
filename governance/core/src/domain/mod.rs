// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Aggregates, value objects and repository contracts of the governance loop.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Pure types and state machines; no I/O beyond the traits in [`repository`]

pub mod payload;
pub mod events;
pub mod pattern;
pub mod suggestion;
pub mod proposal;
pub mod policy;
pub mod notification;
pub mod repository;
pub mod config;
