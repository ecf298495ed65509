// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Infrastructure layer for the adaptation loop

pub mod event_bus;

pub use event_bus::{BroadcastEventBus, TracingEventBus};
