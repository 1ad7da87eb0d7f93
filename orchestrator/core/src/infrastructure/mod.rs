// Copyright (c) 2026 Sideload Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Infrastructure Layer
//!
//! In-process adapters: the event bus, in-memory stores for the canonical
//! app records and the signing key, and tracing setup.

pub mod event_bus;
pub mod key_store;
pub mod repositories;
pub mod telemetry;
