// Copyright (c) 2026 Sideload Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Domain Layer
//!
//! Value types, aggregates, pure policies and the collaborator ports the
//! application layer drives.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Lifecycle vocabulary with no I/O of its own

pub mod anisette;
pub mod app;
pub mod bundle_store;
pub mod capacity;
pub mod config;
pub mod errors;
pub mod events;
pub mod graph;
pub mod intent;
pub mod progress;
pub mod prompt;
pub mod repository;
pub mod session;
pub mod signing;
pub mod transport;
