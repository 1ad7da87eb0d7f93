// Copyright (c) 2026 Sideload Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Application Layer
//!
//! Async services that drive the domain ports: authentication, scheduling,
//! per-app pipelines and the orchestrator that ties them together.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Lifecycle use cases

pub mod anisette;
pub mod authentication;
pub mod certificate_broker;
pub mod operation_slots;
pub mod orchestrator;
pub mod pipeline;
pub mod refresh_group;
pub mod scheduler;

pub use orchestrator::{AppLifecycleOrchestrator, BatchHandle, OrchestratorDependencies, SubmitOptions};
pub use refresh_group::{BatchId, BatchReport, LifecycleResult};
