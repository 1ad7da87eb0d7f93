// Copyright (c) 2026 Sideload Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Sideload Orchestrator Core
//!
//! Lifecycle orchestration for sideloaded apps: install, update, refresh,
//! activation, deactivation, backup and restore, each run as a pipeline of
//! scheduled steps sharing one authenticated session per batch.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Library invoked by the surrounding store application

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use application::{AppLifecycleOrchestrator, BatchHandle, BatchReport, OrchestratorDependencies, SubmitOptions};
pub use domain::app::{App, BundleId};
pub use domain::config::OrchestratorConfig;
pub use domain::errors::{LifecycleError, OperationFailure};
pub use domain::intent::{LifecycleIntent, OperationKind};
