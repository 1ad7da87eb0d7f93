// Copyright (c) 2026 Sideload Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Lifecycle intents submitted by callers.

use crate::domain::app::{App, BundleId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A high-level request for one app. Immutable once submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LifecycleIntent {
    Install(App),
    /// Update to a specific version, or the latest listed one when `None`.
    Update(App, Option<String>),
    Refresh(App),
    Activate(App),
    Deactivate(App),
    Backup(App),
    Restore(App),
}

impl LifecycleIntent {
    pub fn app(&self) -> &App {
        match self {
            LifecycleIntent::Install(app)
            | LifecycleIntent::Update(app, _)
            | LifecycleIntent::Refresh(app)
            | LifecycleIntent::Activate(app)
            | LifecycleIntent::Deactivate(app)
            | LifecycleIntent::Backup(app)
            | LifecycleIntent::Restore(app) => app,
        }
    }

    pub fn bundle_id(&self) -> &BundleId {
        &self.app().bundle_id
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            LifecycleIntent::Install(_) => OperationKind::Install,
            LifecycleIntent::Update(_, _) => OperationKind::Update,
            LifecycleIntent::Refresh(_) => OperationKind::Refresh,
            LifecycleIntent::Activate(_) => OperationKind::Activate,
            LifecycleIntent::Deactivate(_) => OperationKind::Deactivate,
            LifecycleIntent::Backup(_) => OperationKind::Backup,
            LifecycleIntent::Restore(_) => OperationKind::Restore,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Install,
    Update,
    Refresh,
    Activate,
    Deactivate,
    Backup,
    Restore,
}

impl OperationKind {
    /// Verb used in user-facing failure titles.
    pub fn verb(&self) -> &'static str {
        match self {
            OperationKind::Install => "Install",
            OperationKind::Update => "Update",
            OperationKind::Refresh => "Refresh",
            OperationKind::Activate => "Activate",
            OperationKind::Deactivate => "Deactivate",
            OperationKind::Backup => "Back Up",
            OperationKind::Restore => "Restore",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Install => "install",
            OperationKind::Update => "update",
            OperationKind::Refresh => "refresh",
            OperationKind::Activate => "activate",
            OperationKind::Deactivate => "deactivate",
            OperationKind::Backup => "backup",
            OperationKind::Restore => "restore",
        };
        f.write_str(name)
    }
}
