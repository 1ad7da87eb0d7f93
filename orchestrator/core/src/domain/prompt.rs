// Copyright (c) 2026 Sideload Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Interactive decisions delegated to the surrounding application.

use async_trait::async_trait;
use std::collections::BTreeSet;

use crate::domain::app::App;
use crate::domain::session::{AppleIdCredentials, Team};

#[async_trait]
pub trait CredentialPrompt: Send + Sync {
    /// Ask for an Apple ID. `None` means the user cancelled.
    async fn sign_in(&self) -> Option<AppleIdCredentials>;

    /// Pick the developer team to sign with. `None` means the user cancelled.
    async fn select_team(&self, teams: &[Team]) -> Option<Team>;

    /// Review entitlements `app` requests that were not approved before.
    async fn review_permissions(&self, app: &App, new_entitlements: &BTreeSet<String>) -> bool;

    /// Choose which of `candidates` to deactivate so that `app` fits. The
    /// selection must free at least `required_slots` slots to be accepted.
    async fn choose_apps_to_deactivate(&self, app: &App, candidates: &[App], required_slots: usize) -> Vec<App>;
}
