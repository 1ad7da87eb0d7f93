// Copyright (c) 2026 Sideload Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0
//! In-memory canonical app store.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::app::{App, BundleId};
use crate::domain::repository::{AppRepository, RepositoryError};

#[derive(Clone, Default)]
pub struct InMemoryAppRepository {
    apps: Arc<RwLock<HashMap<BundleId, App>>>,
}

impl InMemoryAppRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_apps(apps: impl IntoIterator<Item = App>) -> Self {
        let apps = apps.into_iter().map(|app| (app.bundle_id.clone(), app)).collect();
        Self {
            apps: Arc::new(RwLock::new(apps)),
        }
    }

    /// Snapshot of every stored record, sorted by bundle identifier
    pub fn all(&self) -> Vec<App> {
        let mut apps: Vec<App> = self.apps.read().values().cloned().collect();
        apps.sort_by(|a, b| a.bundle_id.cmp(&b.bundle_id));
        apps
    }
}

#[async_trait]
impl AppRepository for InMemoryAppRepository {
    async fn save(&self, app: &App) -> Result<(), RepositoryError> {
        self.apps.write().insert(app.bundle_id.clone(), app.clone());
        Ok(())
    }

    async fn find(&self, bundle_id: &BundleId) -> Result<Option<App>, RepositoryError> {
        Ok(self.apps.read().get(bundle_id).cloned())
    }

    async fn list_active(&self) -> Result<Vec<App>, RepositoryError> {
        let mut active: Vec<App> = self
            .apps
            .read()
            .values()
            .filter(|app| app.is_active)
            .cloned()
            .collect();
        active.sort_by(|a, b| a.bundle_id.cmp(&b.bundle_id));
        Ok(active)
    }
}
