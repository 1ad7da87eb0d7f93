// Copyright (c) 2026 Sideload Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0
//! In-memory signing key store.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::domain::signing::{KeyStore, KeyStoreError, StoredSigningKey};

#[derive(Debug, Default)]
struct KeyStoreState {
    signing_key: Option<StoredSigningKey>,
    active_team_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryKeyStore {
    state: Arc<Mutex<KeyStoreState>>,
}

impl InMemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_signing_key(key: StoredSigningKey) -> Self {
        let store = Self::default();
        store.state.lock().signing_key = Some(key);
        store
    }
}

#[async_trait]
impl KeyStore for InMemoryKeyStore {
    async fn signing_key(&self) -> Result<Option<StoredSigningKey>, KeyStoreError> {
        Ok(self.state.lock().signing_key.clone())
    }

    async fn store_signing_key(&self, key: StoredSigningKey) -> Result<(), KeyStoreError> {
        self.state.lock().signing_key = Some(key);
        Ok(())
    }

    async fn active_team_id(&self) -> Result<Option<String>, KeyStoreError> {
        Ok(self.state.lock().active_team_id.clone())
    }

    async fn set_active_team_id(&self, team_id: &str) -> Result<(), KeyStoreError> {
        self.state.lock().active_team_id = Some(team_id.to_string());
        Ok(())
    }
}
