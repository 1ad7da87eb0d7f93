// Copyright (c) 2026 Sideload Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # App Repository Interface
//!
//! Persistence contract for the canonical [`App`] record, implemented in
//! `crate::infrastructure::repositories`. Pipelines write through it only
//! while holding the bundle's operation slot.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::app::{App, BundleId};
use crate::domain::errors::LifecycleError;

#[async_trait]
pub trait AppRepository: Send + Sync {
    /// Save app (create or update)
    async fn save(&self, app: &App) -> Result<(), RepositoryError>;

    async fn find(&self, bundle_id: &BundleId) -> Result<Option<App>, RepositoryError>;

    /// All apps currently flagged active
    async fn list_active(&self) -> Result<Vec<App>, RepositoryError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<RepositoryError> for LifecycleError {
    fn from(err: RepositoryError) -> Self {
        LifecycleError::Repository(err.to_string())
    }
}
