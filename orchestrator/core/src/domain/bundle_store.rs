// Copyright (c) 2026 Sideload Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Bundle Store Port
//!
//! On-disk app bundles: downloads, the cached copy of each installed bundle
//! (needed to fall back from refresh to reinstall), the bundled backup
//! placeholder and container backups.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use thiserror::Error;

use crate::domain::app::{App, AppExtension, BundleId, OsVersion};
use crate::domain::errors::LifecycleError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppBundle {
    pub bundle_id: BundleId,
    pub name: String,
    pub version: Option<String>,
    /// Content digest of the unsigned bundle.
    pub digest: String,
    pub minimum_os_version: Option<OsVersion>,
    pub entitlements: BTreeSet<String>,
    pub extensions: Vec<AppExtension>,
    /// The bundle needs the optional pre-boot patch step before signing.
    pub requires_patch: bool,
    pub is_placeholder: bool,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("Bundle not found: {0}")]
    NotFound(String),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<StorageError> for LifecycleError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Download(msg) => LifecycleError::Download(msg),
            other => LifecycleError::Storage(other.to_string()),
        }
    }
}

#[async_trait]
pub trait BundleStore: Send + Sync {
    /// Download `app`, at `version` or the latest listed version.
    async fn download(&self, app: &App, version: Option<&str>) -> Result<AppBundle, StorageError>;

    /// The cached bundle of an installed app, if still on disk.
    async fn cached_bundle(&self, bundle_id: &BundleId) -> Result<Option<AppBundle>, StorageError>;

    /// Keep a successfully installed bundle for later reinstalls.
    async fn cache(&self, bundle: &AppBundle) -> Result<(), StorageError>;

    /// Backup placeholder with its identity, icon and name rewritten to `app`.
    async fn placeholder_bundle(&self, app: &App) -> Result<AppBundle, StorageError>;

    /// Apply the pre-boot patch and return the patched bundle.
    async fn patch(&self, bundle: AppBundle) -> Result<AppBundle, StorageError>;

    async fn delete_backup(&self, bundle_id: &BundleId) -> Result<(), StorageError>;

    /// Remove a temporary (e.g. resigned) bundle from disk.
    async fn discard(&self, bundle: &AppBundle) -> Result<(), StorageError>;
}
