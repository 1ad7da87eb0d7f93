// Copyright (c) 2026 Sideload Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Anisette data source port: a fast path and a slower plugin fallback.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::domain::session::AnisetteData;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnisetteError {
    /// The fast path lost its connection; the plugin fallback may still work.
    #[error("Connection to the anisette server was interrupted")]
    ConnectionInterrupted,

    #[error("Anisette data could not be found")]
    NotFound,

    #[error("Anisette request failed: {0}")]
    Other(String),
}

#[async_trait]
pub trait AnisetteSource: Send + Sync {
    async fn request_anisette_data(&self) -> Result<AnisetteData, AnisetteError>;

    /// Slow fallback. `timeout` is advisory; callers enforce it as well.
    async fn request_via_plugin(&self, timeout: Duration) -> Result<AnisetteData, AnisetteError>;
}
