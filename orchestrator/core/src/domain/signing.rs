// Copyright (c) 2026 Sideload Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Code-Signing Authority Port
//!
//! Account authentication, team and certificate management, provisioning
//! profiles and re-signing. Also defines [`KeyStore`], the local store for
//! the signing certificate's private key and the remembered team.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::app::BundleId;
use crate::domain::bundle_store::AppBundle;
use crate::domain::errors::LifecycleError;
use crate::domain::session::{
    Account, AnisetteData, ApiSession, AppId, AppleIdCredentials, Certificate, ProvisioningProfile, Team,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SigningError {
    #[error("Request was not authorized: {0}")]
    Unauthorized(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("The team cannot register any more App IDs.")]
    AppIdLimitReached,

    #[error("Signing service error: {0}")]
    Service(String),
}

impl From<SigningError> for LifecycleError {
    fn from(err: SigningError) -> Self {
        LifecycleError::Signing(err.to_string())
    }
}

#[async_trait]
pub trait CodeSigningAuthority: Send + Sync {
    async fn authenticate(
        &self,
        credentials: &AppleIdCredentials,
        anisette: &AnisetteData,
    ) -> Result<(Account, ApiSession), SigningError>;

    async fn fetch_teams(&self, account: &Account, session: &ApiSession) -> Result<Vec<Team>, SigningError>;

    async fn fetch_certificates(&self, team: &Team, session: &ApiSession) -> Result<Vec<Certificate>, SigningError>;

    /// Create a certificate. The returned value carries the freshly generated
    /// private key.
    async fn add_certificate(
        &self,
        team: &Team,
        machine_name: &str,
        session: &ApiSession,
    ) -> Result<Certificate, SigningError>;

    async fn revoke_certificate(
        &self,
        certificate: &Certificate,
        team: &Team,
        session: &ApiSession,
    ) -> Result<(), SigningError>;

    async fn fetch_app_ids(&self, team: &Team, session: &ApiSession) -> Result<Vec<AppId>, SigningError>;

    /// Register `bundle_id` with the team. Fails with
    /// [`SigningError::AppIdLimitReached`] when the service refuses more.
    async fn add_app_id(
        &self,
        name: &str,
        bundle_id: &BundleId,
        team: &Team,
        session: &ApiSession,
    ) -> Result<AppId, SigningError>;

    async fn fetch_provisioning_profile(
        &self,
        bundle_id: &BundleId,
        team: &Team,
        session: &ApiSession,
    ) -> Result<ProvisioningProfile, SigningError>;

    /// Re-sign `bundle` (and its extensions) with `certificate`. Returns the
    /// signed copy.
    async fn resign(
        &self,
        bundle: &AppBundle,
        profiles: &[ProvisioningProfile],
        certificate: &Certificate,
    ) -> Result<AppBundle, SigningError>;
}

/// Locally held signing key.
#[derive(Clone, PartialEq, Eq)]
pub struct StoredSigningKey {
    pub serial_number: String,
    pub private_key: Vec<u8>,
}

impl std::fmt::Debug for StoredSigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredSigningKey")
            .field("serial_number", &self.serial_number)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyStoreError {
    #[error("Key store unavailable: {0}")]
    Unavailable(String),
}

impl From<KeyStoreError> for LifecycleError {
    fn from(err: KeyStoreError) -> Self {
        LifecycleError::Storage(err.to_string())
    }
}

#[async_trait]
pub trait KeyStore: Send + Sync {
    async fn signing_key(&self) -> Result<Option<StoredSigningKey>, KeyStoreError>;

    async fn store_signing_key(&self, key: StoredSigningKey) -> Result<(), KeyStoreError>;

    async fn active_team_id(&self) -> Result<Option<String>, KeyStoreError>;

    async fn set_active_team_id(&self, team_id: &str) -> Result<(), KeyStoreError>;
}
