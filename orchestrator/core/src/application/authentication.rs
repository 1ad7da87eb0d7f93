// Copyright (c) 2026 Sideload Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Authentication
//!
//! Builds the [`AuthenticatedSession`] shared by a batch. An unexpired
//! session passed in is returned as is, without any network call. Otherwise:
//! endpoint discovery, Apple ID sign-in, anisette, account authentication,
//! team selection and finally the signing certificate.
//!
//! The orchestrator runs this inside a single graph node per batch, so it
//! happens at most once however many pipelines wait on it.

use std::sync::Arc;
use tracing::{info, warn};

use crate::application::anisette::AnisetteProvider;
use crate::application::certificate_broker::CertificateBroker;
use crate::domain::errors::{AuthenticationError, LifecycleError};
use crate::domain::prompt::CredentialPrompt;
use crate::domain::session::{AuthenticatedSession, Team};
use crate::domain::signing::{CodeSigningAuthority, KeyStore, SigningError};
use crate::domain::transport::DeviceTransport;

pub struct Authenticator {
    transport: Arc<dyn DeviceTransport>,
    authority: Arc<dyn CodeSigningAuthority>,
    prompt: Arc<dyn CredentialPrompt>,
    key_store: Arc<dyn KeyStore>,
    anisette: AnisetteProvider,
    broker: CertificateBroker,
}

impl Authenticator {
    pub fn new(
        transport: Arc<dyn DeviceTransport>,
        authority: Arc<dyn CodeSigningAuthority>,
        prompt: Arc<dyn CredentialPrompt>,
        key_store: Arc<dyn KeyStore>,
        anisette: AnisetteProvider,
        broker: CertificateBroker,
    ) -> Self {
        Self {
            transport,
            authority,
            prompt,
            key_store,
            anisette,
            broker,
        }
    }

    pub async fn authenticate(
        &self,
        existing: Option<Arc<AuthenticatedSession>>,
    ) -> Result<Arc<AuthenticatedSession>, LifecycleError> {
        if let Some(session) = existing {
            if !session.is_expired() {
                return Ok(session);
            }
            info!(team = %session.team.identifier, "Session expired, authenticating again");
        }

        info!("Authenticating");
        let endpoint = self.transport.find_endpoint().await?;

        let credentials = self.prompt.sign_in().await.ok_or(LifecycleError::Cancelled)?;
        let anisette = self.anisette.fetch().await?;

        let (account, api_session) = self
            .authority
            .authenticate(&credentials, &anisette)
            .await
            .map_err(|e| match e {
                SigningError::Unauthorized(msg) => AuthenticationError::CredentialRejected(msg),
                other => AuthenticationError::Service(other.to_string()),
            })?;

        let teams = self
            .authority
            .fetch_teams(&account, &api_session)
            .await
            .map_err(|e| AuthenticationError::Service(e.to_string()))?;
        let team = self.select_team(teams).await?;

        let certificate = self
            .broker
            .certificate(&team, &api_session, &endpoint.device_name)
            .await?;

        info!(
            account = %account.apple_id,
            team = %team.identifier,
            endpoint = %endpoint.identifier,
            "Authenticated"
        );

        Ok(Arc::new(AuthenticatedSession {
            account,
            team,
            certificate,
            api_session,
            anisette,
            endpoint,
        }))
    }

    async fn select_team(&self, teams: Vec<Team>) -> Result<Team, LifecycleError> {
        if teams.is_empty() {
            return Err(AuthenticationError::NoTeam.into());
        }

        let team = if teams.len() == 1 {
            teams.into_iter().next()
        } else {
            let remembered = self.key_store.active_team_id().await.unwrap_or_else(|e| {
                warn!(error = %e, "Could not read remembered team");
                None
            });
            match remembered.and_then(|id| teams.iter().find(|team| team.identifier == id).cloned()) {
                Some(team) => Some(team),
                None => self.prompt.select_team(&teams).await,
            }
        };
        let team = team.ok_or(LifecycleError::Cancelled)?;

        if let Err(e) = self.key_store.set_active_team_id(&team.identifier).await {
            warn!(error = %e, team = %team.identifier, "Could not remember active team");
        }
        Ok(team)
    }
}
