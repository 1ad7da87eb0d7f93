// Copyright (c) 2026 Sideload Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Certificate Broker
//!
//! Produces a signing certificate whose private key is held locally.
//!
//! 1. If the key store holds a key whose serial matches one of the team's
//!    certificates, that certificate is reused.
//! 2. Otherwise an existing certificate is revoked (ours by machine name if
//!    present, else the first listed) and a new one is created.
//! 3. The certificate list is fetched again and the new certificate is
//!    matched by serial; the generated key is attached to the listed copy
//!    and persisted.

use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::errors::{CertificateError, LifecycleError};
use crate::domain::session::{ApiSession, Certificate, Team};
use crate::domain::signing::{CodeSigningAuthority, KeyStore, StoredSigningKey};

pub struct CertificateBroker {
    authority: Arc<dyn CodeSigningAuthority>,
    key_store: Arc<dyn KeyStore>,
    machine_name: String,
}

impl CertificateBroker {
    pub fn new(
        authority: Arc<dyn CodeSigningAuthority>,
        key_store: Arc<dyn KeyStore>,
        machine_name: impl Into<String>,
    ) -> Self {
        Self {
            authority,
            key_store,
            machine_name: machine_name.into(),
        }
    }

    /// Machine name given to certificates created for `device_name`.
    pub fn machine_name_for(&self, device_name: &str) -> String {
        format!("{} - {}", self.machine_name, device_name)
    }

    pub async fn certificate(
        &self,
        team: &Team,
        session: &ApiSession,
        device_name: &str,
    ) -> Result<Certificate, LifecycleError> {
        let certificates = self
            .authority
            .fetch_certificates(team, session)
            .await
            .map_err(service_error)?;

        let stored = self.key_store.signing_key().await.map_err(service_error)?;
        if let Some(stored) = stored {
            if let Some(existing) = certificates
                .iter()
                .find(|certificate| certificate.serial_number == stored.serial_number)
            {
                info!(serial = %existing.serial_number, team = %team.identifier, "Reusing signing certificate");
                let mut certificate = existing.clone();
                certificate.private_key = Some(stored.private_key);
                return Ok(certificate);
            }
        }

        let machine_name = self.machine_name_for(device_name);

        if let Some(stale) = self.revocation_target(&certificates) {
            warn!(
                serial = %stale.serial_number,
                team = %team.identifier,
                "Revoking signing certificate without a local private key"
            );
            self.authority
                .revoke_certificate(stale, team, session)
                .await
                .map_err(service_error)?;
        }

        let created = self
            .authority
            .add_certificate(team, &machine_name, session)
            .await
            .map_err(service_error)?;
        let private_key = created
            .private_key
            .clone()
            .ok_or(CertificateError::MissingPrivateKey)?;

        let listed = self
            .authority
            .fetch_certificates(team, session)
            .await
            .map_err(service_error)?;
        let mut certificate = listed
            .into_iter()
            .find(|certificate| certificate.serial_number == created.serial_number)
            .ok_or(CertificateError::MissingCertificate)?;
        certificate.private_key = Some(private_key.clone());

        self.key_store
            .store_signing_key(StoredSigningKey {
                serial_number: certificate.serial_number.clone(),
                private_key,
            })
            .await
            .map_err(service_error)?;

        info!(serial = %certificate.serial_number, machine_name = %machine_name, "Created signing certificate");
        Ok(certificate)
    }

    fn revocation_target<'a>(&self, certificates: &'a [Certificate]) -> Option<&'a Certificate> {
        certificates
            .iter()
            .find(|certificate| {
                certificate
                    .machine_name
                    .as_deref()
                    .is_some_and(|name| name.starts_with(&self.machine_name))
            })
            .or_else(|| certificates.first())
    }
}

fn service_error(e: impl std::fmt::Display) -> CertificateError {
    CertificateError::Service(e.to_string())
}
