// Copyright (c) 2026 Sideload Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Authenticated Session
//!
//! Value objects shared by every pipeline of a batch: the developer team, the
//! signing certificate (with its private key), the signing-service API session,
//! anisette data and the device endpoint discovered for the batch.
//!
//! An [`AuthenticatedSession`] is produced by exactly one authentication node
//! per batch and is immutable afterwards; pipelines hold it behind an `Arc`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::domain::app::{BundleId, OsVersion};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamKind {
    /// Free developer account: subject to the active-app cap.
    Free,
    Individual,
    Organization,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub identifier: String,
    pub name: String,
    pub kind: TeamKind,
}

impl Team {
    pub fn is_free(&self) -> bool {
        self.kind == TeamKind::Free
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub apple_id: String,
    pub identifier: String,
}

/// Apple ID login collected through the credential prompt.
#[derive(Clone, PartialEq, Eq)]
pub struct AppleIdCredentials {
    pub apple_id: String,
    pub password: String,
}

impl fmt::Debug for AppleIdCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppleIdCredentials")
            .field("apple_id", &self.apple_id)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Device-attestation metadata required by the signing service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnisetteData {
    pub machine_id: String,
    pub one_time_password: String,
    pub local_user_id: String,
    pub generated_at: DateTime<Utc>,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub serial_number: String,
    pub machine_name: Option<String>,
    /// Private key material; `None` when the key is not held locally.
    pub private_key: Option<Vec<u8>>,
}

impl Certificate {
    pub fn has_private_key(&self) -> bool {
        self.private_key.is_some()
    }
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("serial_number", &self.serial_number)
            .field("machine_name", &self.machine_name)
            .field("private_key", &self.private_key.as_ref().map(|_| "<present>"))
            .finish()
    }
}

/// Signing-service API session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiSession {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// A reachable device endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub identifier: String,
    pub device_name: String,
    pub os_version: OsVersion,
    /// The user explicitly chose this endpoint (as opposed to one discovered
    /// opportunistically).
    pub is_preferred: bool,
    /// The endpoint can replace provisioning profiles in place.
    pub supports_profile_refresh: bool,
}

/// A bundle identifier registered with a team. Free teams may hold only a
/// few at once; each expires on its own schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppId {
    pub identifier: String,
    pub name: String,
    pub bundle_id: BundleId,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningProfile {
    pub bundle_id: BundleId,
    pub team_identifier: String,
    pub entitlements: BTreeSet<String>,
    pub expires_at: DateTime<Utc>,
}

/// Shared authentication state for one batch of lifecycle operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedSession {
    pub account: Account,
    pub team: Team,
    pub certificate: Certificate,
    pub api_session: ApiSession,
    pub anisette: AnisetteData,
    pub endpoint: Endpoint,
}

impl AuthenticatedSession {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.api_session.expires_at <= now
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn certificate_serial(&self) -> &str {
        &self.certificate.serial_number
    }
}
