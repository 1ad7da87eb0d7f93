// Copyright (c) 2026 Sideload Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Lifecycle Error Taxonomy
//!
//! Closed set of error kinds produced by the orchestrator. Collaborator ports
//! return the narrow error type they own; `From` impls lift those into
//! [`LifecycleError`].
//!
//! | Kind | Scope | Typical cause |
//! |------|-------|---------------|
//! | `Authentication` | whole batch | no team, credential rejected |
//! | `Certificate` | whole batch | missing private key / certificate |
//! | `Capacity` | one app | user declined to free an active slot, App ID limit |
//! | `Transport` | one app | device not found, lost connection |
//! | `Verification` | one app | unsupported OS, rejected permissions |
//! | `Cancelled` | one app | user or system cancellation |
//!
//! Errors are `Clone` because a single authentication failure is attributed
//! to every pipeline waiting on it.

use chrono::{DateTime, Utc};

use crate::domain::app::{BundleId, OsVersion};
use crate::domain::intent::OperationKind;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthenticationError {
    #[error("Developer account is not a member of any team.")]
    NoTeam,

    #[error("Apple ID credentials were rejected: {0}")]
    CredentialRejected(String),

    #[error("Anisette data could not be retrieved: {0}")]
    AnisetteUnavailable(String),

    #[error("Signing service request failed: {0}")]
    Service(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CertificateError {
    #[error("The certificate's private key could not be found.")]
    MissingPrivateKey,

    #[error("The certificate could not be found.")]
    MissingCertificate,

    #[error("Signing service rejected the certificate request: {0}")]
    Service(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapacityError {
    #[error("“{app_name}” needs {required} active slot(s) but only {available} are free.")]
    Declined {
        app_name: String,
        required: usize,
        available: usize,
    },

    #[error("“{app_name}” needs {required} new App ID(s) but only {available} are available.")]
    AppIdLimitReached {
        app_name: String,
        required: usize,
        available: usize,
        /// When the team's oldest App ID expires and frees a registration.
        next_expiration: Option<DateTime<Utc>>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Could not find a device.")]
    DeviceNotFound,

    #[error("Lost connection to the device.")]
    LostConnection,

    #[error("The device does not support this request.")]
    UnsupportedRequest,

    #[error("Could not connect to a server.")]
    ServerNotFound,

    #[error("Device transport failed: {0}")]
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationError {
    #[error("“{app_name}” requires iOS {required}.")]
    UnsupportedOsVersion { app_name: String, required: OsVersion },

    #[error("The permissions requested by “{app_name}” were not approved.")]
    PermissionsRejected { app_name: String },

    #[error("Downloaded bundle {found} does not match requested app {expected}.")]
    MismatchedBundleIdentifier { expected: BundleId, found: BundleId },

    #[error("“{app_name}” is already installed at this exact build.")]
    IdenticalToInstalled { app_name: String },
}

/// Error kinds surfaced by lifecycle operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Authentication(#[from] AuthenticationError),

    #[error(transparent)]
    Certificate(#[from] CertificateError),

    #[error(transparent)]
    Capacity(#[from] CapacityError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Verification(#[from] VerificationError),

    #[error("The operation was cancelled.")]
    Cancelled,

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Bundle storage failed: {0}")]
    Storage(String),

    #[error("App record could not be saved: {0}")]
    Repository(String),

    #[error("Internal orchestrator error: {0}")]
    Internal(String),
}

impl LifecycleError {
    /// Errors that abort an entire batch rather than a single app.
    pub fn is_batch_fatal(&self) -> bool {
        matches!(
            self,
            LifecycleError::Authentication(_) | LifecycleError::Certificate(_)
        )
    }

    /// Device-not-found and lost-connection are softened to `ServerNotFound`
    /// when the endpoint in use was discovered opportunistically rather than
    /// explicitly preferred by the user.
    pub fn soften_for_endpoint(self, endpoint_is_preferred: bool) -> Self {
        match self {
            LifecycleError::Transport(TransportError::DeviceNotFound | TransportError::LostConnection)
                if !endpoint_is_preferred =>
            {
                LifecycleError::Transport(TransportError::ServerNotFound)
            }
            other => other,
        }
    }
}

/// A terminal pipeline failure attributed to one app and operation kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationFailure {
    pub kind: OperationKind,
    pub bundle_id: BundleId,
    pub app_name: String,
    pub error: LifecycleError,
}

impl fmt::Display for OperationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title(), self.error)
    }
}

impl std::error::Error for OperationFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl OperationFailure {
    pub fn new(kind: OperationKind, bundle_id: BundleId, app_name: impl Into<String>, error: LifecycleError) -> Self {
        Self {
            kind,
            bundle_id,
            app_name: app_name.into(),
            error,
        }
    }

    /// Human-readable title, e.g. `Failed to Refresh “Delta”`.
    pub fn title(&self) -> String {
        format!("Failed to {} “{}”", self.kind.verb(), self.app_name)
    }
}
