// Copyright (c) 2026 Sideload Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # App Aggregate
//!
//! The logical application managed by the orchestrator. A single [`App`] value
//! is either a *catalog listing* (download URL + version, never installed) or
//! an *installed* record (certificate serial, active flag, expiration).
//!
//! The canonical record is owned by the caller's [`AppRepository`]; pipelines
//! work on a private copy and only commit it back while holding the bundle's
//! operation slot.
//!
//! [`AppRepository`]: crate::domain::repository::AppRepository

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Stable identifier of an app, unique per device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BundleId(pub String);

impl BundleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BundleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BundleId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// App extension shipped inside an app bundle. Each extension needs its own
/// provisioning profile and, under the extension-counting policy, its own
/// active slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppExtension {
    pub bundle_id: BundleId,
    pub name: String,
}

/// Dotted OS version (`major.minor.patch`), compared numerically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OsVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl OsVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }
}

impl Ord for OsVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch).cmp(&(other.major, other.minor, other.patch))
    }
}

impl PartialOrd for OsVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for OsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.patch > 0 {
            write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
        } else {
            write!(f, "{}.{}", self.major, self.minor)
        }
    }
}

impl FromStr for OsVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().split('.');
        let mut next = |required: bool| -> Result<u32, String> {
            match parts.next() {
                Some(part) => part
                    .parse::<u32>()
                    .map_err(|_| format!("invalid OS version component '{}' in '{}'", part, s)),
                None if required => Err(format!("invalid OS version '{}'", s)),
                None => Ok(0),
            }
        };
        let major = next(true)?;
        let minor = next(false)?;
        let patch = next(false)?;
        Ok(Self::new(major, minor, patch))
    }
}

/// Canonical app record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct App {
    pub bundle_id: BundleId,
    pub name: String,

    /// Catalog version (listing) or installed version (installed record).
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub download_url: Option<String>,

    #[serde(default)]
    pub extensions: Vec<AppExtension>,

    /// Entitlements the user already approved for this app.
    #[serde(default)]
    pub approved_entitlements: BTreeSet<String>,

    #[serde(default)]
    pub is_active: bool,
    /// Serial of the certificate the installed copy was signed with.
    #[serde(default)]
    pub certificate_serial: Option<String>,
    #[serde(default)]
    pub refreshed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// Digest of the installed bundle, used to reject "update to self".
    #[serde(default)]
    pub installed_digest: Option<String>,

    /// A container backup exists on disk.
    #[serde(default)]
    pub has_backup: bool,
    /// A backup placeholder currently stands in for the real app on device.
    #[serde(default)]
    pub placeholder_installed: bool,
}

impl App {
    /// Catalog listing that has never been installed.
    pub fn listing(bundle_id: impl Into<String>, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            bundle_id: BundleId::new(bundle_id),
            name: name.into(),
            version: Some(version.into()),
            download_url: None,
            extensions: Vec::new(),
            approved_entitlements: BTreeSet::new(),
            is_active: false,
            certificate_serial: None,
            refreshed_at: None,
            expires_at: None,
            installed_digest: None,
            has_backup: false,
            placeholder_installed: false,
        }
    }

    pub fn is_installed(&self) -> bool {
        self.certificate_serial.is_some()
    }

    /// Every bundle identifier that needs a provisioning profile: the app
    /// itself followed by its extensions.
    pub fn profile_bundle_ids(&self) -> Vec<BundleId> {
        std::iter::once(self.bundle_id.clone())
            .chain(self.extensions.iter().map(|e| e.bundle_id.clone()))
            .collect()
    }

    /// Same identifiers as [`profile_bundle_ids`](Self::profile_bundle_ids),
    /// each paired with the name its App ID is registered under.
    pub fn app_id_names(&self) -> Vec<(BundleId, String)> {
        std::iter::once((self.bundle_id.clone(), self.name.clone()))
            .chain(
                self.extensions
                    .iter()
                    .map(|e| (e.bundle_id.clone(), format!("{} {}", self.name, e.name))),
            )
            .collect()
    }
}
