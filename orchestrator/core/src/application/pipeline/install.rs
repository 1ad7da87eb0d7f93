// Copyright (c) 2026 Sideload Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Install and Update.
//!
//! Download → Verify → DeactivateConflicts → Patch → RefreshCredentials →
//! FetchProvisioningProfiles → Resign → Transmit → InstallOnDevice → commit.
//! Nothing on the canonical record changes before the final commit, so a
//! failure at any step needs no compensation.

use chrono::Utc;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use super::{discard, fetch_profiles, Pipeline};
use crate::domain::app::{App, OsVersion};
use crate::domain::bundle_store::AppBundle;
use crate::domain::errors::{LifecycleError, VerificationError};
use crate::domain::graph::Lane;
use crate::domain::progress::ProgressRef;
use crate::domain::session::Endpoint;

const DOWNLOAD_WEIGHT: u64 = 20;
const VERIFY_WEIGHT: u64 = 5;
const DEACTIVATE_WEIGHT: u64 = 5;
const PATCH_WEIGHT: u64 = 5;
const CREDENTIALS_WEIGHT: u64 = 5;
const PROFILES_WEIGHT: u64 = 10;
const RESIGN_WEIGHT: u64 = 20;
const TRANSMIT_WEIGHT: u64 = 15;
const INSTALL_WEIGHT: u64 = 15;

/// Where the bundle to install comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleSource {
    /// Latest listed version.
    Latest,
    Version(String),
    /// The cached copy of the installed bundle, downloading the latest
    /// version if the cache is gone.
    Cached,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOptions {
    pub source: BundleSource,
    /// Fail if the bundle is bit-identical to the installed one.
    pub reject_identical: bool,
    /// Run DeactivateConflicts. Callers that already made room skip it.
    pub make_room: bool,
}

impl InstallOptions {
    pub fn install() -> Self {
        Self {
            source: BundleSource::Latest,
            reject_identical: false,
            make_room: true,
        }
    }

    pub fn update(version: Option<String>) -> Self {
        Self {
            source: version.map_or(BundleSource::Latest, BundleSource::Version),
            reject_identical: true,
            make_room: true,
        }
    }

    /// Full reinstall from the cached bundle.
    pub fn reinstall() -> Self {
        Self {
            source: BundleSource::Cached,
            reject_identical: false,
            make_room: true,
        }
    }

    pub fn without_room_check(mut self) -> Self {
        self.make_room = false;
        self
    }
}

impl Pipeline {
    pub(crate) async fn install(
        &self,
        mut app: App,
        options: InstallOptions,
        progress: &ProgressRef,
    ) -> Result<App, LifecycleError> {
        let services = self.services.clone();
        let session = self.session.current().await?;

        let bundle = {
            let services = services.clone();
            let listing = app.clone();
            let source = options.source.clone();
            self.step(progress, DOWNLOAD_WEIGHT, self.spec("download", Lane::Pool), async move {
                let bundle = match source {
                    BundleSource::Latest => services.bundles.download(&listing, None).await?,
                    BundleSource::Version(version) => services.bundles.download(&listing, Some(version.as_str())).await?,
                    BundleSource::Cached => match services.bundles.cached_bundle(&listing.bundle_id).await? {
                        Some(bundle) => bundle,
                        None => {
                            debug!(bundle_id = %listing.bundle_id, "Cached bundle missing, downloading");
                            services.bundles.download(&listing, None).await?
                        }
                    },
                };
                Ok(bundle)
            })
            .await?
        };

        let approved = {
            let services = services.clone();
            let snapshot = app.clone();
            let bundle = bundle.clone();
            let device_os = session.endpoint.os_version;
            let reject_identical = options.reject_identical;
            self.step(progress, VERIFY_WEIGHT, self.spec("verify", Lane::Pool), async move {
                verify(&snapshot, &bundle, device_os, reject_identical)?;

                let requested: BTreeSet<String> = bundle
                    .entitlements
                    .difference(&snapshot.approved_entitlements)
                    .cloned()
                    .collect();
                if !requested.is_empty() && !services.prompt.review_permissions(&snapshot, &requested).await {
                    return Err(VerificationError::PermissionsRejected {
                        app_name: snapshot.name.clone(),
                    }
                    .into());
                }
                Ok(bundle.entitlements)
            })
            .await?
        };
        app.approved_entitlements.extend(approved);
        app.extensions = bundle.extensions.clone();

        if options.make_room {
            self.make_room(&app, &session, progress, DEACTIVATE_WEIGHT).await?;
        } else {
            self.skip(progress, DEACTIVATE_WEIGHT);
        }

        let bundle = if bundle.requires_patch {
            let services = services.clone();
            self.step(progress, PATCH_WEIGHT, self.spec("patch", Lane::Pool), async move {
                Ok(services.bundles.patch(bundle).await?)
            })
            .await?
        } else {
            self.skip(progress, PATCH_WEIGHT);
            bundle
        };

        self.ensure_active(progress)?;
        let session = self.session.fresh(&self.context, &services.authenticator).await?;
        self.skip(progress, CREDENTIALS_WEIGHT);

        let profiles = {
            let services = services.clone();
            let session = session.clone();
            let app_name = app.name.clone();
            let identifiers = app.app_id_names();
            self.step(progress, PROFILES_WEIGHT, self.spec("fetch profiles", Lane::Pool), async move {
                fetch_profiles(&services, &session, &app_name, identifiers).await
            })
            .await?
        };

        let signed = {
            let services = services.clone();
            let session = session.clone();
            let bundle = bundle.clone();
            let profiles = profiles.clone();
            self.step(progress, RESIGN_WEIGHT, self.spec("resign", Lane::Pool), async move {
                Ok(services
                    .authority
                    .resign(&bundle, &profiles, &session.certificate)
                    .await?)
            })
            .await?
        };

        let delivered = self.deliver(&signed, &bundle, &session.endpoint, progress).await;
        discard(services.bundles.as_ref(), &signed).await;
        delivered?;

        app.is_active = true;
        app.certificate_serial = Some(session.certificate_serial().to_string());
        app.refreshed_at = Some(Utc::now());
        app.expires_at = profiles.iter().map(|profile| profile.expires_at).min();
        if bundle.version.is_some() {
            app.version = bundle.version.clone();
        }
        app.installed_digest = Some(bundle.digest.clone());
        app.placeholder_installed = false;
        self.commit(&app).await?;

        Ok(app)
    }

    /// Transmit and InstallOnDevice, then keep the unsigned bundle for
    /// later reinstalls.
    async fn deliver(
        &self,
        signed: &AppBundle,
        unsigned: &AppBundle,
        endpoint: &Endpoint,
        progress: &ProgressRef,
    ) -> Result<(), LifecycleError> {
        let connection = {
            let services = self.services.clone();
            let signed = signed.clone();
            let endpoint = endpoint.clone();
            self.step(progress, TRANSMIT_WEIGHT, self.spec("transmit", Lane::Serial), async move {
                Ok(services.transport.send(&signed, &endpoint).await?)
            })
            .await?
        };

        if self.is_host {
            info!(bundle_id = %self.bundle_id, "Installing host app; the process may exit before completion is reported");
        }

        let services = self.services.clone();
        let unsigned = unsigned.clone();
        self.step(progress, INSTALL_WEIGHT, self.device_spec("install"), async move {
            services.transport.install(&connection).await?;
            if let Err(e) = services.bundles.cache(&unsigned).await {
                warn!(bundle_id = %unsigned.bundle_id, error = %e, "Failed to cache installed bundle");
            }
            Ok(())
        })
        .await
    }
}

fn verify(app: &App, bundle: &AppBundle, device_os: OsVersion, reject_identical: bool) -> Result<(), VerificationError> {
    if bundle.bundle_id != app.bundle_id {
        return Err(VerificationError::MismatchedBundleIdentifier {
            expected: app.bundle_id.clone(),
            found: bundle.bundle_id.clone(),
        });
    }

    if let Some(required) = bundle.minimum_os_version {
        if required > device_os {
            return Err(VerificationError::UnsupportedOsVersion {
                app_name: app.name.clone(),
                required,
            });
        }
    }

    if reject_identical && app.installed_digest.as_deref() == Some(bundle.digest.as_str()) {
        return Err(VerificationError::IdenticalToInstalled {
            app_name: app.name.clone(),
        });
    }

    Ok(())
}
