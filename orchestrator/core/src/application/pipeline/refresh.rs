// Copyright (c) 2026 Sideload Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Refresh: replace provisioning profiles in place, or reinstall.
//!
//! The in-place path needs all of: the app signed with the session's
//! certificate, no backup placeholder standing in for it, an endpoint that
//! supports profile replacement and the cached bundle still on disk. Any
//! one missing sends the pipeline down the full reinstall path instead, as
//! does an endpoint answering `UnsupportedRequest`. Neither is a failure.

use chrono::Utc;
use tracing::{debug, info};

use super::{fetch_profiles, InstallOptions, Pipeline};
use crate::domain::app::App;
use crate::domain::errors::{LifecycleError, TransportError};
use crate::domain::graph::Lane;
use crate::domain::progress::ProgressRef;
use crate::domain::session::AuthenticatedSession;

const PROFILES_WEIGHT: u64 = 30;
const REFRESH_WEIGHT: u64 = 70;

/// Why an app cannot be refreshed in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReinstallReason {
    CertificateChanged,
    PlaceholderInstalled,
    RefreshUnsupported,
    CachedBundleMissing,
}

/// First reason, in evaluation order, that forces a full reinstall.
pub fn reinstall_reason(app: &App, session: &AuthenticatedSession, has_cached_bundle: bool) -> Option<ReinstallReason> {
    if app.certificate_serial.as_deref() != Some(session.certificate_serial()) {
        Some(ReinstallReason::CertificateChanged)
    } else if app.placeholder_installed {
        Some(ReinstallReason::PlaceholderInstalled)
    } else if !session.endpoint.supports_profile_refresh {
        Some(ReinstallReason::RefreshUnsupported)
    } else if !has_cached_bundle {
        Some(ReinstallReason::CachedBundleMissing)
    } else {
        None
    }
}

impl Pipeline {
    pub(crate) async fn refresh(&self, mut app: App, progress: &ProgressRef) -> Result<App, LifecycleError> {
        let services = self.services.clone();

        self.ensure_active(progress)?;
        let session = self.session.fresh(&self.context, &services.authenticator).await?;
        let has_cached_bundle = services.bundles.cached_bundle(&app.bundle_id).await?.is_some();

        if let Some(reason) = reinstall_reason(&app, &session, has_cached_bundle) {
            info!(bundle_id = %app.bundle_id, reason = ?reason, "Refreshing by full reinstall");
            let reinstall = progress.child(100, 100);
            return self.install(app, InstallOptions::reinstall(), &reinstall).await;
        }

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

        if self.is_host {
            info!(bundle_id = %self.bundle_id, "Refreshing host app; the process may exit before completion is reported");
        }

        let refreshed = {
            let services = services.clone();
            let endpoint = session.endpoint.clone();
            let bundle_id = app.bundle_id.clone();
            let profiles = profiles.clone();
            self.step(progress, REFRESH_WEIGHT, self.device_spec("refresh"), async move {
                Ok(services
                    .transport
                    .refresh_profiles(&endpoint, &bundle_id, &profiles)
                    .await?)
            })
            .await
        };

        match refreshed {
            Ok(()) => {}
            Err(LifecycleError::Transport(TransportError::UnsupportedRequest)) => {
                debug!(bundle_id = %app.bundle_id, "In-place refresh unsupported, reinstalling");
                let reinstall = progress.child(REFRESH_WEIGHT, 100);
                return self.install(app, InstallOptions::reinstall(), &reinstall).await;
            }
            Err(e) => return Err(e),
        }

        app.refreshed_at = Some(Utc::now());
        app.expires_at = profiles.iter().map(|profile| profile.expires_at).min();
        self.commit(&app).await?;
        Ok(app)
    }
}
