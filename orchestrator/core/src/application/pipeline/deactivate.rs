// Copyright (c) 2026 Sideload Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Deactivate: swap an active app for its backup placeholder.
//!
//! InstallBackupPlaceholder → BackupContainer → RemoveApp. A failed
//! container backup is logged and the app is still deactivated; its old
//! backup, if any, stays usable.

use tracing::{info, warn};

use super::Pipeline;
use crate::domain::app::App;
use crate::domain::errors::LifecycleError;
use crate::domain::graph::Lane;
use crate::domain::progress::ProgressRef;

const PLACEHOLDER_WEIGHT: u64 = 40;
const BACKUP_WEIGHT: u64 = 30;
const REMOVE_WEIGHT: u64 = 30;

impl Pipeline {
    pub(crate) async fn deactivate(&self, mut app: App, progress: &ProgressRef) -> Result<App, LifecycleError> {
        let services = self.services.clone();
        let session = self.session.fresh(&self.context, &services.authenticator).await?;

        self.install_placeholder(&app, &session, progress, PLACEHOLDER_WEIGHT)
            .await?;

        let backed_up = {
            let services = services.clone();
            let endpoint = session.endpoint.clone();
            let bundle_id = app.bundle_id.clone();
            self.step(progress, BACKUP_WEIGHT, self.spec("backup", Lane::Serial), async move {
                Ok(services.transport.backup_container(&endpoint, &bundle_id).await?)
            })
            .await
        };
        let backup_ok = match backed_up {
            Ok(()) => true,
            Err(LifecycleError::Cancelled) => return Err(LifecycleError::Cancelled),
            Err(e) => {
                warn!(bundle_id = %app.bundle_id, error = %e, "Container backup failed, deactivating anyway");
                false
            }
        };

        {
            let services = services.clone();
            let endpoint = session.endpoint.clone();
            let bundle_ids = app.profile_bundle_ids();
            self.step(progress, REMOVE_WEIGHT, self.spec("remove app", Lane::Serial), async move {
                Ok(services.transport.remove_profiles(&endpoint, &bundle_ids).await?)
            })
            .await?;
        }

        app.is_active = false;
        app.placeholder_installed = true;
        app.has_backup = backup_ok || app.has_backup;
        self.commit(&app).await?;

        info!(bundle_id = %app.bundle_id, backed_up = backup_ok, "Deactivated app");
        Ok(app)
    }
}
