// Copyright (c) 2026 Sideload Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Activate: bring an inactive app back from its container backup.
//!
//! DeactivateConflicts → InstallBackupPlaceholder → RestoreBackupFromDisk →
//! InstallRealApp (nested install sharing this batch's session) → Cleanup.
//!
//! If the nested install fails once the placeholder is on device, the
//! placeholder is removed before the original error is returned, so the
//! device is never left with a half-activated decoy.

use tracing::{error, info, warn};

use super::{InstallOptions, Pipeline};
use crate::domain::app::App;
use crate::domain::errors::LifecycleError;
use crate::domain::graph::Lane;
use crate::domain::progress::ProgressRef;
use crate::domain::session::Endpoint;

const DEACTIVATE_WEIGHT: u64 = 5;
const PLACEHOLDER_WEIGHT: u64 = 20;
const RESTORE_WEIGHT: u64 = 15;
const INSTALL_WEIGHT: u64 = 55;
const CLEANUP_WEIGHT: u64 = 5;

impl Pipeline {
    pub(crate) async fn activate(&self, app: App, progress: &ProgressRef) -> Result<App, LifecycleError> {
        let services = self.services.clone();
        let session = self.session.current().await?;

        self.make_room(&app, &session, progress, DEACTIVATE_WEIGHT).await?;

        self.install_placeholder(&app, &session, progress, PLACEHOLDER_WEIGHT)
            .await?;

        let restored = {
            let services = services.clone();
            let endpoint = session.endpoint.clone();
            let bundle_id = app.bundle_id.clone();
            self.step(progress, RESTORE_WEIGHT, self.spec("restore backup", Lane::Serial), async move {
                Ok(services.transport.restore_container(&endpoint, &bundle_id).await?)
            })
            .await
        };

        let installed = match restored {
            Ok(()) => {
                let mut placeholder_app = app.clone();
                placeholder_app.placeholder_installed = true;
                let install_progress = progress.child(INSTALL_WEIGHT, 100);
                self.install(
                    placeholder_app,
                    InstallOptions::reinstall().without_room_check(),
                    &install_progress,
                )
                .await
            }
            Err(e) => Err(e),
        };

        let mut app = match installed {
            Ok(app) => app,
            Err(e) => {
                self.remove_placeholder(&app, &session.endpoint, progress).await;
                return Err(e);
            }
        };

        let cleanup = {
            let services = services.clone();
            let bundle_id = app.bundle_id.clone();
            self.step(progress, CLEANUP_WEIGHT, self.spec("delete backup", Lane::Serial), async move {
                Ok(services.bundles.delete_backup(&bundle_id).await?)
            })
            .await
        };
        match cleanup {
            Ok(()) => {
                app.has_backup = false;
                self.commit(&app).await?;
            }
            Err(e) => warn!(bundle_id = %app.bundle_id, error = %e, "Failed to delete app backup"),
        }

        info!(bundle_id = %app.bundle_id, "Activated app");
        Ok(app)
    }

    /// Rollback for a failed activation. Runs even if the pipeline or its
    /// batch was cancelled.
    async fn remove_placeholder(&self, app: &App, endpoint: &Endpoint, progress: &ProgressRef) {
        let services = self.services.clone();
        let endpoint = endpoint.clone();
        let bundle_id = app.bundle_id.clone();
        let rollback = self
            .context
            .run_uncancellable(self.spec("remove placeholder", Lane::Serial), async move {
                Ok(services.transport.remove_app(&endpoint, &bundle_id).await?)
            })
            .await;

        match rollback {
            Ok(()) => info!(bundle_id = %app.bundle_id, "Removed backup placeholder after failed activation"),
            Err(e) => error!(
                bundle_id = %app.bundle_id,
                error = %e,
                cancelled = progress.is_cancelled(),
                "Failed to remove backup placeholder after failed activation"
            ),
        }
    }
}
