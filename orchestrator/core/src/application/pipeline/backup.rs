// Copyright (c) 2026 Sideload Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Backup: snapshot an active app's container without deactivating it.
//!
//! The placeholder has to stand in for the app while the container is
//! copied, so the real app is reinstalled from its cached bundle afterwards
//! whether or not the copy succeeded.
//!
//! A failed copy is the one terminal failure that still changes the
//! canonical record: the nested reinstall has already committed the freshly
//! signed app before the copy error is returned. `has_backup` is left as it
//! was.

use tracing::{info, warn};

use super::{InstallOptions, Pipeline};
use crate::domain::app::App;
use crate::domain::errors::LifecycleError;
use crate::domain::graph::Lane;
use crate::domain::progress::ProgressRef;

const PLACEHOLDER_WEIGHT: u64 = 30;
const BACKUP_WEIGHT: u64 = 20;
const REINSTALL_WEIGHT: u64 = 50;

impl Pipeline {
    pub(crate) async fn backup(&self, app: App, progress: &ProgressRef) -> Result<App, LifecycleError> {
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
        if let Err(e) = &backed_up {
            warn!(bundle_id = %app.bundle_id, error = %e, "Container backup failed, reinstalling app");
        }

        let mut placeholder_app = app;
        placeholder_app.placeholder_installed = true;
        let reinstall = progress.child(REINSTALL_WEIGHT, 100);
        let mut app = self
            .install(
                placeholder_app,
                InstallOptions::reinstall().without_room_check(),
                &reinstall,
            )
            .await?;

        backed_up?;

        app.has_backup = true;
        self.commit(&app).await?;
        info!(bundle_id = %app.bundle_id, "Backed up app");
        Ok(app)
    }
}
