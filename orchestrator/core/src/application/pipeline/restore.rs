// Copyright (c) 2026 Sideload Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Restore: put an app's backed-up container back in place.

use super::Pipeline;
use crate::domain::app::App;
use crate::domain::errors::LifecycleError;
use crate::domain::graph::Lane;
use crate::domain::progress::ProgressRef;

impl Pipeline {
    pub(crate) async fn restore(&self, mut app: App, progress: &ProgressRef) -> Result<App, LifecycleError> {
        let session = self.session.current().await?;

        let services = self.services.clone();
        let endpoint = session.endpoint.clone();
        let bundle_id = app.bundle_id.clone();
        self.step(progress, 100, self.spec("restore backup", Lane::Serial), async move {
            Ok(services.transport.restore_container(&endpoint, &bundle_id).await?)
        })
        .await?;

        app.is_active = true;
        app.placeholder_installed = false;
        self.commit(&app).await?;
        Ok(app)
    }
}
