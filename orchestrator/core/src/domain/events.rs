// Copyright (c) 2026 Sideload Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::app::BundleId;
use crate::domain::intent::OperationKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LifecycleEvent {
    AppInstalled {
        bundle_id: BundleId,
        version: Option<String>,
        installed_at: DateTime<Utc>,
    },
    AppUpdated {
        bundle_id: BundleId,
        version: Option<String>,
        updated_at: DateTime<Utc>,
    },
    AppRefreshed {
        bundle_id: BundleId,
        expires_at: Option<DateTime<Utc>>,
        refreshed_at: DateTime<Utc>,
    },
    AppDeactivated {
        bundle_id: BundleId,
        deactivated_at: DateTime<Utc>,
    },
    OperationFailed {
        bundle_id: BundleId,
        kind: OperationKind,
        title: String,
        message: String,
        failed_at: DateTime<Utc>,
    },
}

impl LifecycleEvent {
    pub fn bundle_id(&self) -> &BundleId {
        match self {
            LifecycleEvent::AppInstalled { bundle_id, .. }
            | LifecycleEvent::AppUpdated { bundle_id, .. }
            | LifecycleEvent::AppRefreshed { bundle_id, .. }
            | LifecycleEvent::AppDeactivated { bundle_id, .. }
            | LifecycleEvent::OperationFailed { bundle_id, .. } => bundle_id,
        }
    }
}
