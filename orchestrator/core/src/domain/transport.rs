// Copyright (c) 2026 Sideload Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Device Transport Port
//!
//! The single physical channel to the target device. Every call that reaches
//! the device runs on the scheduler's serial lane, so implementations never
//! see two requests interleave.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::app::BundleId;
use crate::domain::bundle_store::AppBundle;
use crate::domain::errors::TransportError;
use crate::domain::session::{Endpoint, ProvisioningProfile};

/// An open upload of one bundle to an endpoint, consumed by
/// [`DeviceTransport::install`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub id: Uuid,
    pub endpoint: Endpoint,
    pub bundle_id: BundleId,
    /// The transferred bundle is a backup placeholder.
    pub is_placeholder: bool,
}

impl Connection {
    pub fn new(endpoint: Endpoint, bundle: &AppBundle) -> Self {
        Self {
            id: Uuid::new_v4(),
            endpoint,
            bundle_id: bundle.bundle_id.clone(),
            is_placeholder: bundle.is_placeholder,
        }
    }
}

#[async_trait]
pub trait DeviceTransport: Send + Sync {
    /// Discover a reachable endpoint.
    async fn find_endpoint(&self) -> Result<Endpoint, TransportError>;

    /// Transfer a signed bundle to the endpoint.
    async fn send(&self, bundle: &AppBundle, endpoint: &Endpoint) -> Result<Connection, TransportError>;

    /// Install the bundle previously transferred over `connection`.
    async fn install(&self, connection: &Connection) -> Result<(), TransportError>;

    /// Replace provisioning profiles in place. Endpoints that cannot do this
    /// answer [`TransportError::UnsupportedRequest`].
    async fn refresh_profiles(
        &self,
        endpoint: &Endpoint,
        bundle_id: &BundleId,
        profiles: &[ProvisioningProfile],
    ) -> Result<(), TransportError>;

    /// Remove the provisioning profiles of the given bundles, leaving the
    /// installed binary (usually a backup placeholder) in place.
    async fn remove_profiles(&self, endpoint: &Endpoint, bundle_ids: &[BundleId]) -> Result<(), TransportError>;

    /// Remove whatever app is installed under `bundle_id`.
    async fn remove_app(&self, endpoint: &Endpoint, bundle_id: &BundleId) -> Result<(), TransportError>;

    /// Copy the app's data container to disk through the installed placeholder.
    async fn backup_container(&self, endpoint: &Endpoint, bundle_id: &BundleId) -> Result<(), TransportError>;

    /// Copy a previously backed-up data container into the installed app.
    async fn restore_container(&self, endpoint: &Endpoint, bundle_id: &BundleId) -> Result<(), TransportError>;
}
