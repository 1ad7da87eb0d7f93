// Copyright (c) 2026 Sideload Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Lifecycle Pipelines
//!
//! One async function per lifecycle kind, awaiting its steps in order. Every
//! step with an observable side effect runs as its own node in the batch's
//! [`ExecutionContext`], depending on the batch's authentication node and
//! placed on the pool or the serial lane.
//!
//! A pipeline works on a private copy of its [`App`] and commits it through
//! the [`AppRepository`] only at the end, while the orchestrator holds the
//! app's operation slot. Each pipeline's progress leaf has 100 units, split
//! between its steps by fixed weights.
//!
//! | Module | Kind |
//! |--------|------|
//! | [`install`] | Install, Update |
//! | [`refresh`] | Refresh (falls back to Install) |
//! | [`activate`] | Activate |
//! | [`deactivate`] | Deactivate |
//! | [`backup`] | Backup |
//! | [`restore`] | Restore |

pub mod activate;
pub mod backup;
pub mod deactivate;
pub mod install;
pub mod refresh;
pub mod restore;

use chrono::Utc;
use futures::future::{try_join_all, BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::application::authentication::Authenticator;
use crate::application::operation_slots::OperationSlots;
use crate::application::scheduler::ExecutionContext;
use crate::domain::app::{App, BundleId};
use crate::domain::bundle_store::{AppBundle, BundleStore};
use crate::domain::capacity::SlotManager;
use crate::domain::errors::{CapacityError, LifecycleError};
use crate::domain::events::LifecycleEvent;
use crate::domain::graph::{Lane, NodeId, NodeKind, NodeSpec};
use crate::domain::intent::{LifecycleIntent, OperationKind};
use crate::domain::progress::ProgressRef;
use crate::domain::prompt::CredentialPrompt;
use crate::domain::repository::AppRepository;
use crate::domain::session::{AuthenticatedSession, ProvisioningProfile};
use crate::domain::signing::{CodeSigningAuthority, SigningError};
use crate::domain::transport::DeviceTransport;
use crate::infrastructure::event_bus::EventBus;

pub use install::{BundleSource, InstallOptions};

/// Collaborators and shared state every pipeline of an orchestrator uses.
pub struct Services {
    pub transport: Arc<dyn DeviceTransport>,
    pub authority: Arc<dyn CodeSigningAuthority>,
    pub bundles: Arc<dyn BundleStore>,
    pub prompt: Arc<dyn CredentialPrompt>,
    pub repository: Arc<dyn AppRepository>,
    pub authenticator: Arc<Authenticator>,
    pub events: EventBus,
    pub slot_manager: SlotManager,
    pub slots: OperationSlots,
    pub host_bundle_id: BundleId,
    pub free_app_id_limit: usize,
}

type SessionFuture = Shared<BoxFuture<'static, Result<Arc<AuthenticatedSession>, LifecycleError>>>;

struct BatchSessionInner {
    node: NodeId,
    initial: SessionFuture,
    renewal: Mutex<Option<SessionFuture>>,
}

/// The authentication result of one batch, shared by all its pipelines.
#[derive(Clone)]
pub struct BatchSession {
    inner: Arc<BatchSessionInner>,
}

impl BatchSession {
    /// Submit the batch's single authentication node.
    pub fn start(
        context: &ExecutionContext,
        authenticator: Arc<Authenticator>,
        existing: Option<Arc<AuthenticatedSession>>,
    ) -> Result<Self, LifecycleError> {
        let (node, initial) = submit_authentication(context, authenticator, existing)?;
        Ok(Self {
            inner: Arc::new(BatchSessionInner {
                node,
                initial,
                renewal: Mutex::new(None),
            }),
        })
    }

    /// The authentication node every pipeline step depends on.
    pub fn node(&self) -> NodeId {
        self.inner.node
    }

    pub async fn current(&self) -> Result<Arc<AuthenticatedSession>, LifecycleError> {
        let renewal = self.inner.renewal.lock().clone();
        match renewal {
            Some(renewal) => renewal.await,
            None => self.inner.initial.clone().await,
        }
    }

    /// The latest session, if authentication already succeeded.
    pub fn peek(&self) -> Option<Arc<AuthenticatedSession>> {
        let renewal = self.inner.renewal.lock().clone();
        renewal
            .as_ref()
            .and_then(|renewal| renewal.peek().cloned())
            .or_else(|| self.inner.initial.peek().cloned())
            .and_then(Result::ok)
    }

    /// The current session, authenticating again first if it has expired.
    /// Concurrent callers share one renewal node.
    pub async fn fresh(
        &self,
        context: &ExecutionContext,
        authenticator: &Arc<Authenticator>,
    ) -> Result<Arc<AuthenticatedSession>, LifecycleError> {
        let session = self.current().await?;
        if !session.is_expired() {
            return Ok(session);
        }

        let renewal = {
            let mut renewal = self.inner.renewal.lock();
            let reusable = renewal.as_ref().filter(|pending| match pending.peek() {
                None => true,
                Some(Ok(renewed)) => !renewed.is_expired(),
                Some(Err(_)) => false,
            });
            match reusable {
                Some(pending) => pending.clone(),
                None => {
                    info!(team = %session.team.identifier, "Renewing expired session");
                    let (_, pending) = submit_authentication(context, authenticator.clone(), Some(session))?;
                    *renewal = Some(pending.clone());
                    pending
                }
            }
        };
        renewal.await
    }
}

fn submit_authentication(
    context: &ExecutionContext,
    authenticator: Arc<Authenticator>,
    existing: Option<Arc<AuthenticatedSession>>,
) -> Result<(NodeId, SessionFuture), LifecycleError> {
    let handle = context
        .submit(NodeSpec::pool("authenticate"), async move {
            authenticator.authenticate(existing).await
        })
        .map_err(|e| LifecycleError::Internal(e.to_string()))?;
    let node = handle.id();
    let future = async move { handle.join().await.and_then(|result| result) }
        .boxed()
        .shared();
    Ok((node, future))
}

/// One app's pipeline within a batch.
#[derive(Clone)]
pub struct Pipeline {
    services: Arc<Services>,
    context: ExecutionContext,
    session: BatchSession,
    kind: OperationKind,
    bundle_id: BundleId,
    app_name: String,
    is_host: bool,
}

impl Pipeline {
    pub fn new(
        services: Arc<Services>,
        context: ExecutionContext,
        session: BatchSession,
        app: &App,
        kind: OperationKind,
    ) -> Self {
        let is_host = app.bundle_id == services.host_bundle_id;
        Self {
            services,
            context,
            session,
            kind,
            bundle_id: app.bundle_id.clone(),
            app_name: app.name.clone(),
            is_host,
        }
    }

    /// A pipeline for another app in the same batch.
    fn for_app(&self, app: &App, kind: OperationKind) -> Self {
        Self::new(
            self.services.clone(),
            self.context.clone(),
            self.session.clone(),
            app,
            kind,
        )
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn is_host(&self) -> bool {
        self.is_host
    }

    /// Run the pipeline for `intent`. Returns the committed record.
    pub async fn execute(&self, intent: LifecycleIntent, progress: &ProgressRef) -> Result<App, LifecycleError> {
        debug!(bundle_id = %self.bundle_id, kind = %self.kind, "Starting pipeline");
        match intent {
            LifecycleIntent::Install(app) => self.install(app, InstallOptions::install(), progress).await,
            LifecycleIntent::Update(app, version) => self.install(app, InstallOptions::update(version), progress).await,
            LifecycleIntent::Refresh(app) => self.refresh(app, progress).await,
            LifecycleIntent::Activate(app) => self.activate(app, progress).await,
            LifecycleIntent::Deactivate(app) => self.deactivate(app, progress).await,
            LifecycleIntent::Backup(app) => self.backup(app, progress).await,
            LifecycleIntent::Restore(app) => self.restore(app, progress).await,
        }
    }

    /// Success event for a committed record. The host app publishes none.
    pub fn success_event(&self, app: &App) -> Option<LifecycleEvent> {
        if self.is_host && matches!(self.kind, OperationKind::Install | OperationKind::Update | OperationKind::Refresh) {
            return None;
        }
        let now = Utc::now();
        match self.kind {
            OperationKind::Install | OperationKind::Activate | OperationKind::Backup => Some(LifecycleEvent::AppInstalled {
                bundle_id: app.bundle_id.clone(),
                version: app.version.clone(),
                installed_at: now,
            }),
            OperationKind::Update => Some(LifecycleEvent::AppUpdated {
                bundle_id: app.bundle_id.clone(),
                version: app.version.clone(),
                updated_at: now,
            }),
            OperationKind::Refresh => Some(LifecycleEvent::AppRefreshed {
                bundle_id: app.bundle_id.clone(),
                expires_at: app.expires_at,
                refreshed_at: now,
            }),
            OperationKind::Deactivate => Some(LifecycleEvent::AppDeactivated {
                bundle_id: app.bundle_id.clone(),
                deactivated_at: now,
            }),
            OperationKind::Restore => None,
        }
    }

    fn ensure_active(&self, progress: &ProgressRef) -> Result<(), LifecycleError> {
        if progress.is_cancelled() || self.context.is_cancelled() {
            debug!(bundle_id = %self.bundle_id, kind = %self.kind, "Pipeline cancelled");
            return Err(LifecycleError::Cancelled);
        }
        Ok(())
    }

    fn spec(&self, step: &str, lane: Lane) -> NodeSpec {
        NodeSpec::new(format!("{} {}", step, self.bundle_id), lane).after(self.session.node())
    }

    /// `NodeSpec` for the step that replaces the app on device. For the host app
    /// this is the node that must run last.
    fn device_spec(&self, step: &str) -> NodeSpec {
        let kind = if self.is_host {
            NodeKind::HostReinstall
        } else {
            NodeKind::Regular
        };
        self.spec(step, Lane::Serial).with_kind(kind)
    }

    /// Run one step as a graph node, weighted `weight` units of `progress`.
    async fn step<T, F>(&self, progress: &ProgressRef, weight: u64, spec: NodeSpec, future: F) -> Result<T, LifecycleError>
    where
        F: Future<Output = Result<T, LifecycleError>> + Send + 'static,
        T: Send + 'static,
    {
        self.ensure_active(progress)?;
        let step_progress = progress.child(weight, 1);
        let cancellation = progress.clone();
        let result = self
            .context
            .run(spec, async move {
                if cancellation.is_cancelled() {
                    return Err(LifecycleError::Cancelled);
                }
                future.await
            })
            .await;
        if result.is_ok() {
            step_progress.complete();
        }
        result
    }

    /// Account for a step that has nothing to do.
    fn skip(&self, progress: &ProgressRef, weight: u64) {
        progress.child(weight, 1).complete();
    }

    async fn commit(&self, app: &App) -> Result<(), LifecycleError> {
        self.services.repository.save(app).await?;
        debug!(bundle_id = %app.bundle_id, active = app.is_active, "Committed app record");
        Ok(())
    }

    /// Free enough active slots for `app`, deactivating apps the user picks.
    /// Only free teams are limited.
    async fn make_room(
        &self,
        app: &App,
        session: &AuthenticatedSession,
        progress: &ProgressRef,
        weight: u64,
    ) -> Result<(), LifecycleError> {
        if !session.team.is_free() {
            self.skip(progress, weight);
            return Ok(());
        }

        let services = &self.services;
        let active = services.repository.list_active().await?;
        let plan = services.slot_manager.ensure_capacity(app, &active);
        if plan.fits() {
            self.skip(progress, weight);
            return Ok(());
        }

        let declined = || -> LifecycleError {
            CapacityError::Declined {
                app_name: app.name.clone(),
                required: plan.required,
                available: plan.available,
            }
            .into()
        };

        let candidates: Vec<App> = plan
            .candidates
            .iter()
            .filter(|candidate| !services.slots.is_held(&candidate.bundle_id))
            .cloned()
            .collect();
        if candidates.is_empty() {
            return Err(declined());
        }

        let chosen: Vec<App> = services
            .prompt
            .choose_apps_to_deactivate(app, &candidates, plan.deficit())
            .await
            .into_iter()
            .filter(|choice| candidates.iter().any(|c| c.bundle_id == choice.bundle_id))
            .collect();
        if services.slot_manager.freed_by(&chosen) < plan.deficit() {
            warn!(bundle_id = %app.bundle_id, deficit = plan.deficit(), "Not enough apps chosen to deactivate");
            return Err(declined());
        }

        let room = progress.child(weight, chosen.len() as u64);
        for candidate in chosen {
            self.ensure_active(progress)?;
            let candidate_progress = room.child(1, 100);
            let _slot = services
                .slots
                .try_acquire(&candidate.bundle_id, candidate_progress.clone())
                .ok_or_else(declined)?;

            info!(bundle_id = %candidate.bundle_id, for_app = %app.bundle_id, "Deactivating app to free a slot");
            let nested = self.for_app(&candidate, OperationKind::Deactivate);
            let deactivated = nested.deactivate(candidate, &candidate_progress).await?;
            if let Some(event) = nested.success_event(&deactivated) {
                services.events.publish(event);
            }
        }
        Ok(())
    }

    /// Install the backup placeholder under `app`'s bundle identifier.
    async fn install_placeholder(
        &self,
        app: &App,
        session: &Arc<AuthenticatedSession>,
        progress: &ProgressRef,
        weight: u64,
    ) -> Result<(), LifecycleError> {
        let placeholder_progress = progress.child(weight, 100);

        let signed = {
            let services = self.services.clone();
            let session = session.clone();
            let app = app.clone();
            self.step(
                &placeholder_progress,
                50,
                self.spec("prepare placeholder", Lane::Pool),
                async move {
                    let placeholder = services.bundles.placeholder_bundle(&app).await?;
                    let identifiers = vec![(app.bundle_id.clone(), app.name.clone())];
                    let profiles = fetch_profiles(&services, &session, &app.name, identifiers).await?;
                    let signed = services
                        .authority
                        .resign(&placeholder, &profiles, &session.certificate)
                        .await?;
                    Ok(signed)
                },
            )
            .await?
        };

        let services = self.services.clone();
        let endpoint = session.endpoint.clone();
        self.step(
            &placeholder_progress,
            50,
            self.spec("install placeholder", Lane::Serial),
            async move {
                let result = async {
                    let connection = services.transport.send(&signed, &endpoint).await?;
                    services.transport.install(&connection).await?;
                    Ok::<_, LifecycleError>(())
                }
                .await;
                discard(services.bundles.as_ref(), &signed).await;
                result
            },
        )
        .await
    }
}

/// FetchProvisioningProfiles: register any missing App IDs, then fetch one
/// profile per identifier, in order.
async fn fetch_profiles(
    services: &Services,
    session: &AuthenticatedSession,
    app_name: &str,
    identifiers: Vec<(BundleId, String)>,
) -> Result<Vec<ProvisioningProfile>, LifecycleError> {
    register_app_ids(services, session, app_name, &identifiers).await?;
    let requests = identifiers.iter().map(|(bundle_id, _)| {
        services
            .authority
            .fetch_provisioning_profile(bundle_id, &session.team, &session.api_session)
    });
    Ok(try_join_all(requests).await?)
}

/// Register every identifier the team does not know yet. Free teams are
/// checked against their App ID limit before anything is registered.
async fn register_app_ids(
    services: &Services,
    session: &AuthenticatedSession,
    app_name: &str,
    identifiers: &[(BundleId, String)],
) -> Result<(), LifecycleError> {
    let registered = services
        .authority
        .fetch_app_ids(&session.team, &session.api_session)
        .await?;
    let missing: Vec<&(BundleId, String)> = identifiers
        .iter()
        .filter(|(bundle_id, _)| {
            !registered
                .iter()
                .any(|app_id| app_id.bundle_id.as_str().eq_ignore_ascii_case(bundle_id.as_str()))
        })
        .collect();
    if missing.is_empty() {
        return Ok(());
    }

    let required = missing.len();
    let available = services.free_app_id_limit.saturating_sub(registered.len());
    let limit_reached = || -> LifecycleError {
        CapacityError::AppIdLimitReached {
            app_name: app_name.to_string(),
            required,
            available,
            next_expiration: registered.iter().filter_map(|app_id| app_id.expires_at).min(),
        }
        .into()
    };

    if session.team.is_free() && required > available {
        warn!(team = %session.team.identifier, required, available, "App ID limit reached");
        return Err(limit_reached());
    }

    for (bundle_id, name) in missing {
        match services
            .authority
            .add_app_id(name, bundle_id, &session.team, &session.api_session)
            .await
        {
            Ok(app_id) => info!(bundle_id = %app_id.bundle_id, "Registered App ID"),
            Err(SigningError::AppIdLimitReached) => return Err(limit_reached()),
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Remove a temporary bundle, logging rather than failing.
async fn discard(bundles: &dyn BundleStore, bundle: &AppBundle) {
    if let Err(e) = bundles.discard(bundle).await {
        warn!(bundle_id = %bundle.bundle_id, error = %e, "Failed to discard temporary bundle");
    }
}
