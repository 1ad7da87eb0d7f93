// Copyright (c) 2026 Sideload Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # App Lifecycle Orchestrator
//!
//! Entry point for callers. An [`AppLifecycleOrchestrator`] is constructed
//! explicitly from an [`OrchestratorConfig`] and its collaborators; it owns
//! the scheduler lanes, the per-bundle operation slots, the event bus and a
//! cache of the last authenticated session.
//!
//! [`AppLifecycleOrchestrator::submit`] turns a batch of intents into one
//! authentication node plus one pipeline task per intent and returns a
//! [`BatchHandle`]. Each task:
//!
//! 1. waits for its app's [`OperationSlot`](crate::application::operation_slots::OperationSlot),
//! 2. runs the pipeline for its intent,
//! 3. publishes the success or failure event,
//! 4. releases the slot and hands its result to the batch aggregator.
//!
//! Pipelines for the host app start only after every other pipeline of the
//! batch has finished, so its own reinstall is the last device step.

use chrono::Utc;
use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::application::anisette::AnisetteProvider;
use crate::application::authentication::Authenticator;
use crate::application::certificate_broker::CertificateBroker;
use crate::application::operation_slots::OperationSlots;
use crate::application::pipeline::{BatchSession, Pipeline, Services};
use crate::application::refresh_group::{BatchId, BatchReport, LifecycleResult, ResultAggregator};
use crate::application::scheduler::{ExecutionContext, Scheduler};
use crate::domain::anisette::AnisetteSource;
use crate::domain::app::{App, BundleId};
use crate::domain::bundle_store::BundleStore;
use crate::domain::capacity::SlotManager;
use crate::domain::config::OrchestratorConfig;
use crate::domain::errors::{LifecycleError, OperationFailure};
use crate::domain::events::LifecycleEvent;
use crate::domain::intent::LifecycleIntent;
use crate::domain::progress::{ProgressHandle, ProgressRef};
use crate::domain::prompt::CredentialPrompt;
use crate::domain::repository::AppRepository;
use crate::domain::session::AuthenticatedSession;
use crate::domain::signing::{CodeSigningAuthority, KeyStore};
use crate::domain::transport::DeviceTransport;
use crate::infrastructure::event_bus::{AppEventReceiver, EventBus, EventReceiver};

/// External collaborators the orchestrator drives.
#[derive(Clone)]
pub struct OrchestratorDependencies {
    pub transport: Arc<dyn DeviceTransport>,
    pub authority: Arc<dyn CodeSigningAuthority>,
    pub anisette: Arc<dyn AnisetteSource>,
    pub prompt: Arc<dyn CredentialPrompt>,
    pub bundles: Arc<dyn BundleStore>,
    pub repository: Arc<dyn AppRepository>,
    pub key_store: Arc<dyn KeyStore>,
}

/// Per-batch options for [`AppLifecycleOrchestrator::submit`].
#[derive(Clone, Default)]
pub struct SubmitOptions {
    /// Session to reuse. Falls back to the orchestrator's cached session.
    pub session: Option<Arc<AuthenticatedSession>>,
    /// Context to schedule into. A fresh context is created when `None`.
    /// Cancelling a batch cancels its whole context.
    pub context: Option<ExecutionContext>,
}

impl SubmitOptions {
    pub fn with_session(mut self, session: Arc<AuthenticatedSession>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_context(mut self, context: ExecutionContext) -> Self {
        self.context = Some(context);
        self
    }
}

type SiblingsDone = Shared<BoxFuture<'static, ()>>;

pub struct AppLifecycleOrchestrator {
    config: OrchestratorConfig,
    services: Arc<Services>,
    scheduler: Scheduler,
    session_cache: Arc<Mutex<Option<Arc<AuthenticatedSession>>>>,
}

impl AppLifecycleOrchestrator {
    pub fn new(config: OrchestratorConfig, dependencies: OrchestratorDependencies) -> Self {
        let anisette = AnisetteProvider::new(dependencies.anisette.clone(), config.anisette_plugin_timeout());
        let broker = CertificateBroker::new(
            dependencies.authority.clone(),
            dependencies.key_store.clone(),
            config.certificate_machine_name.clone(),
        );
        let authenticator = Arc::new(Authenticator::new(
            dependencies.transport.clone(),
            dependencies.authority.clone(),
            dependencies.prompt.clone(),
            dependencies.key_store.clone(),
            anisette,
            broker,
        ));

        let host_bundle_id = config.host_bundle_id();
        let services = Arc::new(Services {
            transport: dependencies.transport,
            authority: dependencies.authority,
            bundles: dependencies.bundles,
            prompt: dependencies.prompt,
            repository: dependencies.repository,
            authenticator,
            events: EventBus::new(config.event_bus_capacity),
            slot_manager: SlotManager::new(config.slot_policy(), host_bundle_id.clone()),
            slots: OperationSlots::new(),
            host_bundle_id,
            free_app_id_limit: config.free_app_id_limit,
        });

        info!(
            max_concurrent_operations = config.max_concurrent_operations,
            active_app_limit = ?config.active_app_limit,
            "Lifecycle orchestrator created"
        );

        Self {
            scheduler: Scheduler::new(config.max_concurrent_operations),
            config,
            services,
            session_cache: Arc::new(Mutex::new(None)),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// A new context on this orchestrator's lanes, for callers that want to
    /// share one context between batches.
    pub fn new_context(&self) -> ExecutionContext {
        self.scheduler.context()
    }

    pub fn events(&self) -> &EventBus {
        &self.services.events
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.services.events.subscribe()
    }

    pub fn subscribe_app(&self, bundle_id: BundleId) -> AppEventReceiver {
        self.services.events.subscribe_app(bundle_id)
    }

    /// The last session a batch authenticated with.
    pub fn cached_session(&self) -> Option<Arc<AuthenticatedSession>> {
        self.session_cache.lock().clone()
    }

    pub fn clear_cached_session(&self) {
        self.session_cache.lock().take();
    }

    /// Progress of the pipeline currently holding `bundle_id`'s slot.
    pub fn progress_for(&self, bundle_id: &BundleId) -> Option<ProgressRef> {
        self.services.slots.progress_for(bundle_id)
    }

    /// Cancel the pipeline currently holding `bundle_id`'s slot. Returns
    /// `false` if no pipeline holds it.
    pub fn cancel(&self, bundle_id: &BundleId) -> bool {
        match self.progress_for(bundle_id) {
            Some(progress) => {
                info!(bundle_id = %bundle_id, "Cancelling app operation");
                progress.cancel();
                true
            }
            None => false,
        }
    }

    /// Authenticate outside of any batch, reusing `existing` if unexpired.
    pub async fn authenticate(
        &self,
        existing: Option<Arc<AuthenticatedSession>>,
    ) -> Result<Arc<AuthenticatedSession>, LifecycleError> {
        let existing = existing.or_else(|| self.cached_session());
        let session = self.services.authenticator.authenticate(existing).await?;
        *self.session_cache.lock() = Some(session.clone());
        Ok(session)
    }

    /// Schedule a batch of intents sharing one authentication.
    pub fn submit(
        &self,
        intents: Vec<LifecycleIntent>,
        options: SubmitOptions,
    ) -> Result<BatchHandle, LifecycleError> {
        let batch_id = BatchId::new();
        let context = options.context.unwrap_or_else(|| self.scheduler.context());
        // One arena per batch; it is freed with the batch's last progress reference.
        let root = ProgressHandle::new().root(intents.len() as u64);

        let bundle_ids: Vec<BundleId> = intents.iter().map(|intent| intent.bundle_id().clone()).collect();
        let (aggregator, report) = ResultAggregator::new(batch_id, &bundle_ids);
        let aggregator = Arc::new(aggregator);

        if intents.is_empty() {
            return Ok(BatchHandle {
                id: batch_id,
                progress: root,
                context,
                session: None,
                report,
            });
        }

        let existing = options.session.or_else(|| self.cached_session());
        let session = BatchSession::start(&context, self.services.authenticator.clone(), existing)?;

        info!(batch_id = %batch_id, intents = intents.len(), "Submitting lifecycle batch");

        let (host, others): (Vec<_>, Vec<_>) = intents
            .into_iter()
            .partition(|intent| *intent.bundle_id() == self.services.host_bundle_id);

        let mut finished = Vec::with_capacity(others.len());
        for intent in others {
            let (done, done_rx) = oneshot::channel::<()>();
            finished.push(done_rx);
            self.spawn_pipeline(batch_id, intent, &context, &session, &root, &aggregator, None, Some(done));
        }

        if !host.is_empty() {
            let siblings: SiblingsDone = join_all(finished).map(|_| ()).boxed().shared();
            for intent in host {
                self.spawn_pipeline(
                    batch_id,
                    intent,
                    &context,
                    &session,
                    &root,
                    &aggregator,
                    Some(siblings.clone()),
                    None,
                );
            }
        }

        Ok(BatchHandle {
            id: batch_id,
            progress: root,
            context,
            session: Some(session),
            report,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn spawn_pipeline(
        &self,
        batch_id: BatchId,
        intent: LifecycleIntent,
        context: &ExecutionContext,
        session: &BatchSession,
        root: &ProgressRef,
        aggregator: &Arc<ResultAggregator>,
        siblings: Option<SiblingsDone>,
        done: Option<oneshot::Sender<()>>,
    ) {
        let pipeline = Pipeline::new(
            self.services.clone(),
            context.clone(),
            session.clone(),
            intent.app(),
            intent.kind(),
        );
        let job = PipelineJob {
            batch_id,
            services: self.services.clone(),
            pipeline,
            intent,
            progress: root.child(1, 100),
            session: session.clone(),
            session_cache: self.session_cache.clone(),
            cancel: context.cancellation_token(),
            aggregator: aggregator.clone(),
            siblings,
            _done: done,
        };
        tokio::spawn(job.run());
    }

    async fn submit_one(&self, intent: LifecycleIntent) -> Result<App, OperationFailure> {
        let bundle_id = intent.bundle_id().clone();
        let kind = intent.kind();
        let app_name = intent.app().name.clone();
        let failure = |error: LifecycleError| OperationFailure::new(kind, bundle_id.clone(), app_name.clone(), error);

        let report = self
            .submit(vec![intent], SubmitOptions::default())
            .map_err(&failure)?
            .wait()
            .await
            .map_err(&failure)?;
        match report.results.get(&bundle_id) {
            Some(result) => result.clone(),
            None => Err(failure(LifecycleError::Internal("batch finished without a result".to_string()))),
        }
    }

    pub async fn install(&self, app: App) -> Result<App, OperationFailure> {
        self.submit_one(LifecycleIntent::Install(app)).await
    }

    pub async fn update(&self, app: App, version: Option<String>) -> Result<App, OperationFailure> {
        self.submit_one(LifecycleIntent::Update(app, version)).await
    }

    pub async fn refresh(&self, app: App) -> Result<App, OperationFailure> {
        self.submit_one(LifecycleIntent::Refresh(app)).await
    }

    /// Refresh several apps in one batch.
    pub async fn refresh_all(&self, apps: Vec<App>) -> Result<BatchReport, LifecycleError> {
        let intents = apps.into_iter().map(LifecycleIntent::Refresh).collect();
        self.submit(intents, SubmitOptions::default())?.wait().await
    }

    pub async fn activate(&self, app: App) -> Result<App, OperationFailure> {
        self.submit_one(LifecycleIntent::Activate(app)).await
    }

    pub async fn deactivate(&self, app: App) -> Result<App, OperationFailure> {
        self.submit_one(LifecycleIntent::Deactivate(app)).await
    }

    pub async fn backup(&self, app: App) -> Result<App, OperationFailure> {
        self.submit_one(LifecycleIntent::Backup(app)).await
    }

    pub async fn restore(&self, app: App) -> Result<App, OperationFailure> {
        self.submit_one(LifecycleIntent::Restore(app)).await
    }
}

/// Handle to a submitted batch.
pub struct BatchHandle {
    id: BatchId,
    progress: ProgressRef,
    context: ExecutionContext,
    session: Option<BatchSession>,
    report: oneshot::Receiver<BatchReport>,
}

impl BatchHandle {
    pub fn id(&self) -> BatchId {
        self.id
    }

    /// Root progress of the batch, one equally weighted child per intent.
    pub fn progress(&self) -> &ProgressRef {
        &self.progress
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// The batch's session once authentication has succeeded.
    pub fn session(&self) -> Option<Arc<AuthenticatedSession>> {
        self.session.as_ref().and_then(BatchSession::peek)
    }

    /// Cancel every pipeline of the batch. Nodes already running finish;
    /// nothing new starts.
    pub fn cancel(&self) {
        info!(batch_id = %self.id, "Cancelling lifecycle batch");
        self.progress.cancel();
        self.context.cancel();
    }

    /// Wait for every intent's terminal result.
    pub async fn wait(self) -> Result<BatchReport, LifecycleError> {
        self.report
            .await
            .map_err(|_| LifecycleError::Internal(format!("batch {} dropped before completing", self.id)))
    }
}

struct PipelineJob {
    batch_id: BatchId,
    services: Arc<Services>,
    pipeline: Pipeline,
    intent: LifecycleIntent,
    progress: ProgressRef,
    session: BatchSession,
    session_cache: Arc<Mutex<Option<Arc<AuthenticatedSession>>>>,
    cancel: CancellationToken,
    aggregator: Arc<ResultAggregator>,
    siblings: Option<SiblingsDone>,
    /// Dropped when this job ends, releasing any host pipeline waiting on it.
    _done: Option<oneshot::Sender<()>>,
}

impl PipelineJob {
    async fn run(self) {
        let bundle_id = self.intent.bundle_id().clone();
        let kind = self.intent.kind();
        let app_name = self.intent.app().name.clone();

        if let Some(siblings) = self.siblings.clone() {
            debug!(batch_id = %self.batch_id, bundle_id = %bundle_id, "Host pipeline waiting for sibling pipelines");
            siblings.await;
        }

        let result = self.execute(&bundle_id).await;

        let outcome: LifecycleResult = match result {
            Ok(app) => {
                if let Some(event) = self.pipeline.success_event(&app) {
                    self.services.events.publish(event);
                }
                self.progress.complete();
                info!(batch_id = %self.batch_id, bundle_id = %bundle_id, kind = %kind, "Lifecycle operation succeeded");
                Ok(app)
            }
            Err(error) => {
                let preferred = self
                    .session
                    .peek()
                    .map_or(true, |session| session.endpoint.is_preferred);
                let error = error.soften_for_endpoint(preferred);
                if error.is_batch_fatal() {
                    self.aggregator.set_batch_error(error.clone());
                }

                let failure = OperationFailure::new(kind, bundle_id.clone(), app_name, error);
                if failure.error == LifecycleError::Cancelled {
                    warn!(batch_id = %self.batch_id, bundle_id = %bundle_id, "{}", failure);
                } else {
                    error!(batch_id = %self.batch_id, bundle_id = %bundle_id, error = %failure.error, "{}", failure.title());
                }
                self.services.events.publish(LifecycleEvent::OperationFailed {
                    bundle_id: bundle_id.clone(),
                    kind,
                    title: failure.title(),
                    message: failure.error.to_string(),
                    failed_at: Utc::now(),
                });
                Err(failure)
            }
        };

        if let Some(session) = self.session.peek() {
            *self.session_cache.lock() = Some(session);
        }
        self.aggregator.set(bundle_id, outcome);
    }

    /// Hold the slot for the whole pipeline run.
    async fn execute(&self, bundle_id: &BundleId) -> Result<App, LifecycleError> {
        let slot = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(LifecycleError::Cancelled),
            slot = self.services.slots.acquire(bundle_id, self.progress.clone()) => slot,
        };
        let result = self.pipeline.execute(self.intent.clone(), &self.progress).await;
        drop(slot);
        result
    }
}
