// Copyright (c) 2026 Sideload Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Scripted fake collaborators shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use sideload_core::domain::anisette::{AnisetteError, AnisetteSource};
use sideload_core::domain::app::{App, BundleId, OsVersion};
use sideload_core::domain::bundle_store::{AppBundle, BundleStore, StorageError};
use sideload_core::domain::config::OrchestratorConfig;
use sideload_core::domain::errors::TransportError;
use sideload_core::domain::prompt::CredentialPrompt;
use sideload_core::domain::session::{
    Account, AnisetteData, ApiSession, AppId, AppleIdCredentials, Certificate, Endpoint, ProvisioningProfile, Team,
    TeamKind,
};
use sideload_core::domain::signing::{CodeSigningAuthority, SigningError};
use sideload_core::domain::transport::{Connection, DeviceTransport};
use sideload_core::infrastructure::key_store::InMemoryKeyStore;
use sideload_core::infrastructure::repositories::InMemoryAppRepository;
use sideload_core::{AppLifecycleOrchestrator, OrchestratorDependencies};

pub const HOST: &str = "com.sideload.orchestrator";

pub fn endpoint(is_preferred: bool, supports_profile_refresh: bool) -> Endpoint {
    Endpoint {
        identifier: "device-1".to_string(),
        device_name: "Test iPhone".to_string(),
        os_version: OsVersion::new(17, 4, 0),
        is_preferred,
        supports_profile_refresh,
    }
}

pub fn free_team(identifier: &str) -> Team {
    Team {
        identifier: identifier.to_string(),
        name: format!("Team {}", identifier),
        kind: TeamKind::Free,
    }
}

/// An app already installed and active, signed with `serial`.
pub fn active_app(bundle_id: &str, name: &str, serial: &str) -> App {
    let mut app = App::listing(bundle_id, name, "1.0");
    app.is_active = true;
    app.certificate_serial = Some(serial.to_string());
    app.installed_digest = Some(format!("digest-{}-1.0", bundle_id));
    app.refreshed_at = Some(Utc::now() - ChronoDuration::days(2));
    app
}

/// An app deactivated earlier: placeholder on device, container backed up.
pub fn inactive_app(bundle_id: &str, name: &str, serial: &str) -> App {
    let mut app = active_app(bundle_id, name, serial);
    app.is_active = false;
    app.placeholder_installed = true;
    app.has_backup = true;
    app
}

/// Pauses one fake call until the test releases it.
#[derive(Clone, Default)]
pub struct Gate {
    entered: Arc<Notify>,
    released: Arc<Notify>,
}

impl Gate {
    /// Wait until the held call has started.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.released.notify_one();
    }

    async fn pass(&self) {
        self.entered.notify_one();
        self.released.notified().await;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCall {
    Send { bundle_id: BundleId, placeholder: bool },
    Install { bundle_id: BundleId, placeholder: bool },
    RefreshProfiles(BundleId),
    RemoveProfiles(Vec<BundleId>),
    RemoveApp(BundleId),
    Backup(BundleId),
    Restore(BundleId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Installed {
    Real,
    Placeholder,
}

#[derive(Default)]
struct DeviceState {
    apps: HashMap<BundleId, Installed>,
    calls: Vec<DeviceCall>,
    in_flight: usize,
    max_in_flight: usize,
    refresh_unsupported: bool,
    fail_real_install: HashMap<BundleId, TransportError>,
    fail_backup: HashSet<BundleId>,
    missing: bool,
    holds: Vec<(DeviceCall, Gate)>,
}

/// A single device. Tracks what is installed under each bundle identifier
/// and every call it received.
pub struct FakeDevice {
    endpoint: Endpoint,
    state: Mutex<DeviceState>,
}

impl FakeDevice {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            state: Mutex::new(DeviceState::default()),
        }
    }

    pub fn with_installed(self, bundle_id: &str, installed: Installed) -> Self {
        self.state.lock().apps.insert(BundleId::new(bundle_id), installed);
        self
    }

    pub fn refresh_unsupported(&self) {
        self.state.lock().refresh_unsupported = true;
    }

    pub fn fail_real_install(&self, bundle_id: &str, error: TransportError) {
        self.state.lock().fail_real_install.insert(BundleId::new(bundle_id), error);
    }

    pub fn fail_backup(&self, bundle_id: &str) {
        self.state.lock().fail_backup.insert(BundleId::new(bundle_id));
    }

    pub fn go_missing(&self) {
        self.state.lock().missing = true;
    }

    /// Hold the next call equal to `call` until the returned gate is released.
    pub fn hold_on(&self, call: DeviceCall) -> Gate {
        let gate = Gate::default();
        self.state.lock().holds.push((call, gate.clone()));
        gate
    }

    pub fn installed(&self, bundle_id: &str) -> Option<Installed> {
        self.state.lock().apps.get(&BundleId::new(bundle_id)).copied()
    }

    pub fn calls(&self) -> Vec<DeviceCall> {
        self.state.lock().calls.clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.state.lock().max_in_flight
    }

    async fn enter(&self, call: DeviceCall) {
        let gate = {
            let mut state = self.state.lock();
            let held = state.holds.iter().position(|(held, _)| *held == call);
            state.calls.push(call);
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);
            held.map(|index| state.holds.remove(index).1)
        };
        if let Some(gate) = gate {
            gate.pass().await;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
        self.state.lock().in_flight -= 1;
    }
}

#[async_trait]
impl DeviceTransport for FakeDevice {
    async fn find_endpoint(&self) -> Result<Endpoint, TransportError> {
        if self.state.lock().missing {
            return Err(TransportError::DeviceNotFound);
        }
        Ok(self.endpoint.clone())
    }

    async fn send(&self, bundle: &AppBundle, endpoint: &Endpoint) -> Result<Connection, TransportError> {
        self.enter(DeviceCall::Send {
            bundle_id: bundle.bundle_id.clone(),
            placeholder: bundle.is_placeholder,
        })
        .await;
        Ok(Connection::new(endpoint.clone(), bundle))
    }

    async fn install(&self, connection: &Connection) -> Result<(), TransportError> {
        self.enter(DeviceCall::Install {
            bundle_id: connection.bundle_id.clone(),
            placeholder: connection.is_placeholder,
        })
        .await;
        let mut state = self.state.lock();
        if !connection.is_placeholder {
            if let Some(error) = state.fail_real_install.get(&connection.bundle_id) {
                return Err(error.clone());
            }
        }
        let installed = if connection.is_placeholder {
            Installed::Placeholder
        } else {
            Installed::Real
        };
        state.apps.insert(connection.bundle_id.clone(), installed);
        Ok(())
    }

    async fn refresh_profiles(
        &self,
        _endpoint: &Endpoint,
        bundle_id: &BundleId,
        _profiles: &[ProvisioningProfile],
    ) -> Result<(), TransportError> {
        self.enter(DeviceCall::RefreshProfiles(bundle_id.clone())).await;
        if self.state.lock().refresh_unsupported {
            return Err(TransportError::UnsupportedRequest);
        }
        Ok(())
    }

    async fn remove_profiles(&self, _endpoint: &Endpoint, bundle_ids: &[BundleId]) -> Result<(), TransportError> {
        self.enter(DeviceCall::RemoveProfiles(bundle_ids.to_vec())).await;
        Ok(())
    }

    async fn remove_app(&self, _endpoint: &Endpoint, bundle_id: &BundleId) -> Result<(), TransportError> {
        self.enter(DeviceCall::RemoveApp(bundle_id.clone())).await;
        self.state.lock().apps.remove(bundle_id);
        Ok(())
    }

    async fn backup_container(&self, _endpoint: &Endpoint, bundle_id: &BundleId) -> Result<(), TransportError> {
        self.enter(DeviceCall::Backup(bundle_id.clone())).await;
        if self.state.lock().fail_backup.contains(bundle_id) {
            return Err(TransportError::Failed("backup interrupted".to_string()));
        }
        Ok(())
    }

    async fn restore_container(&self, _endpoint: &Endpoint, bundle_id: &BundleId) -> Result<(), TransportError> {
        self.enter(DeviceCall::Restore(bundle_id.clone())).await;
        Ok(())
    }
}

#[derive(Default)]
struct AuthorityState {
    teams: Vec<Team>,
    certificates: Vec<Certificate>,
    revoked: Vec<String>,
    next_serial: usize,
    app_ids: Vec<AppId>,
}

/// Code-signing authority whose certificate list mirrors the real service:
/// listed certificates never carry a private key.
pub struct FakeAuthority {
    state: Mutex<AuthorityState>,
    authenticate_calls: AtomicUsize,
    session_ttl: ChronoDuration,
}

impl FakeAuthority {
    pub fn new(teams: Vec<Team>) -> Self {
        Self {
            state: Mutex::new(AuthorityState {
                teams,
                ..AuthorityState::default()
            }),
            authenticate_calls: AtomicUsize::new(0),
            session_ttl: ChronoDuration::hours(1),
        }
    }

    pub fn with_certificate(self, serial: &str, machine_name: &str) -> Self {
        self.state.lock().certificates.push(Certificate {
            serial_number: serial.to_string(),
            machine_name: Some(machine_name.to_string()),
            private_key: None,
        });
        self
    }

    /// Pre-register `count` unrelated App IDs. The first expires soonest.
    pub fn with_app_ids(self, count: usize) -> Self {
        {
            let mut state = self.state.lock();
            for i in 0..count {
                state.app_ids.push(AppId {
                    identifier: format!("APPID-R{}", i),
                    name: format!("Registered {}", i),
                    bundle_id: BundleId::new(format!("com.example.registered{}", i)),
                    expires_at: Some(Utc::now() + ChronoDuration::days(i as i64 + 1)),
                });
            }
        }
        self
    }

    pub fn with_app_id(self, bundle_id: &str) -> Self {
        self.state.lock().app_ids.push(AppId {
            identifier: format!("APPID-{}", bundle_id),
            name: bundle_id.to_string(),
            bundle_id: BundleId::new(bundle_id),
            expires_at: Some(Utc::now() + ChronoDuration::days(7)),
        });
        self
    }

    pub fn app_ids(&self) -> Vec<AppId> {
        self.state.lock().app_ids.clone()
    }

    pub fn earliest_app_id_expiration(&self) -> Option<chrono::DateTime<Utc>> {
        self.state.lock().app_ids.iter().filter_map(|app_id| app_id.expires_at).min()
    }

    pub fn authenticate_calls(&self) -> usize {
        self.authenticate_calls.load(Ordering::SeqCst)
    }

    pub fn revoked(&self) -> Vec<String> {
        self.state.lock().revoked.clone()
    }

    pub fn certificates(&self) -> Vec<Certificate> {
        self.state.lock().certificates.clone()
    }
}

#[async_trait]
impl CodeSigningAuthority for FakeAuthority {
    async fn authenticate(
        &self,
        credentials: &AppleIdCredentials,
        _anisette: &AnisetteData,
    ) -> Result<(Account, ApiSession), SigningError> {
        self.authenticate_calls.fetch_add(1, Ordering::SeqCst);
        if credentials.password != "correct horse" {
            return Err(SigningError::Unauthorized("incorrect password".to_string()));
        }
        Ok((
            Account {
                apple_id: credentials.apple_id.clone(),
                identifier: "account-1".to_string(),
            },
            ApiSession {
                token: "token".to_string(),
                expires_at: Utc::now() + self.session_ttl,
            },
        ))
    }

    async fn fetch_teams(&self, _account: &Account, _session: &ApiSession) -> Result<Vec<Team>, SigningError> {
        Ok(self.state.lock().teams.clone())
    }

    async fn fetch_certificates(&self, _team: &Team, _session: &ApiSession) -> Result<Vec<Certificate>, SigningError> {
        Ok(self.state.lock().certificates.clone())
    }

    async fn add_certificate(
        &self,
        _team: &Team,
        machine_name: &str,
        _session: &ApiSession,
    ) -> Result<Certificate, SigningError> {
        let mut state = self.state.lock();
        state.next_serial += 1;
        let serial = format!("CERT-{}", state.next_serial);
        state.certificates.push(Certificate {
            serial_number: serial.clone(),
            machine_name: Some(machine_name.to_string()),
            private_key: None,
        });
        Ok(Certificate {
            serial_number: serial,
            machine_name: Some(machine_name.to_string()),
            private_key: Some(vec![state.next_serial as u8; 4]),
        })
    }

    async fn revoke_certificate(
        &self,
        certificate: &Certificate,
        _team: &Team,
        _session: &ApiSession,
    ) -> Result<(), SigningError> {
        let mut state = self.state.lock();
        state
            .certificates
            .retain(|listed| listed.serial_number != certificate.serial_number);
        state.revoked.push(certificate.serial_number.clone());
        Ok(())
    }

    async fn fetch_app_ids(&self, _team: &Team, _session: &ApiSession) -> Result<Vec<AppId>, SigningError> {
        Ok(self.state.lock().app_ids.clone())
    }

    async fn add_app_id(
        &self,
        name: &str,
        bundle_id: &BundleId,
        _team: &Team,
        _session: &ApiSession,
    ) -> Result<AppId, SigningError> {
        let app_id = AppId {
            identifier: format!("APPID-{}", bundle_id),
            name: name.to_string(),
            bundle_id: bundle_id.clone(),
            expires_at: Some(Utc::now() + ChronoDuration::days(7)),
        };
        self.state.lock().app_ids.push(app_id.clone());
        Ok(app_id)
    }

    async fn fetch_provisioning_profile(
        &self,
        bundle_id: &BundleId,
        team: &Team,
        _session: &ApiSession,
    ) -> Result<ProvisioningProfile, SigningError> {
        Ok(ProvisioningProfile {
            bundle_id: bundle_id.clone(),
            team_identifier: team.identifier.clone(),
            entitlements: BTreeSet::new(),
            expires_at: Utc::now() + ChronoDuration::days(7),
        })
    }

    async fn resign(
        &self,
        bundle: &AppBundle,
        _profiles: &[ProvisioningProfile],
        certificate: &Certificate,
    ) -> Result<AppBundle, SigningError> {
        if !certificate.has_private_key() {
            return Err(SigningError::Service("certificate has no private key".to_string()));
        }
        let mut signed = bundle.clone();
        signed.path = bundle.path.with_extension("signed.ipa");
        Ok(signed)
    }
}

#[derive(Default)]
struct BundleState {
    cache: HashMap<BundleId, AppBundle>,
    downloads: Vec<BundleId>,
    active_downloads: HashMap<BundleId, usize>,
    max_same_bundle_downloads: usize,
    discarded: usize,
    deleted_backups: Vec<BundleId>,
    failing_downloads: HashSet<BundleId>,
    held_downloads: HashMap<BundleId, Gate>,
}

pub struct FakeBundleStore {
    state: Mutex<BundleState>,
    download_delay: Duration,
}

impl FakeBundleStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BundleState::default()),
            download_delay: Duration::from_millis(5),
        }
    }

    pub fn fail_download(&self, bundle_id: &str) {
        self.state.lock().failing_downloads.insert(BundleId::new(bundle_id));
    }

    /// Hold the next download of `bundle_id` until the returned gate is released.
    pub fn hold_download(&self, bundle_id: &str) -> Gate {
        let gate = Gate::default();
        self.state.lock().held_downloads.insert(BundleId::new(bundle_id), gate.clone());
        gate
    }

    pub fn cache_bundle_for(&self, app: &App) {
        let bundle = bundle_for(app, app.version.as_deref());
        self.state.lock().cache.insert(app.bundle_id.clone(), bundle);
    }

    pub fn is_cached(&self, bundle_id: &str) -> bool {
        self.state.lock().cache.contains_key(&BundleId::new(bundle_id))
    }

    pub fn downloads(&self) -> Vec<BundleId> {
        self.state.lock().downloads.clone()
    }

    pub fn max_same_bundle_downloads(&self) -> usize {
        self.state.lock().max_same_bundle_downloads
    }

    pub fn discarded(&self) -> usize {
        self.state.lock().discarded
    }

    pub fn deleted_backups(&self) -> Vec<BundleId> {
        self.state.lock().deleted_backups.clone()
    }
}

fn bundle_for(app: &App, version: Option<&str>) -> AppBundle {
    let version = version.or(app.version.as_deref()).unwrap_or("1.0").to_string();
    AppBundle {
        bundle_id: app.bundle_id.clone(),
        name: app.name.clone(),
        digest: format!("digest-{}-{}", app.bundle_id, version),
        version: Some(version),
        minimum_os_version: Some(OsVersion::new(14, 0, 0)),
        entitlements: BTreeSet::new(),
        extensions: app.extensions.clone(),
        requires_patch: false,
        is_placeholder: false,
        path: PathBuf::from(format!("/tmp/{}.ipa", app.bundle_id)),
    }
}

#[async_trait]
impl BundleStore for FakeBundleStore {
    async fn download(&self, app: &App, version: Option<&str>) -> Result<AppBundle, StorageError> {
        let gate = {
            let mut state = self.state.lock();
            if state.failing_downloads.contains(&app.bundle_id) {
                return Err(StorageError::Download(format!("{} is unavailable", app.bundle_id)));
            }
            state.downloads.push(app.bundle_id.clone());
            let active = state.active_downloads.entry(app.bundle_id.clone()).or_insert(0);
            *active += 1;
            let active = *active;
            state.max_same_bundle_downloads = state.max_same_bundle_downloads.max(active);
            state.held_downloads.remove(&app.bundle_id)
        };
        if let Some(gate) = gate {
            gate.pass().await;
        }
        tokio::time::sleep(self.download_delay).await;
        if let Some(active) = self.state.lock().active_downloads.get_mut(&app.bundle_id) {
            *active -= 1;
        }
        Ok(bundle_for(app, version))
    }

    async fn cached_bundle(&self, bundle_id: &BundleId) -> Result<Option<AppBundle>, StorageError> {
        Ok(self.state.lock().cache.get(bundle_id).cloned())
    }

    async fn cache(&self, bundle: &AppBundle) -> Result<(), StorageError> {
        self.state.lock().cache.insert(bundle.bundle_id.clone(), bundle.clone());
        Ok(())
    }

    async fn placeholder_bundle(&self, app: &App) -> Result<AppBundle, StorageError> {
        let mut bundle = bundle_for(app, Some("placeholder"));
        bundle.is_placeholder = true;
        bundle.extensions = Vec::new();
        Ok(bundle)
    }

    async fn patch(&self, bundle: AppBundle) -> Result<AppBundle, StorageError> {
        Ok(bundle)
    }

    async fn delete_backup(&self, bundle_id: &BundleId) -> Result<(), StorageError> {
        self.state.lock().deleted_backups.push(bundle_id.clone());
        Ok(())
    }

    async fn discard(&self, _bundle: &AppBundle) -> Result<(), StorageError> {
        self.state.lock().discarded += 1;
        Ok(())
    }
}

/// Prompt answering every question from a script.
pub struct FakePrompt {
    password: String,
    team_choice: Option<String>,
    deactivate: Mutex<Vec<BundleId>>,
    team_prompts: AtomicUsize,
    capacity_prompts: AtomicUsize,
}

impl FakePrompt {
    pub fn new() -> Self {
        Self {
            password: "correct horse".to_string(),
            team_choice: None,
            deactivate: Mutex::new(Vec::new()),
            team_prompts: AtomicUsize::new(0),
            capacity_prompts: AtomicUsize::new(0),
        }
    }

    pub fn with_password(mut self, password: &str) -> Self {
        self.password = password.to_string();
        self
    }

    pub fn choosing_team(mut self, identifier: &str) -> Self {
        self.team_choice = Some(identifier.to_string());
        self
    }

    pub fn deactivate_when_asked(&self, bundle_ids: &[&str]) {
        *self.deactivate.lock() = bundle_ids.iter().map(|id| BundleId::new(*id)).collect();
    }

    pub fn team_prompts(&self) -> usize {
        self.team_prompts.load(Ordering::SeqCst)
    }

    pub fn capacity_prompts(&self) -> usize {
        self.capacity_prompts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialPrompt for FakePrompt {
    async fn sign_in(&self) -> Option<AppleIdCredentials> {
        Some(AppleIdCredentials {
            apple_id: "dev@example.com".to_string(),
            password: self.password.clone(),
        })
    }

    async fn select_team(&self, teams: &[Team]) -> Option<Team> {
        self.team_prompts.fetch_add(1, Ordering::SeqCst);
        match &self.team_choice {
            Some(choice) => teams.iter().find(|team| &team.identifier == choice).cloned(),
            None => teams.first().cloned(),
        }
    }

    async fn review_permissions(&self, _app: &App, _new_entitlements: &BTreeSet<String>) -> bool {
        true
    }

    async fn choose_apps_to_deactivate(&self, _app: &App, candidates: &[App], _required_slots: usize) -> Vec<App> {
        self.capacity_prompts.fetch_add(1, Ordering::SeqCst);
        let chosen = self.deactivate.lock().clone();
        candidates
            .iter()
            .filter(|candidate| chosen.contains(&candidate.bundle_id))
            .cloned()
            .collect()
    }
}

pub struct FakeAnisette;

#[async_trait]
impl AnisetteSource for FakeAnisette {
    async fn request_anisette_data(&self) -> Result<AnisetteData, AnisetteError> {
        Ok(anisette_data())
    }

    async fn request_via_plugin(&self, _timeout: Duration) -> Result<AnisetteData, AnisetteError> {
        Ok(anisette_data())
    }
}

pub fn anisette_data() -> AnisetteData {
    AnisetteData {
        machine_id: "machine".to_string(),
        one_time_password: "otp".to_string(),
        local_user_id: "user".to_string(),
        generated_at: Utc::now(),
    }
}

/// A fully wired orchestrator over fakes.
pub struct Harness {
    pub orchestrator: AppLifecycleOrchestrator,
    pub device: Arc<FakeDevice>,
    pub authority: Arc<FakeAuthority>,
    pub bundles: Arc<FakeBundleStore>,
    pub prompt: Arc<FakePrompt>,
    pub repository: InMemoryAppRepository,
    pub key_store: InMemoryKeyStore,
}

pub struct HarnessBuilder {
    config: OrchestratorConfig,
    device: FakeDevice,
    authority: FakeAuthority,
    prompt: FakePrompt,
    apps: Vec<App>,
    key_store: InMemoryKeyStore,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            config: OrchestratorConfig::default(),
            device: FakeDevice::new(endpoint(true, true)),
            authority: FakeAuthority::new(vec![free_team("FREE1")]),
            prompt: FakePrompt::new(),
            apps: Vec::new(),
            key_store: InMemoryKeyStore::new(),
        }
    }

    pub fn config(mut self, f: impl FnOnce(&mut OrchestratorConfig)) -> Self {
        f(&mut self.config);
        self
    }

    pub fn device(mut self, device: FakeDevice) -> Self {
        self.device = device;
        self
    }

    pub fn authority(mut self, authority: FakeAuthority) -> Self {
        self.authority = authority;
        self
    }

    pub fn prompt(mut self, prompt: FakePrompt) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn key_store(mut self, key_store: InMemoryKeyStore) -> Self {
        self.key_store = key_store;
        self
    }

    pub fn apps(mut self, apps: impl IntoIterator<Item = App>) -> Self {
        self.apps.extend(apps);
        self
    }

    pub fn build(self) -> Harness {
        let device = Arc::new(self.device);
        let authority = Arc::new(self.authority);
        let bundles = Arc::new(FakeBundleStore::new());
        let prompt = Arc::new(self.prompt);
        let repository = InMemoryAppRepository::with_apps(self.apps);
        let key_store = self.key_store;

        let orchestrator = AppLifecycleOrchestrator::new(
            self.config,
            OrchestratorDependencies {
                transport: device.clone(),
                authority: authority.clone(),
                anisette: Arc::new(FakeAnisette),
                prompt: prompt.clone(),
                bundles: bundles.clone(),
                repository: Arc::new(repository.clone()),
                key_store: Arc::new(key_store.clone()),
            },
        );

        Harness {
            orchestrator,
            device,
            authority,
            bundles,
            prompt,
            repository,
            key_store,
        }
    }
}

impl Harness {
    pub fn stored(&self, bundle_id: &str) -> Option<App> {
        self.repository
            .all()
            .into_iter()
            .find(|app| app.bundle_id.as_str() == bundle_id)
    }
}
