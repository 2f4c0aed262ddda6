//! Portal state container.
//!
//! `PortalState` owns every collaborator (identity provider, profile store,
//! device cache) and the services built on them. It is constructed once and
//! passed to whatever hosts the portal; there is no global instance.

use std::sync::{Arc, Mutex};

use crate::allocator::PatientIdAllocator;
use crate::authorization::check_patient_access;
use crate::config::PortalConfig;
use crate::error::PortalError;
use crate::identity::{IdentityStore, LocalIdentityStore};
use crate::models::{Action, PatientEntry, PatientId, PatientRecord, Profile, Report};
use crate::onboarding::Onboarding;
use crate::pipeline::{materialize, ReportArtifact, ReportIngestionPipeline, UploadedFile};
use crate::records::PatientDirectory;
use crate::session::{ListenerHandle, RouteDecision, RoutePolicy, SessionResolver, SessionState};
use crate::store::{LocalCache, MemoryProfileStore, ProfileStore, SqliteProfileStore};

// ═══════════════════════════════════════════════════════════
// PortalState
// ═══════════════════════════════════════════════════════════

pub struct PortalState {
    config: PortalConfig,
    identities: Arc<dyn IdentityStore>,
    store: Arc<dyn ProfileStore>,
    cache: Arc<LocalCache>,
    resolver: Arc<SessionResolver>,
    allocator: Arc<PatientIdAllocator>,
    pipeline: ReportIngestionPipeline,
    directory: PatientDirectory,
    onboarding: Onboarding,
    routes: RoutePolicy,
    /// Identity listener; at most one per container.
    listener: Mutex<Option<ListenerHandle>>,
}

impl PortalState {
    /// SQLite-backed store and file-backed device cache under `config.data_dir`.
    pub fn open(config: PortalConfig) -> Result<Self, PortalError> {
        let store = Arc::new(SqliteProfileStore::open(&config.store_db_path())?);
        let cache = Arc::new(LocalCache::open(&config.local_cache_path()));
        let identities = Arc::new(LocalIdentityStore::new(config.pbkdf2_iterations));
        tracing::info!(data_dir = %config.data_dir.display(), "Portal state opened");
        Ok(Self::with_parts(config, identities, store, cache))
    }

    /// Everything in memory, default configuration.
    pub fn in_memory() -> Self {
        Self::in_memory_with(PortalConfig::default())
    }

    pub fn in_memory_with(config: PortalConfig) -> Self {
        let identities = Arc::new(LocalIdentityStore::new(config.pbkdf2_iterations));
        Self::with_parts(
            config,
            identities,
            Arc::new(MemoryProfileStore::new()),
            Arc::new(LocalCache::in_memory()),
        )
    }

    pub fn with_parts(
        config: PortalConfig,
        identities: Arc<dyn IdentityStore>,
        store: Arc<dyn ProfileStore>,
        cache: Arc<LocalCache>,
    ) -> Self {
        let resolver = Arc::new(SessionResolver::new(store.clone()));
        let allocator = Arc::new(PatientIdAllocator::new(store.clone()));
        let pipeline = ReportIngestionPipeline::new(store.clone(), config.max_report_bytes);
        let directory = PatientDirectory::new(store.clone(), cache.clone());
        let onboarding = Onboarding::new(
            store.clone(),
            allocator.clone(),
            cache.clone(),
            resolver.clone(),
        );

        Self {
            config,
            identities,
            store,
            cache,
            resolver,
            allocator,
            pipeline,
            directory,
            onboarding,
            routes: RoutePolicy::default(),
            listener: Mutex::new(None),
        }
    }

    // ── Accessors ───────────────────────────────────────────

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    pub fn identities(&self) -> &Arc<dyn IdentityStore> {
        &self.identities
    }

    pub fn store(&self) -> &Arc<dyn ProfileStore> {
        &self.store
    }

    pub fn cache(&self) -> &LocalCache {
        &self.cache
    }

    pub fn resolver(&self) -> &Arc<SessionResolver> {
        &self.resolver
    }

    pub fn allocator(&self) -> &PatientIdAllocator {
        &self.allocator
    }

    pub fn onboarding(&self) -> &Onboarding {
        &self.onboarding
    }

    pub fn directory(&self) -> &PatientDirectory {
        &self.directory
    }

    pub fn session_state(&self) -> SessionState {
        self.resolver.state()
    }

    // ── Session lifecycle ───────────────────────────────────

    /// Start following the identity provider. Idempotent.
    pub fn start(&self) -> Result<(), PortalError> {
        let mut slot = self.listener.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_none() {
            *slot = Some(self.resolver.listen(self.identities.as_ref())?);
        }
        Ok(())
    }

    /// Stop following the identity provider and wait for the listener.
    pub async fn stop(&self) {
        let handle = self.listener.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            handle.shutdown().await;
        }
    }

    /// Routing decision for `path` under the current session.
    pub fn route(&self, path: &str) -> RouteDecision {
        self.routes.decide(&self.resolver.state(), path)
    }

    // ── Portal actions ──────────────────────────────────────

    /// Upload a report as the signed-in user.
    pub async fn upload_report(
        &self,
        patient_id: &PatientId,
        file: Option<UploadedFile>,
        title: &str,
        summary: &str,
    ) -> Result<Report, PortalError> {
        let profile = self.signed_in_profile()?;
        self.pipeline
            .ingest(patient_id, file, title, summary, profile.role())
            .await
    }

    pub async fn list_patients(&self) -> Result<Vec<PatientEntry>, PortalError> {
        let profile = self.signed_in_profile()?;
        self.directory.list(profile.role()).await
    }

    pub async fn view_patient(&self, patient_id: &PatientId) -> Result<PatientRecord, PortalError> {
        let profile = self.authorize(Action::ViewPatient, patient_id)?;
        tracing::debug!(role = %profile.role(), patient_id = %patient_id, "Viewing patient");
        self.directory.fetch(patient_id).await
    }

    /// Materialize the `index`-th report (upload order) of a patient.
    pub async fn download_report(
        &self,
        patient_id: &PatientId,
        index: usize,
    ) -> Result<ReportArtifact, PortalError> {
        self.authorize(Action::DownloadReport, patient_id)?;
        let reports = self.directory.reports(patient_id).await?;
        let report = reports.get(index).ok_or_else(|| {
            PortalError::NotFound(format!("report {index} of patient {patient_id}"))
        })?;
        materialize(report)
    }

    fn signed_in_profile(&self) -> Result<Profile, PortalError> {
        self.resolver.state().profile().ok_or_else(|| {
            PortalError::PermissionDenied("sign in with a completed profile first".into())
        })
    }

    fn authorize(&self, action: Action, patient_id: &PatientId) -> Result<Profile, PortalError> {
        let profile = self.signed_in_profile()?;
        check_patient_access(&profile, action, patient_id).require(profile.role(), action)?;
        Ok(profile)
    }
}
