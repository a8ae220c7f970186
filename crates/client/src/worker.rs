//! The offline worker: one deploy version's event handlers.
//!
//! Events (`install`, `activate`, `fetch`, `sync`, `push`,
//! `notificationclick`) arrive from the host. Lifecycle events move the
//! persisted state machine; fetches are refused until the version is active.

use std::sync::Arc;

use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use url::Url;

use hero_core::push::{self, ClickOutcome, Notification};
use hero_core::{AppConfig, CacheDb, Error, PendingAction, PendingRequest, WorkerState};

use crate::event::Extended;
use crate::fetch::{Request, Transport, resolve};
use crate::interceptor::{FetchOutcome, NetworkFirst};
use crate::sync::{SyncReconciler, SyncReport, TransportReplay};

/// Result of an install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    pub cache_name: String,
    /// Manifest URLs now cached.
    pub cached: Vec<String>,
    /// Manifest URLs that could not be fetched; install went on without them.
    pub failed: Vec<String>,
    pub state: WorkerState,
}

/// Result of an activation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivateReport {
    pub cache_name: String,
    /// Caches of older versions that were deleted.
    pub deleted: Vec<String>,
}

pub struct OfflineWorker {
    config: AppConfig,
    db: CacheDb,
    transport: Arc<dyn Transport>,
    origin: Url,
    interceptor: NetworkFirst,
    reconciler: SyncReconciler,
    state: RwLock<WorkerState>,
    // serializes install and activate
    lifecycle: Mutex<()>,
}

impl OfflineWorker {
    /// Build the worker for `config.cache_version`, loading its persisted state.
    pub async fn new(config: AppConfig, db: CacheDb, transport: Arc<dyn Transport>) -> Result<Self, Error> {
        let origin = Url::parse(&config.app_origin).map_err(|e| Error::InvalidUrl(format!("app_origin: {e}")))?;
        let cache_name = config.cache_name();

        let interceptor =
            NetworkFirst::new(db.clone(), transport.clone(), cache_name, origin.clone(), config.same_origin_only);
        let reconciler = SyncReconciler::with_queues(
            db.clone(),
            &config.sync_queues,
            Arc::new(TransportReplay::new(transport.clone())),
        );
        let state = db.worker_state(&config.cache_version).await?;

        Ok(Self {
            config,
            db,
            transport,
            origin,
            interceptor,
            reconciler,
            state: RwLock::new(state),
            lifecycle: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn db(&self) -> &CacheDb {
        &self.db
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn reconciler(&self) -> &SyncReconciler {
        &self.reconciler
    }

    pub fn cache_name(&self) -> &str {
        self.interceptor.cache_name()
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    /// Resolve a path or URL against the app origin.
    pub fn resolve(&self, input: &str) -> Result<Url, Error> {
        resolve(input, &self.origin).map_err(|e| Error::InvalidUrl(e.to_string()))
    }

    async fn transition(&self, next: WorkerState) -> Result<(), Error> {
        self.db.set_worker_state(&self.config.cache_version, next).await?;
        let mut state = self.state.write().await;
        if *state != next {
            tracing::info!(version = %self.config.cache_version, from = %*state, to = %next, "worker state changed");
        }
        *state = next;
        Ok(())
    }

    /// Startup hook: finish whatever lifecycle steps this version still needs.
    ///
    /// Installs when never installed, interrupted mid-install, or superseded
    /// by another version and now deployed again. With `skip_waiting`,
    /// activates right away.
    pub async fn start(&self) -> Result<WorkerState, Error> {
        if matches!(
            self.state().await,
            WorkerState::Uninitialized | WorkerState::Installing | WorkerState::Superseded
        ) {
            self.install().await?;
        }
        if self.config.skip_waiting && self.state().await == WorkerState::Waiting {
            self.activate().await?;
        }
        Ok(self.state().await)
    }

    /// Pre-cache the install manifest into this version's cache.
    ///
    /// Manifest resources are fetched concurrently. One that cannot be
    /// fetched is logged and skipped; the rest are still cached.
    pub async fn install(&self) -> Result<InstallReport, Error> {
        let _guard = self.lifecycle.lock().await;
        let installing = self.state().await.begin_install()?;
        self.transition(installing).await?;

        let cache_name = self.cache_name().to_string();
        self.db.open_namespace(&cache_name).await?;

        let fetches = self.config.install_manifest.iter().map(|path| self.precache(&cache_name, path));
        let mut report =
            InstallReport { cache_name: cache_name.clone(), cached: Vec::new(), failed: Vec::new(), state: installing };
        for (url, cached) in join_all(fetches).await {
            if cached { report.cached.push(url) } else { report.failed.push(url) }
        }

        let next = installing.finish_install()?;
        self.transition(next).await?;
        report.state = next;

        tracing::info!(
            cache = %cache_name,
            cached = report.cached.len(),
            failed = report.failed.len(),
            "install finished"
        );
        Ok(report)
    }

    async fn precache(&self, cache_name: &str, path: &str) -> (String, bool) {
        let url = match self.resolve(path) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(error = %e, path, "skipping manifest entry");
                return (path.to_string(), false);
            }
        };

        let request = Request::get(url.clone());
        let response = match self.transport.send(&request).await {
            Ok(response) if response.is_success() => response,
            Ok(response) => {
                tracing::warn!(status = response.status, %url, "manifest resource not cached");
                return (url.to_string(), false);
            }
            Err(e) => {
                tracing::warn!(error = %e, %url, "manifest resource unreachable");
                return (url.to_string(), false);
            }
        };

        match self.db.put_entry(&response.to_entry(cache_name, &request)).await {
            Ok(()) => (url.to_string(), true),
            Err(e) => {
                tracing::warn!(error = %e, %url, "failed to store manifest resource");
                (url.to_string(), false)
            }
        }
    }

    /// Make this version the one serving fetches and delete every other cache.
    ///
    /// Runs once per deploy of a version; deferred action queues are kept.
    pub async fn activate(&self) -> Result<ActivateReport, Error> {
        let _guard = self.lifecycle.lock().await;
        let next = self.state().await.activate()?;

        let deleted = self.db.delete_namespaces_except(self.cache_name()).await?;
        for name in &deleted {
            tracing::info!(cache = %name, "deleted stale cache");
        }
        self.db.supersede_other_versions(&self.config.cache_version).await?;
        self.transition(next).await?;

        Ok(ActivateReport { cache_name: self.cache_name().to_string(), deleted })
    }

    /// Intercept a request.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotActive` until the version is activated.
    pub async fn fetch(&self, request: &Request) -> Result<Extended<FetchOutcome>, Error> {
        let state = self.state().await;
        if !state.serves_fetches() {
            return Err(Error::NotActive(state.to_string()));
        }
        Ok(self.interceptor.handle(request).await)
    }

    /// Defer a mutation that failed while offline.
    pub async fn enqueue(&self, tag: &str, request: &PendingRequest) -> Result<PendingAction, Error> {
        self.reconciler.enqueue(tag, request).await
    }

    /// Sync event for one tag.
    pub async fn sync(&self, tag: &str) -> Result<SyncReport, Error> {
        self.reconciler.reconcile(tag).await
    }

    /// Connectivity restored: reconcile every registered tag.
    pub async fn sync_registered(&self) -> Result<Vec<SyncReport>, Error> {
        self.reconciler.reconcile_registered().await
    }

    /// Push event.
    pub fn push(&self, payload: Option<&[u8]>) -> Notification {
        push::decode_push(payload, &self.config.app_name)
    }

    /// Notification click event.
    pub fn notification_click(&self, notification: &Notification, action: Option<&str>) -> ClickOutcome {
        push::route_click(notification, action, &self.config.dashboard_path)
    }
}
