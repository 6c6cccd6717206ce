//! # Promotion System Bootstrap
//!
//! Builds the collaborators named by the loaded configuration and wires them
//! into a [`PromotionContext`]:
//!
//! - status and batch store: in-memory or PostgreSQL
//! - storage: the drive HTTP client
//! - dispatch: in-process tasks (`local`) or OpenWhisk actions (`openwhisk`)
//!
//! In local mode the pipeline's own stages are registered with the in-process
//! dispatcher, so one process runs the whole job and can wait for it to drain.

use super::actions::register_pipeline_actions;
use super::context::PromotionContext;
use super::orchestrator::PromotionOrchestrator;
use super::types::{ActionResponse, JobParams};
use crate::config::{ConfigManager, DispatchBackend, StatusStoreBackend};
use crate::dispatch::{ActionRegistry, DispatchHandle, Dispatcher, LocalDispatcher, OpenWhiskDispatcher};
use crate::error::{PromoteError, Result};
use crate::status::{BatchStore, InMemoryStatusStore, JobSummary, StatusStore, StatusTracker};
use crate::storage::{DriveStorageClient, StorageApi};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Running promotion system for one configuration
pub struct PromotionSystem {
    context: PromotionContext,
    config_manager: Arc<ConfigManager>,
    local: Option<Arc<LocalDispatcher>>,
}

/// Snapshot of how the system was wired
#[derive(Debug, Clone)]
pub struct SystemStatus {
    pub environment: String,
    pub dispatch_backend: DispatchBackend,
    pub status_store_backend: StatusStoreBackend,
    pub in_flight: usize,
}

impl PromotionSystem {
    /// Build every collaborator from configuration
    pub async fn bootstrap(config_manager: ConfigManager) -> Result<Self> {
        let config = config_manager.config_arc();
        let (status_store, batch_store) = Self::open_stores(&config_manager).await?;
        let storage: Arc<dyn StorageApi> = Arc::new(DriveStorageClient::new(&config.storage)?);

        let system = match config.dispatch.backend {
            DispatchBackend::Local => {
                Self::with_local_dispatch(config_manager, storage, status_store, batch_store)
            }
            DispatchBackend::Openwhisk => {
                let dispatcher = OpenWhiskDispatcher::new(
                    &config.dispatch,
                    Duration::from_millis(config.storage.timeout_ms),
                )?;
                let context = PromotionContext::new(
                    config,
                    storage,
                    Arc::new(dispatcher),
                    status_store,
                    batch_store,
                );
                Self {
                    context,
                    config_manager: Arc::new(config_manager),
                    local: None,
                }
            }
        };

        info!(
            environment = system.config_manager.environment(),
            dispatch_backend = ?system.context.config.dispatch.backend,
            status_store_backend = ?system.context.config.status_store.backend,
            "Promotion system bootstrapped"
        );
        Ok(system)
    }

    /// Local dispatch over caller-supplied collaborators, regardless of the
    /// configured dispatch backend
    pub fn with_local_dispatch(
        config_manager: ConfigManager,
        storage: Arc<dyn StorageApi>,
        status_store: Arc<dyn StatusStore>,
        batch_store: Arc<dyn BatchStore>,
    ) -> Self {
        let registry = Arc::new(ActionRegistry::new());
        let local = Arc::new(LocalDispatcher::new(Arc::clone(&registry)));
        let dispatcher: Arc<dyn Dispatcher> = local.clone();
        let context = PromotionContext::new(
            config_manager.config_arc(),
            storage,
            dispatcher,
            status_store,
            batch_store,
        );
        register_pipeline_actions(&registry, &context);

        Self {
            context,
            config_manager: Arc::new(config_manager),
            local: Some(local),
        }
    }

    /// Open the configured status and batch stores without the rest of the system
    pub async fn open_stores(
        config_manager: &ConfigManager,
    ) -> Result<(Arc<dyn StatusStore>, Arc<dyn BatchStore>)> {
        let settings = &config_manager.config().status_store;
        match settings.backend {
            StatusStoreBackend::Memory => {
                let store = Arc::new(InMemoryStatusStore::new());
                Ok((store.clone(), store))
            }
            #[cfg(feature = "postgres")]
            StatusStoreBackend::Postgres => {
                let url = settings.database_url.as_deref().ok_or_else(|| {
                    PromoteError::configuration("status_store.database_url is required")
                })?;
                let store = Arc::new(
                    crate::status::PgStatusStore::connect(url, settings.max_connections).await?,
                );
                store.migrate().await?;
                Ok((store.clone(), store))
            }
            #[cfg(not(feature = "postgres"))]
            StatusStoreBackend::Postgres => Err(PromoteError::configuration(
                "postgres status store requires the 'postgres' feature",
            )),
        }
    }

    pub fn context(&self) -> &PromotionContext {
        &self.context
    }

    pub fn config_manager(&self) -> &Arc<ConfigManager> {
        &self.config_manager
    }

    /// The in-process dispatcher, when stages run in this process
    pub fn local_dispatcher(&self) -> Option<&Arc<LocalDispatcher>> {
        self.local.as_ref()
    }

    /// Start a job through the job-start stage
    pub async fn start_job(&self, params: JobParams) -> ActionResponse {
        PromotionOrchestrator::new(self.context.clone())
            .start_job(params)
            .await
    }

    /// Wait for every in-process stage to finish; no-op for remote dispatch
    pub async fn wait_for_idle(&self) -> Vec<(DispatchHandle, ActionResponse)> {
        match &self.local {
            Some(local) => local.wait_for_all().await,
            None => Vec::new(),
        }
    }

    pub async fn summarize(&self, root_folder: &str) -> Result<JobSummary> {
        StatusTracker::summarize(
            self.context.status_store.as_ref(),
            self.context.batch_store.as_ref(),
            root_folder,
        )
        .await
    }

    pub fn status(&self) -> SystemStatus {
        SystemStatus {
            environment: self.config_manager.environment().to_string(),
            dispatch_backend: self.context.config.dispatch.backend,
            status_store_backend: self.context.config.status_store.backend,
            in_flight: self.local.as_ref().map_or(0, |local| local.in_flight()),
        }
    }

    /// Release registered handlers; the system should not be used afterwards
    pub fn shutdown(&self) {
        if let Some(local) = &self.local {
            local.shutdown();
        }
        info!("Promotion system shut down");
    }
}
