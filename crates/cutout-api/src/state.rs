//! Application state wiring all services together.
//!
//! AppState owns the one result store, the one model handle, the worker
//! pool and the service facade. Everything is built here and passed down as
//! `Arc`s; nothing lives in a global.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use cutout_core::offload::WorkOffloader;
use cutout_core::reaper::Reaper;
use cutout_core::service::{CutoutService, CutoutStore};
use cutout_infra::config::{load_config, resolve_data_dir};
use cutout_infra::segmenter::build_handle;
use cutout_types::config::CutoutConfig;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: CutoutConfig,
    pub data_dir: PathBuf,
    pub store: Arc<CutoutStore>,
    pub service: Arc<CutoutService>,
}

impl AppState {
    /// Load configuration and wire the services.
    pub async fn init(config_path: Option<&Path>) -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        let config = load_config(config_path, &data_dir).await?;
        Self::from_config(config, data_dir)
    }

    pub fn from_config(config: CutoutConfig, data_dir: PathBuf) -> anyhow::Result<Self> {
        let handle = Arc::new(build_handle(&config.segmenter)?);
        let offloader = WorkOffloader::new(handle, &config.workers);
        let store = Arc::new(CutoutStore::new());
        let service = Arc::new(CutoutService::new(Arc::clone(&store), offloader));

        tracing::debug!(
            backend = %config.segmenter.backend,
            workers = config.workers.workers,
            max_queue = config.workers.max_queue,
            ttl_secs = config.store.ttl_secs,
            "services wired"
        );

        Ok(Self {
            config,
            data_dir,
            store,
            service,
        })
    }

    /// Start the TTL reaper; it stops when `cancel` fires.
    pub fn spawn_reaper(&self, cancel: CancellationToken) -> JoinHandle<()> {
        Reaper::new(
            Arc::clone(&self.store),
            self.config.store.ttl(),
            self.config.store.sweep_interval(),
        )
        .spawn(cancel)
    }
}
