use std::sync::Arc;

use thrift_core::store::{DraftStore, LockStore};
use thrift_pipeline::{ImageStorage, UploadCoordinator};

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Draft records, for reads that need no lock.
    pub store: Arc<dyn DraftStore>,
    /// Every mutation of a draft's image list goes through the coordinator.
    pub coordinator: Arc<UploadCoordinator>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Build state over a store backend that holds both drafts and locks.
    pub fn new<S>(store: Arc<S>, config: ServerConfig) -> Self
    where
        S: DraftStore + LockStore + 'static,
    {
        let storage = ImageStorage::new(
            config.storage.upload_dir.clone(),
            config.storage.staging_dir.clone(),
            config.storage.public_prefix.clone(),
        );
        let drafts: Arc<dyn DraftStore> = store.clone();
        let coordinator = UploadCoordinator::new(
            Arc::clone(&drafts),
            store,
            storage,
            config.lock.ttl(),
            config.lock.retry_policy(),
        );

        Self {
            store: drafts,
            coordinator: Arc::new(coordinator),
            config: Arc::new(config),
        }
    }
}
