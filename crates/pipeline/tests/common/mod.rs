use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use thrift_core::retry::RetryPolicy;
use thrift_core::store::{DraftStore, LockStore};
use thrift_db::MemoryStore;
use thrift_pipeline::{ImageStorage, StagedFile, UploadCoordinator};

pub const ITEM: &str = "550e8400-e29b-41d4-a716-446655440000";

/// Short fixed delay with plenty of retries, so contention in tests resolves
/// quickly without timing out.
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::fixed(200, Duration::from_millis(5))
}

pub fn storage_in(dir: &Path) -> ImageStorage {
    ImageStorage::new(dir.join("uploads"), dir.join("staging"), "/uploads")
}

/// A coordinator over a fresh `MemoryStore` and temporary directory.
pub struct Fixture {
    pub tmp: TempDir,
    pub store: Arc<MemoryStore>,
    pub coordinator: Arc<UploadCoordinator>,
}

pub fn fixture() -> Fixture {
    let store = Arc::new(MemoryStore::new());
    fixture_with(store.clone(), store)
}

/// A coordinator whose drafts go through `drafts` while locks (and the
/// `store` field) use `locks`.
pub fn fixture_with(drafts: Arc<dyn DraftStore>, locks: Arc<MemoryStore>) -> Fixture {
    let tmp = tempfile::tempdir().expect("tempdir");
    let lock_store: Arc<dyn LockStore> = locks.clone();
    let coordinator = UploadCoordinator::new(
        drafts,
        lock_store,
        storage_in(tmp.path()),
        Duration::from_secs(30),
        fast_retry(),
    );
    Fixture {
        tmp,
        store: locks,
        coordinator: Arc::new(coordinator),
    }
}

pub async fn stage(coordinator: &UploadCoordinator, original_filename: &str) -> StagedFile {
    coordinator
        .storage()
        .stage(original_filename, original_filename.as_bytes())
        .await
        .expect("stage upload")
}

/// Sorted names of the staged files still present.
pub fn staged_files(coordinator: &UploadCoordinator) -> Vec<String> {
    let mut names: Vec<String> = match std::fs::read_dir(coordinator.storage().staging_dir()) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => Vec::new(),
    };
    names.sort();
    names
}
