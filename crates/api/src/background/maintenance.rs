//! Periodic cleanup of dead lock leases and abandoned staged uploads.
//!
//! Leases of crashed holders are already taken over on the next acquire;
//! this job only keeps the lock table small. Staged files are left behind
//! when a request dies between receiving bytes and moving them into place.

use std::sync::Arc;
use std::time::Duration;

use thrift_pipeline::UploadCoordinator;
use tokio_util::sync::CancellationToken;

/// Staged uploads older than this are considered abandoned.
pub const STAGING_MAX_AGE: Duration = Duration::from_secs(3600);

/// Run the maintenance loop every `interval` until `cancel` is triggered.
pub async fn run(coordinator: Arc<UploadCoordinator>, interval: Duration, cancel: CancellationToken) {
    tracing::info!(
        interval_secs = interval.as_secs(),
        staging_max_age_secs = STAGING_MAX_AGE.as_secs(),
        "Maintenance job started"
    );

    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Maintenance job stopping");
                break;
            }
            _ = ticker.tick() => {
                run_once(&coordinator).await;
            }
        }
    }
}

/// One maintenance pass. Failures are logged and retried on the next tick.
pub async fn run_once(coordinator: &UploadCoordinator) {
    match coordinator.locks().cleanup_expired().await {
        Ok(0) => tracing::debug!("Maintenance: no dead locks"),
        Ok(deleted) => tracing::info!(deleted, "Maintenance: removed dead locks"),
        Err(e) => tracing::error!(error = %e, "Maintenance: lock cleanup failed"),
    }

    match coordinator.storage().sweep_staging(STAGING_MAX_AGE).await {
        Ok(0) => tracing::debug!("Maintenance: no abandoned staged uploads"),
        Ok(deleted) => tracing::info!(deleted, "Maintenance: removed abandoned staged uploads"),
        Err(e) => tracing::error!(error = %e, "Maintenance: staging sweep failed"),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use thrift_core::retry::RetryPolicy;
    use thrift_core::store::LockStore;
    use thrift_db::MemoryStore;
    use thrift_pipeline::ImageStorage;

    use super::*;

    #[tokio::test]
    async fn pass_removes_dead_locks() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        store
            .try_acquire("item-abcdef", "crashed", Duration::ZERO)
            .await
            .unwrap();
        let coordinator = UploadCoordinator::new(
            store.clone(),
            store.clone(),
            ImageStorage::new(tmp.path().join("u"), tmp.path().join("s"), "/uploads"),
            Duration::from_secs(30),
            RetryPolicy::no_retry(),
        );

        run_once(&coordinator).await;

        assert!(store.find_lock("item-abcdef").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn loop_stops_on_cancel() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let coordinator = Arc::new(UploadCoordinator::new(
            store.clone(),
            store,
            ImageStorage::new(tmp.path().join("u"), tmp.path().join("s"), "/uploads"),
            Duration::from_secs(30),
            RetryPolicy::no_retry(),
        ));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(coordinator, Duration::from_millis(10), cancel.clone()));

        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("maintenance loop stops")
            .unwrap();
    }
}
