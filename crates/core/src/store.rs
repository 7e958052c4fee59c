//! Store traits implemented by the persistence backends.
//!
//! [`DraftStore`] holds draft items and their image records; [`LockStore`]
//! holds lock leases. Both are implemented by the PostgreSQL store and by
//! the in-memory store in `thrift-db`.

use std::time::Duration;

use async_trait::async_trait;

use crate::draft::{AppendMode, DraftItem, ImageRecord, NewImageRecord};
use crate::locking::LockLease;

/// Boxed error from a store backend.
pub type BackendError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by store backends.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend failed (connection, query, serialization...).
    #[error("Store backend error: {0}")]
    Backend(#[source] BackendError),

    /// A uniqueness constraint rejected the write.
    #[error("Duplicate value: {0}")]
    Duplicate(String),
}

impl StoreError {
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend(Box::new(err))
    }
}

/// Result of removing one image record.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoveOutcome {
    /// The record was removed; the draft as it is now.
    Removed(DraftItem),
    /// The draft exists but has no image with that filename.
    ImageMissing,
    /// No draft exists for the item id.
    ItemMissing,
}

/// Persistence of draft items and their image records.
#[async_trait]
pub trait DraftStore: Send + Sync {
    /// Load a draft with its images, or `None` if it does not exist.
    async fn find_draft(&self, item_id: &str) -> Result<Option<DraftItem>, StoreError>;

    /// Images of a draft in upload order.
    ///
    /// `None` when the draft does not exist; an empty list when it exists
    /// without images.
    async fn find_images(&self, item_id: &str) -> Result<Option<Vec<ImageRecord>>, StoreError>;

    /// Create or update a draft's payload and mark all its images as no
    /// longer new.
    async fn save_draft(
        &self,
        item_id: &str,
        payload: &serde_json::Value,
    ) -> Result<DraftItem, StoreError>;

    /// Append an image record.
    ///
    /// With [`AppendMode::CreateIfMissing`] a missing draft is created with
    /// an empty payload. With [`AppendMode::RequireExisting`] a missing draft
    /// yields `Ok(None)` and nothing is written.
    async fn append_image(
        &self,
        item_id: &str,
        image: &NewImageRecord,
        mode: AppendMode,
    ) -> Result<Option<DraftItem>, StoreError>;

    /// Remove the image record with `filename` from a draft.
    async fn remove_image(&self, item_id: &str, filename: &str)
        -> Result<RemoveOutcome, StoreError>;

    /// Delete a draft and all its image records. Returns `true` if a draft
    /// was deleted.
    async fn delete_draft(&self, item_id: &str) -> Result<bool, StoreError>;

    /// Verify the backend is reachable.
    async fn health_check(&self) -> Result<(), StoreError>;
}

/// Persistence of lock leases.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Conditionally take the lock for `key`.
    ///
    /// Succeeds when no lease exists for `key` or the existing one is
    /// released or expired; the lease is then (re)written with
    /// `locked_at = now`, `expires_at = now + ttl` and `holder_id`.
    /// Returns `Ok(None)` when another holder has a live lease.
    async fn try_acquire(
        &self,
        key: &str,
        holder_id: &str,
        ttl: Duration,
    ) -> Result<Option<LockLease>, StoreError>;

    /// Clear the lease for `key` if it is still owned by `holder_id`.
    ///
    /// Returns `true` if a lease was cleared. Releasing a lock that is not
    /// held is a no-op.
    async fn release(&self, key: &str, holder_id: &str) -> Result<bool, StoreError>;

    /// The stored lease for `key`, live or not.
    async fn find_lock(&self, key: &str) -> Result<Option<LockLease>, StoreError>;

    /// Delete leases that are released or expired. Returns the number removed.
    async fn cleanup_expired(&self) -> Result<u64, StoreError>;
}
