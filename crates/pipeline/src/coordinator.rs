//! Upload coordination.
//!
//! Every operation that changes an item's image list runs inside the
//! item's lock (`item_key(item_id)`), so numbering, file placement and the
//! record write of one upload can never interleave with another mutation of
//! the same draft. A batch is processed one file at a time; each file's
//! critical section completes, record write included, before the next
//! begins.
//!
//! Operations that move or delete files run on their own task. A caller
//! that gives up (a request timeout, a dropped connection) stops waiting,
//! but the stages still run through to the record write or the rollback.

use std::collections::HashSet;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thrift_core::draft::{AppendMode, DraftItem, ImageRecord, NewImageRecord};
use thrift_core::locking::item_key;
use thrift_core::naming::{generate_filename, is_supported_image, validate_filename};
use thrift_core::retry::RetryPolicy;
use thrift_core::store::{DraftStore, LockStore, RemoveOutcome, StoreError};
use thrift_core::types::validate_item_id;

use crate::allocator::SequenceAllocator;
use crate::error::{UploadError, UploadResult, UploadStage};
use crate::lock::LockManager;
use crate::storage::{ImageStorage, StagedFile};

/// Outcome of [`UploadCoordinator::reconcile`].
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub item_id: String,
    /// Files deleted because no record referenced them.
    pub removed_files: Vec<String>,
    /// Records deleted because their file was missing.
    pub removed_records: Vec<String>,
    /// The draft's images after repair.
    pub images: Vec<ImageRecord>,
}

/// Serializes uploads and image deletions per draft.
pub struct UploadCoordinator {
    drafts: Arc<dyn DraftStore>,
    locks: LockManager,
    allocator: SequenceAllocator,
    storage: ImageStorage,
}

impl UploadCoordinator {
    pub fn new(
        drafts: Arc<dyn DraftStore>,
        lock_store: Arc<dyn LockStore>,
        storage: ImageStorage,
        lock_ttl: Duration,
        retry: RetryPolicy,
    ) -> Self {
        let locks = LockManager::new(lock_store, lock_ttl, retry);
        let allocator = SequenceAllocator::new(Arc::clone(&drafts), locks.clone());
        Self {
            drafts,
            locks,
            allocator,
            storage,
        }
    }

    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    pub fn storage(&self) -> &ImageStorage {
        &self.storage
    }

    // -----------------------------------------------------------------------
    // Uploads
    // -----------------------------------------------------------------------

    /// Stage `bytes` and store them as the draft's next image.
    pub async fn upload_image(
        self: &Arc<Self>,
        item_id: &str,
        original_filename: &str,
        bytes: &[u8],
        mode: AppendMode,
    ) -> UploadResult<ImageRecord> {
        validate_item_id(item_id)?;
        ensure_supported(original_filename)?;

        let staged = self
            .storage
            .stage(original_filename, bytes)
            .await
            .map_err(|source| UploadError::Filesystem {
                item_id: item_id.to_string(),
                stage: UploadStage::Staged,
                path: self.storage.staging_dir().to_path_buf(),
                source,
            })?;

        self.upload_staged(item_id, staged, mode).await
    }

    /// Store an already staged file as the draft's next image.
    ///
    /// On failure the staged file is discarded and a file that was already
    /// moved into place is deleted again, so no record is left without its
    /// file.
    pub async fn upload_staged(
        self: &Arc<Self>,
        item_id: &str,
        staged: StagedFile,
        mode: AppendMode,
    ) -> UploadResult<ImageRecord> {
        let this = Arc::clone(self);
        let owned_id = item_id.to_string();
        run_to_completion(item_id, async move {
            this.store_staged(&owned_id, &staged, mode).await
        })
        .await
    }

    async fn store_staged(
        &self,
        item_id: &str,
        staged: &StagedFile,
        mode: AppendMode,
    ) -> UploadResult<ImageRecord> {
        let result = self.store_staged_inner(item_id, staged, mode).await;
        match &result {
            Ok(image) => tracing::info!(
                item_id,
                filename = %image.filename,
                stage = %UploadStage::Unlocked,
                "Image uploaded",
            ),
            Err(e) => {
                tracing::warn!(
                    item_id,
                    original_filename = %staged.original_filename,
                    error = %e,
                    "Image upload failed",
                );
                self.storage.discard(staged).await;
            }
        }
        result
    }

    async fn store_staged_inner(
        &self,
        item_id: &str,
        staged: &StagedFile,
        mode: AppendMode,
    ) -> UploadResult<ImageRecord> {
        validate_item_id(item_id)?;
        ensure_supported(&staged.original_filename)?;

        self.locks
            .with_lock(&item_key(item_id), move || async move {
                self.store_locked(item_id, staged, mode).await
            })
            .await
    }

    /// Steps `LOCKED -> NUMBERED -> MOVED -> RECORDED`. Caller holds the
    /// item lock.
    async fn store_locked(
        &self,
        item_id: &str,
        staged: &StagedFile,
        mode: AppendMode,
    ) -> UploadResult<ImageRecord> {
        let sequence = self.allocator.next_sequence_number(item_id, mode).await?;
        let filename = generate_filename(item_id, sequence, &staged.original_filename);
        tracing::debug!(
            item_id,
            filename = %filename,
            sequence,
            stage = %UploadStage::Numbered,
            "Sequence assigned",
        );

        let dir = self
            .storage
            .ensure_item_dir(item_id)
            .await
            .map_err(|source| UploadError::Filesystem {
                item_id: item_id.to_string(),
                stage: UploadStage::Numbered,
                path: self.storage.item_dir(item_id),
                source,
            })?;
        let dest = dir.join(&filename);
        self.storage
            .move_into_place(staged, &dest)
            .await
            .map_err(|source| UploadError::Filesystem {
                item_id: item_id.to_string(),
                stage: UploadStage::Numbered,
                path: dest.clone(),
                source,
            })?;
        tracing::debug!(
            item_id,
            filename = %filename,
            stage = %UploadStage::Moved,
            "File in place",
        );

        let record = NewImageRecord::new(&filename, self.storage.public_url(item_id, &filename));
        let draft = match self.drafts.append_image(item_id, &record, mode).await {
            Ok(Some(draft)) => draft,
            Ok(None) => {
                self.compensate(item_id, &filename, &dest).await;
                return Err(UploadError::ItemGone {
                    item_id: item_id.to_string(),
                    filename,
                });
            }
            Err(source) => {
                self.compensate(item_id, &filename, &dest).await;
                return Err(UploadError::Persist {
                    item_id: item_id.to_string(),
                    filename,
                    source,
                });
            }
        };
        tracing::debug!(
            item_id,
            filename = %filename,
            stage = %UploadStage::Recorded,
            "Image recorded",
        );

        draft
            .images
            .into_iter()
            .find(|i| i.id == record.id)
            .ok_or_else(|| {
                UploadError::Store(StoreError::Backend(
                    format!("appended image {filename} missing from draft {item_id}").into(),
                ))
            })
    }

    /// Remove a moved file after its record write failed.
    async fn compensate(&self, item_id: &str, filename: &str, path: &Path) {
        match self.storage.remove_image(item_id, filename).await {
            Ok(_) => tracing::warn!(
                item_id,
                filename,
                stage = %UploadStage::Moved,
                "Rolled back moved file after failed record write",
            ),
            Err(e) => tracing::error!(
                item_id,
                filename,
                stage = %UploadStage::Moved,
                path = %path.display(),
                error = %e,
                "Compensation failed, file is on disk without a record",
            ),
        }
        self.prune(item_id).await;
    }

    /// Store staged files in order.
    ///
    /// Every file's extension is checked before anything is stored. The
    /// batch stops at the first failure; images stored before it stay, the
    /// remaining staged files are discarded.
    pub async fn upload_image_batch(
        self: &Arc<Self>,
        item_id: &str,
        files: Vec<StagedFile>,
        mode: AppendMode,
    ) -> UploadResult<Vec<ImageRecord>> {
        let this = Arc::clone(self);
        let owned_id = item_id.to_string();
        run_to_completion(item_id, async move {
            this.store_batch(&owned_id, files, mode).await
        })
        .await
    }

    async fn store_batch(
        &self,
        item_id: &str,
        files: Vec<StagedFile>,
        mode: AppendMode,
    ) -> UploadResult<Vec<ImageRecord>> {
        if let Err(e) = validate_batch(item_id, &files) {
            for staged in &files {
                self.storage.discard(staged).await;
            }
            return Err(e);
        }

        let mut stored = Vec::with_capacity(files.len());
        for (idx, staged) in files.iter().enumerate() {
            match self.store_staged(item_id, staged, mode).await {
                Ok(image) => stored.push(image),
                Err(e) => {
                    for rest in &files[idx + 1..] {
                        self.storage.discard(rest).await;
                    }
                    tracing::warn!(
                        item_id,
                        stored = stored.len(),
                        total = files.len(),
                        "Batch upload stopped at first failure",
                    );
                    return Err(e);
                }
            }
        }
        Ok(stored)
    }

    // -----------------------------------------------------------------------
    // Other image list mutations
    // -----------------------------------------------------------------------

    /// Delete one image record and its file. Returns the remaining images.
    pub async fn delete_image(
        self: &Arc<Self>,
        item_id: &str,
        filename: &str,
    ) -> UploadResult<Vec<ImageRecord>> {
        validate_item_id(item_id)?;
        validate_filename(filename)?;

        let this = Arc::clone(self);
        let (owned_id, filename) = (item_id.to_string(), filename.to_string());
        run_to_completion(item_id, async move {
            this.delete_image_locked(&owned_id, &filename).await
        })
        .await
    }

    async fn delete_image_locked(&self, item_id: &str, filename: &str) -> UploadResult<Vec<ImageRecord>> {
        self.locks
            .with_lock(&item_key(item_id), move || async move {
                let draft = match self.drafts.remove_image(item_id, filename).await? {
                    RemoveOutcome::Removed(draft) => draft,
                    RemoveOutcome::ImageMissing => {
                        return Err(UploadError::ImageNotFound {
                            item_id: item_id.to_string(),
                            filename: filename.to_string(),
                        });
                    }
                    RemoveOutcome::ItemMissing => {
                        return Err(UploadError::ItemNotFound {
                            item_id: item_id.to_string(),
                        });
                    }
                };

                let existed = self
                    .storage
                    .remove_image(item_id, filename)
                    .await
                    .map_err(|source| UploadError::Cleanup {
                        item_id: item_id.to_string(),
                        path: self.storage.image_path(item_id, filename),
                        source,
                    })?;
                if !existed {
                    tracing::warn!(item_id, filename, "Deleted record had no file on disk");
                }
                self.prune(item_id).await;

                tracing::info!(item_id, filename, remaining = draft.images.len(), "Image deleted");
                Ok(draft.images)
            })
            .await
    }

    /// The number the next upload would receive. A missing draft yields 1.
    pub async fn peek_next_sequence_number(&self, item_id: &str) -> UploadResult<u32> {
        validate_item_id(item_id)?;

        self.locks
            .with_lock(&item_key(item_id), move || async move {
                self.allocator
                    .next_sequence_number(item_id, AppendMode::CreateIfMissing)
                    .await
            })
            .await
    }

    /// Create or update a draft's payload, marking its images as saved.
    pub async fn save_draft(
        &self,
        item_id: &str,
        payload: &serde_json::Value,
    ) -> UploadResult<DraftItem> {
        validate_item_id(item_id)?;

        self.locks
            .with_lock(&item_key(item_id), move || async move {
                let draft = self.drafts.save_draft(item_id, payload).await?;
                tracing::info!(item_id, images = draft.images.len(), "Draft saved");
                Ok(draft)
            })
            .await
    }

    /// Delete a draft with its records and image directory.
    ///
    /// Returns `false` if there was neither a record nor a directory.
    pub async fn delete_draft(self: &Arc<Self>, item_id: &str) -> UploadResult<bool> {
        validate_item_id(item_id)?;

        let this = Arc::clone(self);
        let owned_id = item_id.to_string();
        run_to_completion(item_id, async move { this.delete_draft_locked(&owned_id).await }).await
    }

    async fn delete_draft_locked(&self, item_id: &str) -> UploadResult<bool> {
        self.locks
            .with_lock(&item_key(item_id), move || async move {
                let deleted = self.drafts.delete_draft(item_id).await?;
                let had_dir = self
                    .storage
                    .remove_item_dir(item_id)
                    .await
                    .map_err(|source| UploadError::Cleanup {
                        item_id: item_id.to_string(),
                        path: self.storage.item_dir(item_id),
                        source,
                    })?;
                if deleted || had_dir {
                    tracing::info!(item_id, record = deleted, directory = had_dir, "Draft deleted");
                }
                Ok(deleted || had_dir)
            })
            .await
    }

    /// Bring records and files of a draft back in line.
    ///
    /// Files no record references are deleted, records whose file is gone
    /// are removed. A missing draft counts as having no records.
    pub async fn reconcile(self: &Arc<Self>, item_id: &str) -> UploadResult<ReconcileReport> {
        validate_item_id(item_id)?;

        let this = Arc::clone(self);
        let owned_id = item_id.to_string();
        run_to_completion(item_id, async move { this.reconcile_locked(&owned_id).await }).await
    }

    async fn reconcile_locked(&self, item_id: &str) -> UploadResult<ReconcileReport> {
        self.locks
            .with_lock(&item_key(item_id), move || async move {
                let images = self.drafts.find_images(item_id).await?.unwrap_or_default();
                let files = self
                    .storage
                    .list_item_files(item_id)
                    .await
                    .map_err(|source| UploadError::Cleanup {
                        item_id: item_id.to_string(),
                        path: self.storage.item_dir(item_id),
                        source,
                    })?;

                let tracked: HashSet<&str> = images.iter().map(|i| i.filename.as_str()).collect();
                let on_disk: HashSet<&str> = files.iter().map(String::as_str).collect();

                let mut removed_files = Vec::new();
                for file in files.iter().filter(|f| !tracked.contains(f.as_str())) {
                    self.storage
                        .remove_image(item_id, file)
                        .await
                        .map_err(|source| UploadError::Cleanup {
                            item_id: item_id.to_string(),
                            path: self.storage.image_path(item_id, file),
                            source,
                        })?;
                    removed_files.push(file.clone());
                }

                let mut removed_records = Vec::new();
                for image in images.iter().filter(|i| !on_disk.contains(i.filename.as_str())) {
                    if let RemoveOutcome::Removed(_) =
                        self.drafts.remove_image(item_id, &image.filename).await?
                    {
                        removed_records.push(image.filename.clone());
                    }
                }

                self.prune(item_id).await;
                let images = self.drafts.find_images(item_id).await?.unwrap_or_default();

                if !removed_files.is_empty() || !removed_records.is_empty() {
                    tracing::warn!(
                        item_id,
                        removed_files = removed_files.len(),
                        removed_records = removed_records.len(),
                        "Reconciled draft images",
                    );
                }

                Ok(ReconcileReport {
                    item_id: item_id.to_string(),
                    removed_files,
                    removed_records,
                    images,
                })
            })
            .await
    }

    /// Remove the item directory if empty; failures are only logged.
    async fn prune(&self, item_id: &str) {
        if let Err(e) = self.storage.prune_item_dir(item_id).await {
            tracing::warn!(item_id, error = %e, "Failed to prune item directory");
        }
    }
}

/// Run `work` on its own task and wait for its result.
///
/// Dropping the returned future detaches the task instead of cancelling it.
async fn run_to_completion<T, Fut>(item_id: &str, work: Fut) -> UploadResult<T>
where
    T: Send + 'static,
    Fut: Future<Output = UploadResult<T>> + Send + 'static,
{
    match tokio::spawn(work).await {
        Ok(result) => result,
        Err(e) => Err(UploadError::Interrupted {
            item_id: item_id.to_string(),
            message: e.to_string(),
        }),
    }
}

fn ensure_supported(original_filename: &str) -> UploadResult<()> {
    if is_supported_image(original_filename) {
        Ok(())
    } else {
        Err(UploadError::UnsupportedImage {
            filename: original_filename.to_string(),
        })
    }
}

fn validate_batch(item_id: &str, files: &[StagedFile]) -> UploadResult<()> {
    validate_item_id(item_id)?;
    files
        .iter()
        .try_for_each(|f| ensure_supported(&f.original_filename))
}
