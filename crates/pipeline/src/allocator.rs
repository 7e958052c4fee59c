//! Sequence number selection for a draft.

use std::sync::Arc;

use thrift_core::draft::AppendMode;
use thrift_core::locking::sequence_key;
use thrift_core::sequence::{self, FIRST_SEQUENCE};
use thrift_core::store::DraftStore;

use crate::error::{UploadError, UploadResult};
use crate::lock::LockManager;

/// Computes the next free sequence number of a draft under the draft's
/// sequence lock.
///
/// The sequence lock only covers reading the image list. The number is not
/// reserved once this returns, so callers that persist it must already hold
/// the item lock, which every image list mutation takes.
#[derive(Clone)]
pub struct SequenceAllocator {
    drafts: Arc<dyn DraftStore>,
    locks: LockManager,
}

impl SequenceAllocator {
    pub fn new(drafts: Arc<dyn DraftStore>, locks: LockManager) -> Self {
        Self { drafts, locks }
    }

    /// Smallest number >= 1 not used by any stored filename of the draft.
    ///
    /// A missing draft has no images and yields 1 in
    /// [`AppendMode::CreateIfMissing`]; in [`AppendMode::RequireExisting`]
    /// it fails with [`UploadError::ItemNotFound`].
    pub async fn next_sequence_number(
        &self,
        item_id: &str,
        mode: AppendMode,
    ) -> UploadResult<u32> {
        let drafts = &self.drafts;
        self.locks
            .with_lock(&sequence_key(item_id), move || async move {
                let images = drafts.find_images(item_id).await?;
                let next = match images {
                    Some(images) => sequence::next_sequence_number(
                        images.iter().map(|i| i.filename.as_str()),
                    ),
                    None if mode == AppendMode::RequireExisting => {
                        return Err(UploadError::ItemNotFound {
                            item_id: item_id.to_string(),
                        });
                    }
                    None => FIRST_SEQUENCE,
                };
                tracing::debug!(item_id, next, "Computed next sequence number");
                Ok(next)
            })
            .await
    }
}
