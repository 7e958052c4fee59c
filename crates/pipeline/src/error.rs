use std::fmt;
use std::path::PathBuf;

use thrift_core::error::CoreError;
use thrift_core::store::StoreError;

/// Steps of a single image upload.
///
/// `STAGED -> LOCKED -> NUMBERED -> MOVED -> RECORDED -> UNLOCKED`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStage {
    /// Bytes are in the staging directory, no record exists.
    Staged,
    /// The item lock is held.
    Locked,
    /// A sequence number and canonical filename were chosen.
    Numbered,
    /// The file sits at its canonical path.
    Moved,
    /// The image record is persisted.
    Recorded,
    /// The item lock was released.
    Unlocked,
}

impl fmt::Display for UploadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Staged => "staged",
            Self::Locked => "locked",
            Self::Numbered => "numbered",
            Self::Moved => "moved",
            Self::Recorded => "recorded",
            Self::Unlocked => "unlocked",
        };
        f.write_str(s)
    }
}

/// Errors from the lock manager.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// Another holder has a live lease on the key.
    #[error("Lock '{key}' is held by another caller")]
    Contention { key: String },

    /// Contention persisted through every retry.
    #[error("Timed out acquiring lock '{key}' after {attempts} attempts")]
    Timeout { key: String, attempts: u32 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors from the upload coordinator and the operations sharing its lock.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Core(#[from] CoreError),

    /// The draft must exist for this operation but does not.
    #[error("Draft {item_id} not found")]
    ItemNotFound { item_id: String },

    /// The draft disappeared after the lock was taken; the moved file was
    /// rolled back.
    #[error("Draft {item_id} was deleted while storing {filename}")]
    ItemGone { item_id: String, filename: String },

    #[error("Image {filename} not found on draft {item_id}")]
    ImageNotFound { item_id: String, filename: String },

    #[error("Unsupported image type: {filename}")]
    UnsupportedImage { filename: String },

    /// A filesystem step of an upload failed.
    #[error("Filesystem error for draft {item_id} at stage {stage} ({}): {source}", path.display())]
    Filesystem {
        item_id: String,
        stage: UploadStage,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Removing files or directories of a draft failed.
    #[error("Cleanup failed for draft {item_id} ({}): {source}", path.display())]
    Cleanup {
        item_id: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Persisting the image record failed after the file was moved.
    #[error("Failed to record {filename} on draft {item_id}: {source}")]
    Persist {
        item_id: String,
        filename: String,
        #[source]
        source: StoreError,
    },

    /// The task running the operation panicked or was aborted.
    #[error("Operation on draft {item_id} did not complete: {message}")]
    Interrupted { item_id: String, message: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Convenience type alias for pipeline results.
pub type UploadResult<T> = Result<T, UploadError>;
