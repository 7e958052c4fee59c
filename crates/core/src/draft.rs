//! Draft item and image record types shared by every store backend.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// DraftItem
// ---------------------------------------------------------------------------

/// A not-yet-finalized catalog entry and its uploaded images.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftItem {
    pub item_id: String,
    /// Business fields (name, description, estimates). Passed through as-is.
    pub payload: serde_json::Value,
    /// Images in upload order.
    pub images: Vec<ImageRecord>,
    /// Set while a non-expired lock is held on the raw item key.
    pub locked_at: Option<Timestamp>,
    pub expires_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl DraftItem {
    /// Filenames of all images, in upload order.
    pub fn filenames(&self) -> Vec<&str> {
        self.images.iter().map(|i| i.filename.as_str()).collect()
    }
}

// ---------------------------------------------------------------------------
// ImageRecord
// ---------------------------------------------------------------------------

/// A stored image attached to a draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: Uuid,
    /// Canonical `Draft-<shortId>-<NN>.<ext>` name.
    pub filename: String,
    /// Public locator of the bytes.
    pub url: String,
    /// True until the client saves the draft.
    pub is_new: bool,
    pub created_at: Timestamp,
}

/// Input for appending an image to a draft.
#[derive(Debug, Clone)]
pub struct NewImageRecord {
    pub id: Uuid,
    pub filename: String,
    pub url: String,
}

impl NewImageRecord {
    pub fn new(filename: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            filename: filename.into(),
            url: url.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// AppendMode
// ---------------------------------------------------------------------------

/// How an upload treats a draft that does not exist yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppendMode {
    /// First-upload path: a missing draft means "no images yet" and is
    /// created on append.
    #[default]
    CreateIfMissing,
    /// The draft must already exist; a missing draft is an error.
    RequireExisting,
}
