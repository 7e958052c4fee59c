//! Rows of the `draft_items` and `draft_images` tables.

use sqlx::FromRow;
use thrift_core::draft::{DraftItem, ImageRecord};
use thrift_core::types::Timestamp;
use uuid::Uuid;

/// A row from `draft_items`, joined with the live lease on its item key.
#[derive(Debug, Clone, FromRow)]
pub struct DraftItemRow {
    pub item_id: String,
    pub payload: serde_json::Value,
    pub locked_at: Option<Timestamp>,
    pub expires_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl DraftItemRow {
    /// Combine the draft row with its image rows.
    pub fn into_draft(self, images: Vec<DraftImageRow>) -> DraftItem {
        DraftItem {
            item_id: self.item_id,
            payload: self.payload,
            images: images.into_iter().map(ImageRecord::from).collect(),
            locked_at: self.locked_at,
            expires_at: self.expires_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// A row from `draft_images`.
#[derive(Debug, Clone, FromRow)]
pub struct DraftImageRow {
    pub id: Uuid,
    pub filename: String,
    pub url: String,
    pub is_new: bool,
    pub created_at: Timestamp,
}

impl From<DraftImageRow> for ImageRecord {
    fn from(row: DraftImageRow) -> Self {
        ImageRecord {
            id: row.id,
            filename: row.filename,
            url: row.url,
            is_new: row.is_new,
            created_at: row.created_at,
        }
    }
}
