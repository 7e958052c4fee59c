//! In-memory implementation of the store traits.
//!
//! Every operation runs under a single mutex, so each call is atomic in the
//! same way the corresponding PostgreSQL statement or transaction is. Locks
//! only coordinate callers sharing the same `MemoryStore`, which makes it
//! suitable for tests and single-instance development only.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use thrift_core::draft::{AppendMode, DraftItem, ImageRecord, NewImageRecord};
use thrift_core::locking::{ttl_to_chrono, LockLease};
use thrift_core::naming::parse_sequence_number;
use thrift_core::store::{DraftStore, LockStore, RemoveOutcome, StoreError};
use thrift_core::types::Timestamp;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
struct StoredDraft {
    payload: serde_json::Value,
    images: Vec<ImageRecord>,
    created_at: Timestamp,
    updated_at: Timestamp,
}

#[derive(Debug, Default)]
struct State {
    drafts: HashMap<String, StoredDraft>,
    locks: HashMap<String, LockLease>,
}

impl State {
    fn snapshot(&self, item_id: &str) -> Option<DraftItem> {
        let draft = self.drafts.get(item_id)?;
        let lease = self
            .locks
            .get(item_id)
            .filter(|lease| lease.is_active());
        Some(DraftItem {
            item_id: item_id.to_string(),
            payload: draft.payload.clone(),
            images: draft.images.clone(),
            locked_at: lease.and_then(|l| l.locked_at),
            expires_at: lease.and_then(|l| l.expires_at),
            created_at: draft.created_at,
            updated_at: draft.updated_at,
        })
    }
}

/// Store backend holding everything in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DraftStore for MemoryStore {
    async fn find_draft(&self, item_id: &str) -> Result<Option<DraftItem>, StoreError> {
        Ok(self.state.lock().await.snapshot(item_id))
    }

    async fn find_images(&self, item_id: &str) -> Result<Option<Vec<ImageRecord>>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.drafts.get(item_id).map(|d| d.images.clone()))
    }

    async fn save_draft(
        &self,
        item_id: &str,
        payload: &serde_json::Value,
    ) -> Result<DraftItem, StoreError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let draft = state
            .drafts
            .entry(item_id.to_string())
            .or_insert_with(|| StoredDraft {
                payload: serde_json::Value::Null,
                images: Vec::new(),
                created_at: now,
                updated_at: now,
            });
        draft.payload = payload.clone();
        draft.updated_at = now;
        for image in &mut draft.images {
            image.is_new = false;
        }
        state
            .snapshot(item_id)
            .ok_or_else(|| StoreError::Backend("draft vanished during save".into()))
    }

    async fn append_image(
        &self,
        item_id: &str,
        image: &NewImageRecord,
        mode: AppendMode,
    ) -> Result<Option<DraftItem>, StoreError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();

        if !state.drafts.contains_key(item_id) {
            if mode == AppendMode::RequireExisting {
                return Ok(None);
            }
            state.drafts.insert(
                item_id.to_string(),
                StoredDraft {
                    payload: serde_json::json!({}),
                    images: Vec::new(),
                    created_at: now,
                    updated_at: now,
                },
            );
        }

        let Some(draft) = state.drafts.get_mut(item_id) else {
            return Ok(None);
        };

        // Same constraints as uq_draft_images_item_filename / _sequence.
        if draft.images.iter().any(|i| i.filename == image.filename) {
            return Err(StoreError::Duplicate(
                "uq_draft_images_item_filename".to_string(),
            ));
        }
        if let Some(seq) = parse_sequence_number(&image.filename) {
            if draft
                .images
                .iter()
                .any(|i| parse_sequence_number(&i.filename) == Some(seq))
            {
                return Err(StoreError::Duplicate(
                    "uq_draft_images_item_sequence".to_string(),
                ));
            }
        }

        draft.images.push(ImageRecord {
            id: image.id,
            filename: image.filename.clone(),
            url: image.url.clone(),
            is_new: true,
            created_at: now,
        });
        draft.updated_at = now;

        Ok(state.snapshot(item_id))
    }

    async fn remove_image(
        &self,
        item_id: &str,
        filename: &str,
    ) -> Result<RemoveOutcome, StoreError> {
        let mut state = self.state.lock().await;
        let Some(draft) = state.drafts.get_mut(item_id) else {
            return Ok(RemoveOutcome::ItemMissing);
        };
        let before = draft.images.len();
        draft.images.retain(|i| i.filename != filename);
        if draft.images.len() == before {
            return Ok(RemoveOutcome::ImageMissing);
        }
        draft.updated_at = Utc::now();
        Ok(state
            .snapshot(item_id)
            .map_or(RemoveOutcome::ItemMissing, RemoveOutcome::Removed))
    }

    async fn delete_draft(&self, item_id: &str) -> Result<bool, StoreError> {
        Ok(self.state.lock().await.drafts.remove(item_id).is_some())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl LockStore for MemoryStore {
    async fn try_acquire(
        &self,
        key: &str,
        holder_id: &str,
        ttl: Duration,
    ) -> Result<Option<LockLease>, StoreError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();

        if state
            .locks
            .get(key)
            .is_some_and(|existing| existing.is_active_at(now))
        {
            return Ok(None);
        }

        let lease = LockLease {
            lock_key: key.to_string(),
            holder_id: holder_id.to_string(),
            locked_at: Some(now),
            expires_at: Some(now + ttl_to_chrono(ttl)),
        };
        state.locks.insert(key.to_string(), lease.clone());
        Ok(Some(lease))
    }

    async fn release(&self, key: &str, holder_id: &str) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        match state.locks.get_mut(key) {
            Some(lease) if lease.holder_id == holder_id && lease.expires_at.is_some() => {
                lease.locked_at = None;
                lease.expires_at = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_lock(&self, key: &str) -> Result<Option<LockLease>, StoreError> {
        Ok(self.state.lock().await.locks.get(key).cloned())
    }

    async fn cleanup_expired(&self) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let before = state.locks.len();
        state.locks.retain(|_, lease| lease.is_active_at(now));
        Ok((before - state.locks.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const ITEM: &str = "550e8400-e29b-41d4-a716-446655440000";

    fn image(filename: &str) -> NewImageRecord {
        NewImageRecord::new(filename, format!("/uploads/drafts/{ITEM}/{filename}"))
    }

    // -----------------------------------------------------------------------
    // Drafts and images
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn missing_draft_has_no_images() {
        let store = MemoryStore::new();
        assert!(store.find_images(ITEM).await.unwrap().is_none());
        assert!(store.find_draft(ITEM).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn append_creates_draft_when_allowed() {
        let store = MemoryStore::new();
        let draft = store
            .append_image(ITEM, &image("Draft-440000-01.png"), AppendMode::CreateIfMissing)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(draft.filenames(), vec!["Draft-440000-01.png"]);
        assert!(draft.images[0].is_new);
        assert_eq!(draft.payload, serde_json::json!({}));
    }

    #[tokio::test]
    async fn append_requires_existing_draft_when_asked() {
        let store = MemoryStore::new();
        let result = store
            .append_image(ITEM, &image("Draft-440000-01.png"), AppendMode::RequireExisting)
            .await
            .unwrap();
        assert!(result.is_none());
        assert!(store.find_draft(ITEM).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn append_rejects_duplicate_sequence_number() {
        let store = MemoryStore::new();
        store
            .append_image(ITEM, &image("Draft-440000-01.png"), AppendMode::CreateIfMissing)
            .await
            .unwrap();
        let err = store
            .append_image(ITEM, &image("Draft-440000-01.jpg"), AppendMode::CreateIfMissing)
            .await
            .unwrap_err();
        assert_matches!(err, StoreError::Duplicate(c) if c == "uq_draft_images_item_sequence");
    }

    #[tokio::test]
    async fn save_marks_images_as_not_new() {
        let store = MemoryStore::new();
        store
            .append_image(ITEM, &image("Draft-440000-01.png"), AppendMode::CreateIfMissing)
            .await
            .unwrap();
        let saved = store
            .save_draft(ITEM, &serde_json::json!({ "name": "Lamp" }))
            .await
            .unwrap();
        assert_eq!(saved.payload["name"], "Lamp");
        assert!(saved.images.iter().all(|i| !i.is_new));
    }

    #[tokio::test]
    async fn remove_image_outcomes() {
        let store = MemoryStore::new();
        assert_eq!(
            store.remove_image(ITEM, "Draft-440000-01.png").await.unwrap(),
            RemoveOutcome::ItemMissing
        );
        store
            .append_image(ITEM, &image("Draft-440000-01.png"), AppendMode::CreateIfMissing)
            .await
            .unwrap();
        assert_eq!(
            store.remove_image(ITEM, "Draft-440000-02.png").await.unwrap(),
            RemoveOutcome::ImageMissing
        );
        assert_matches!(
            store.remove_image(ITEM, "Draft-440000-01.png").await.unwrap(),
            RemoveOutcome::Removed(d) if d.images.is_empty()
        );
    }

    #[tokio::test]
    async fn delete_draft_removes_images() {
        let store = MemoryStore::new();
        store
            .append_image(ITEM, &image("Draft-440000-01.png"), AppendMode::CreateIfMissing)
            .await
            .unwrap();
        assert!(store.delete_draft(ITEM).await.unwrap());
        assert!(!store.delete_draft(ITEM).await.unwrap());
        assert!(store.find_images(ITEM).await.unwrap().is_none());
    }

    // -----------------------------------------------------------------------
    // Locks
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn live_lock_blocks_second_holder() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(30);
        assert!(store.try_acquire("k", "a", ttl).await.unwrap().is_some());
        assert!(store.try_acquire("k", "b", ttl).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn released_lock_can_be_retaken() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(30);
        store.try_acquire("k", "a", ttl).await.unwrap();
        assert!(store.release("k", "a").await.unwrap());
        assert!(store.try_acquire("k", "b", ttl).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn release_by_other_holder_is_noop() {
        let store = MemoryStore::new();
        store
            .try_acquire("k", "a", Duration::from_secs(30))
            .await
            .unwrap();
        assert!(!store.release("k", "b").await.unwrap());
        assert!(!store.release("missing", "a").await.unwrap());
        assert!(store.find_lock("k").await.unwrap().unwrap().is_active());
    }

    #[tokio::test]
    async fn expired_lock_is_taken_over() {
        let store = MemoryStore::new();
        store.try_acquire("k", "a", Duration::ZERO).await.unwrap();
        let stale = store.find_lock("k").await.unwrap().unwrap();
        assert!(stale.locked_at.is_some());

        let lease = store
            .try_acquire("k", "b", Duration::from_secs(30))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(lease.holder_id, "b");
    }

    #[tokio::test]
    async fn draft_reports_item_lock() {
        let store = MemoryStore::new();
        store.save_draft(ITEM, &serde_json::json!({})).await.unwrap();
        store
            .try_acquire(ITEM, "a", Duration::from_secs(30))
            .await
            .unwrap();
        let draft = store.find_draft(ITEM).await.unwrap().unwrap();
        assert!(draft.locked_at.is_some());
        assert!(draft.expires_at.is_some());
    }

    #[tokio::test]
    async fn cleanup_removes_only_dead_leases() {
        let store = MemoryStore::new();
        store.try_acquire("dead", "a", Duration::ZERO).await.unwrap();
        store
            .try_acquire("live", "a", Duration::from_secs(30))
            .await
            .unwrap();
        store
            .try_acquire("released", "a", Duration::from_secs(30))
            .await
            .unwrap();
        store.release("released", "a").await.unwrap();

        assert_eq!(store.cleanup_expired().await.unwrap(), 2);
        assert!(store.find_lock("live").await.unwrap().is_some());
        assert!(store.find_lock("dead").await.unwrap().is_none());
    }
}
