//! PostgreSQL implementation of the store traits.

use std::time::Duration;

use async_trait::async_trait;
use thrift_core::draft::{AppendMode, DraftItem, ImageRecord, NewImageRecord};
use thrift_core::locking::LockLease;
use thrift_core::store::{DraftStore, LockStore, RemoveOutcome, StoreError};

use crate::repositories::{DraftRepo, LockRepo};
use crate::DbPool;

/// PostgreSQL error code for unique constraint violations.
const UNIQUE_VIOLATION: &str = "23505";

/// Draft, image and lock persistence backed by PostgreSQL.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    async fn load(&self, item_id: &str) -> Result<Option<DraftItem>, sqlx::Error> {
        let Some(row) = DraftRepo::find_row(&self.pool, item_id).await? else {
            return Ok(None);
        };
        let images = DraftRepo::list_images(&self.pool, item_id).await?;
        Ok(Some(row.into_draft(images)))
    }

    /// Load a draft that was just written in this call.
    async fn reload(&self, item_id: &str) -> Result<DraftItem, StoreError> {
        self.load(item_id)
            .await
            .map_err(map_sqlx_error)?
            .ok_or_else(|| StoreError::backend(sqlx::Error::RowNotFound))
    }
}

/// Map a sqlx error onto [`StoreError`], keeping unique violations distinct.
fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
            let constraint = db_err.constraint().unwrap_or("unknown").to_string();
            tracing::debug!(constraint = %constraint, "Unique constraint violation");
            return StoreError::Duplicate(constraint);
        }
    }
    StoreError::backend(err)
}

#[async_trait]
impl DraftStore for PgStore {
    async fn find_draft(&self, item_id: &str) -> Result<Option<DraftItem>, StoreError> {
        self.load(item_id).await.map_err(map_sqlx_error)
    }

    async fn find_images(&self, item_id: &str) -> Result<Option<Vec<ImageRecord>>, StoreError> {
        if !DraftRepo::exists(&self.pool, item_id)
            .await
            .map_err(map_sqlx_error)?
        {
            return Ok(None);
        }
        let rows = DraftRepo::list_images(&self.pool, item_id)
            .await
            .map_err(map_sqlx_error)?;
        Ok(Some(rows.into_iter().map(ImageRecord::from).collect()))
    }

    async fn save_draft(
        &self,
        item_id: &str,
        payload: &serde_json::Value,
    ) -> Result<DraftItem, StoreError> {
        DraftRepo::save(&self.pool, item_id, payload)
            .await
            .map_err(map_sqlx_error)?;
        self.reload(item_id).await
    }

    async fn append_image(
        &self,
        item_id: &str,
        image: &NewImageRecord,
        mode: AppendMode,
    ) -> Result<Option<DraftItem>, StoreError> {
        let appended = DraftRepo::append_image(
            &self.pool,
            item_id,
            image.id,
            &image.filename,
            &image.url,
            mode == AppendMode::CreateIfMissing,
        )
        .await
        .map_err(map_sqlx_error)?;

        if !appended {
            return Ok(None);
        }
        self.reload(item_id).await.map(Some)
    }

    async fn remove_image(
        &self,
        item_id: &str,
        filename: &str,
    ) -> Result<RemoveOutcome, StoreError> {
        if !DraftRepo::exists(&self.pool, item_id)
            .await
            .map_err(map_sqlx_error)?
        {
            return Ok(RemoveOutcome::ItemMissing);
        }
        let removed = DraftRepo::remove_image(&self.pool, item_id, filename)
            .await
            .map_err(map_sqlx_error)?;
        if !removed {
            return Ok(RemoveOutcome::ImageMissing);
        }
        self.reload(item_id).await.map(RemoveOutcome::Removed)
    }

    async fn delete_draft(&self, item_id: &str) -> Result<bool, StoreError> {
        DraftRepo::delete(&self.pool, item_id)
            .await
            .map_err(map_sqlx_error)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        crate::health_check(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }
}

#[async_trait]
impl LockStore for PgStore {
    async fn try_acquire(
        &self,
        key: &str,
        holder_id: &str,
        ttl: Duration,
    ) -> Result<Option<LockLease>, StoreError> {
        LockRepo::try_acquire(&self.pool, key, holder_id, ttl)
            .await
            .map(|row| row.map(LockLease::from))
            .map_err(map_sqlx_error)
    }

    async fn release(&self, key: &str, holder_id: &str) -> Result<bool, StoreError> {
        LockRepo::release(&self.pool, key, holder_id)
            .await
            .map_err(map_sqlx_error)
    }

    async fn find_lock(&self, key: &str) -> Result<Option<LockLease>, StoreError> {
        LockRepo::find(&self.pool, key)
            .await
            .map(|row| row.map(LockLease::from))
            .map_err(map_sqlx_error)
    }

    async fn cleanup_expired(&self) -> Result<u64, StoreError> {
        LockRepo::cleanup_expired(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }
}
