//! Repository for the `draft_items` and `draft_images` tables.

use sqlx::PgPool;
use thrift_core::naming::parse_sequence_number;

use crate::models::draft::{DraftImageRow, DraftItemRow};

/// Column list for draft queries. Lock columns come from the live lease on
/// the raw item key, if any.
const DRAFT_COLUMNS: &str = "d.item_id, d.payload, l.locked_at, l.expires_at, \
                             d.created_at, d.updated_at";

/// Column list for image queries.
const IMAGE_COLUMNS: &str = "id, filename, url, is_new, created_at";

/// Provides persistence operations for drafts and their image records.
pub struct DraftRepo;

impl DraftRepo {
    /// Find a draft row by item id.
    pub async fn find_row(pool: &PgPool, item_id: &str) -> Result<Option<DraftItemRow>, sqlx::Error> {
        let query = format!(
            "SELECT {DRAFT_COLUMNS} FROM draft_items d \
             LEFT JOIN draft_locks l ON l.lock_key = d.item_id AND l.expires_at > NOW() \
             WHERE d.item_id = $1"
        );
        sqlx::query_as::<_, DraftItemRow>(&query)
            .bind(item_id)
            .fetch_optional(pool)
            .await
    }

    /// List a draft's images in upload order.
    pub async fn list_images(pool: &PgPool, item_id: &str) -> Result<Vec<DraftImageRow>, sqlx::Error> {
        let query = format!(
            "SELECT {IMAGE_COLUMNS} FROM draft_images \
             WHERE item_id = $1 \
             ORDER BY position ASC"
        );
        sqlx::query_as::<_, DraftImageRow>(&query)
            .bind(item_id)
            .fetch_all(pool)
            .await
    }

    /// Returns `true` if a draft exists for `item_id`.
    pub async fn exists(pool: &PgPool, item_id: &str) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM draft_items WHERE item_id = $1)",
        )
        .bind(item_id)
        .fetch_one(pool)
        .await
    }

    /// Upsert a draft's payload and mark all of its images as no longer new.
    pub async fn save(
        pool: &PgPool,
        item_id: &str,
        payload: &serde_json::Value,
    ) -> Result<(), sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query(
            "INSERT INTO draft_items (item_id, payload) VALUES ($1, $2) \
             ON CONFLICT (item_id) DO UPDATE \
             SET payload = EXCLUDED.payload, updated_at = NOW()",
        )
        .bind(item_id)
        .bind(payload)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE draft_images SET is_new = false WHERE item_id = $1 AND is_new = true")
            .bind(item_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await
    }

    /// Append an image record to a draft.
    ///
    /// When `create_missing` is set, a missing draft is created with an empty
    /// payload. Otherwise a missing draft leaves the database untouched and
    /// `false` is returned.
    pub async fn append_image(
        pool: &PgPool,
        item_id: &str,
        id: uuid::Uuid,
        filename: &str,
        url: &str,
        create_missing: bool,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = pool.begin().await?;

        if create_missing {
            sqlx::query(
                "INSERT INTO draft_items (item_id) VALUES ($1) ON CONFLICT (item_id) DO NOTHING",
            )
            .bind(item_id)
            .execute(&mut *tx)
            .await?;
        }

        // Row lock keeps a concurrent draft delete from slipping in between
        // the existence check and the insert.
        let present = sqlx::query_scalar::<_, String>(
            "SELECT item_id FROM draft_items WHERE item_id = $1 FOR UPDATE",
        )
        .bind(item_id)
        .fetch_optional(&mut *tx)
        .await?;

        if present.is_none() {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            "INSERT INTO draft_images (id, item_id, filename, sequence_number, url) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(id)
        .bind(item_id)
        .bind(filename)
        .bind(parse_sequence_number(filename).map(|n| n as i32))
        .bind(url)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE draft_items SET updated_at = NOW() WHERE item_id = $1")
            .bind(item_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Remove the image with `filename` from a draft. Returns `true` if a row
    /// was removed.
    pub async fn remove_image(pool: &PgPool, item_id: &str, filename: &str) -> Result<bool, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let result = sqlx::query("DELETE FROM draft_images WHERE item_id = $1 AND filename = $2")
            .bind(item_id)
            .bind(filename)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() > 0 {
            sqlx::query("UPDATE draft_items SET updated_at = NOW() WHERE item_id = $1")
                .bind(item_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a draft; its images cascade. Returns `true` if a row was removed.
    pub async fn delete(pool: &PgPool, item_id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM draft_items WHERE item_id = $1")
            .bind(item_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
