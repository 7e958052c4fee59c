//! Repository for the `draft_locks` table.

use std::time::Duration;

use sqlx::PgPool;

use crate::models::lock::DraftLockRow;

/// Column list for `draft_locks` queries.
const LOCK_COLUMNS: &str = "lock_key, holder_id, locked_at, expires_at";

/// Provides lease operations on `draft_locks`.
pub struct LockRepo;

impl LockRepo {
    /// Attempt to take the lock for `lock_key`.
    ///
    /// Inserts a lease, or overwrites an existing one whose `expires_at` is
    /// NULL or in the past. A live lease held by someone else makes the
    /// upsert a no-op and `None` is returned.
    pub async fn try_acquire(
        pool: &PgPool,
        lock_key: &str,
        holder_id: &str,
        ttl: Duration,
    ) -> Result<Option<DraftLockRow>, sqlx::Error> {
        let query = format!(
            "INSERT INTO draft_locks (lock_key, holder_id, locked_at, expires_at) \
             VALUES ($1, $2, NOW(), NOW() + make_interval(secs => $3)) \
             ON CONFLICT (lock_key) DO UPDATE \
             SET holder_id = EXCLUDED.holder_id, \
                 locked_at = EXCLUDED.locked_at, \
                 expires_at = EXCLUDED.expires_at \
             WHERE draft_locks.expires_at IS NULL OR draft_locks.expires_at <= NOW() \
             RETURNING {LOCK_COLUMNS}"
        );
        sqlx::query_as::<_, DraftLockRow>(&query)
            .bind(lock_key)
            .bind(holder_id)
            .bind(ttl.as_secs_f64())
            .fetch_optional(pool)
            .await
    }

    /// Clear the lease for `lock_key` if `holder_id` still owns it.
    ///
    /// Returns `true` if a lease was cleared.
    pub async fn release(pool: &PgPool, lock_key: &str, holder_id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE draft_locks SET locked_at = NULL, expires_at = NULL \
             WHERE lock_key = $1 AND holder_id = $2 AND expires_at IS NOT NULL",
        )
        .bind(lock_key)
        .bind(holder_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Get the stored lease for `lock_key`, live or not.
    pub async fn find(pool: &PgPool, lock_key: &str) -> Result<Option<DraftLockRow>, sqlx::Error> {
        let query = format!("SELECT {LOCK_COLUMNS} FROM draft_locks WHERE lock_key = $1");
        sqlx::query_as::<_, DraftLockRow>(&query)
            .bind(lock_key)
            .fetch_optional(pool)
            .await
    }

    /// Delete released and expired leases. Returns the number of rows removed.
    pub async fn cleanup_expired(pool: &PgPool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM draft_locks WHERE expires_at IS NULL OR expires_at <= NOW()",
        )
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
