//! Rows of the `draft_locks` table.

use sqlx::FromRow;
use thrift_core::locking::LockLease;
use thrift_core::types::Timestamp;

/// A row from `draft_locks`.
#[derive(Debug, Clone, FromRow)]
pub struct DraftLockRow {
    pub lock_key: String,
    pub holder_id: String,
    pub locked_at: Option<Timestamp>,
    pub expires_at: Option<Timestamp>,
}

impl From<DraftLockRow> for LockLease {
    fn from(row: DraftLockRow) -> Self {
        LockLease {
            lock_key: row.lock_key,
            holder_id: row.holder_id,
            locked_at: row.locked_at,
            expires_at: row.expires_at,
        }
    }
}
