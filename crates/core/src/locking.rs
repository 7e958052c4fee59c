//! Lock durations, key namespaces and lease records.
//!
//! Locks are rows in a shared store keyed by an arbitrary string. Two key
//! namespaces are used per draft:
//!
//! - the raw item id, held for every mutation of a draft's image list
//! - `sequential-number-<item_id>`, held while a sequence number is chosen
//!
//! When both are needed they are always taken in that order.

use std::time::Duration;

use serde::Serialize;

use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default lock time-to-live in seconds.
pub const DEFAULT_LOCK_TTL_SECS: u64 = 30;

/// Default number of retries after the first failed acquisition.
pub const DEFAULT_LOCK_MAX_RETRIES: u32 = 10;

/// Default delay between acquisition attempts in milliseconds.
pub const DEFAULT_LOCK_RETRY_DELAY_MS: u64 = 1_000;

/// How often expired locks and stale staging files are swept (seconds).
pub const DEFAULT_MAINTENANCE_INTERVAL_SECS: u64 = 60;

/// Prefix of the sequence-allocation key namespace.
pub const SEQUENCE_KEY_PREFIX: &str = "sequential-number-";

/// Default lock time-to-live.
pub fn default_lock_ttl() -> Duration {
    Duration::from_secs(DEFAULT_LOCK_TTL_SECS)
}

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// Key guarding all mutations of a draft and its image list.
pub fn item_key(item_id: &str) -> String {
    item_id.to_string()
}

/// Key guarding sequence number selection for a draft.
pub fn sequence_key(item_id: &str) -> String {
    format!("{SEQUENCE_KEY_PREFIX}{item_id}")
}

// ---------------------------------------------------------------------------
// LockLease
// ---------------------------------------------------------------------------

/// A lock row as stored.
///
/// `locked_at`/`expires_at` are `None` once the lock has been released.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockLease {
    pub lock_key: String,
    pub holder_id: String,
    pub locked_at: Option<Timestamp>,
    pub expires_at: Option<Timestamp>,
}

impl LockLease {
    /// Returns `true` if the lease is held and its expiry lies in the future
    /// relative to `now`.
    pub fn is_active_at(&self, now: Timestamp) -> bool {
        matches!(self.expires_at, Some(expires_at) if expires_at > now)
    }

    /// Returns `true` if the lease is currently held.
    pub fn is_active(&self) -> bool {
        self.is_active_at(chrono::Utc::now())
    }

    /// Time left before the lease expires, zero if expired or released.
    pub fn remaining(&self) -> Duration {
        self.expires_at
            .map(|e| e - chrono::Utc::now())
            .and_then(|d| d.to_std().ok())
            .unwrap_or(Duration::ZERO)
    }
}

/// Convert a TTL into a chrono duration, saturating on overflow.
pub fn ttl_to_chrono(ttl: Duration) -> chrono::Duration {
    chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn lease(expires_in_secs: Option<i64>) -> LockLease {
        let now = Utc::now();
        LockLease {
            lock_key: "abc123".into(),
            holder_id: "holder".into(),
            locked_at: expires_in_secs.map(|_| now),
            expires_at: expires_in_secs.map(|s| now + chrono::Duration::seconds(s)),
        }
    }

    #[test]
    fn keys_use_distinct_namespaces() {
        assert_eq!(item_key("abc123"), "abc123");
        assert_eq!(sequence_key("abc123"), "sequential-number-abc123");
        assert_ne!(item_key("abc123"), sequence_key("abc123"));
    }

    #[test]
    fn future_expiry_is_active() {
        assert!(lease(Some(30)).is_active());
    }

    #[test]
    fn past_expiry_is_inactive() {
        assert!(!lease(Some(-1)).is_active());
        assert_eq!(lease(Some(-1)).remaining(), Duration::ZERO);
    }

    #[test]
    fn released_lease_is_inactive() {
        assert!(!lease(None).is_active());
    }

    #[test]
    fn expiry_equal_to_now_is_inactive() {
        let l = lease(Some(0));
        assert!(!l.is_active_at(l.expires_at.unwrap()));
    }
}
