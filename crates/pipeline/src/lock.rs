//! Lease-based mutual exclusion over a shared [`LockStore`].
//!
//! Acquisition is a single conditional write in the store, so the lock holds
//! across tasks, processes and server instances sharing that store. Every
//! acquisition gets a fresh holder id; release only clears a lease that
//! still carries it, so a holder whose lease expired cannot free its
//! successor's lock.
//!
//! # Example
//!
//! ```ignore
//! let locks = LockManager::new(store, Duration::from_secs(30), RetryPolicy::default());
//!
//! let filename = locks
//!     .with_lock(&item_key(item_id), move || async move {
//!         // critical section
//!         Ok::<_, UploadError>(filename)
//!     })
//!     .await?;
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thrift_core::locking::LockLease;
use thrift_core::retry::RetryPolicy;
use thrift_core::store::LockStore;
use uuid::Uuid;

use crate::error::LockError;

/// Acquires and releases leases on string keys.
#[derive(Clone)]
pub struct LockManager {
    store: Arc<dyn LockStore>,
    ttl: Duration,
    retry: RetryPolicy,
}

impl LockManager {
    pub fn new(store: Arc<dyn LockStore>, ttl: Duration, retry: RetryPolicy) -> Self {
        Self { store, ttl, retry }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Try once to take the lock for `key`.
    ///
    /// Fails with [`LockError::Contention`] if a live lease exists.
    pub async fn acquire(&self, key: &str) -> Result<LockGuard, LockError> {
        let holder_id = Uuid::new_v4().to_string();
        match self.store.try_acquire(key, &holder_id, self.ttl).await? {
            Some(lease) => {
                tracing::trace!(lock_key = key, holder_id, "Lock acquired");
                Ok(LockGuard {
                    store: Arc::clone(&self.store),
                    lease,
                    ttl: self.ttl,
                    acquired: Instant::now(),
                    released: false,
                })
            }
            None => Err(LockError::Contention {
                key: key.to_string(),
            }),
        }
    }

    /// Take the lock for `key`, retrying contention per the retry policy.
    ///
    /// Fails with [`LockError::Timeout`] once every attempt was contended.
    pub async fn acquire_with_retry(&self, key: &str) -> Result<LockGuard, LockError> {
        let max_attempts = self.retry.max_attempts();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.acquire(key).await {
                Ok(guard) => return Ok(guard),
                Err(LockError::Contention { .. }) if attempt < max_attempts => {
                    let delay = self.retry.delay_for(attempt - 1);
                    tracing::debug!(
                        lock_key = key,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Lock contended, retrying",
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(LockError::Contention { .. }) => {
                    tracing::warn!(lock_key = key, attempts = attempt, "Gave up acquiring lock");
                    return Err(LockError::Timeout {
                        key: key.to_string(),
                        attempts: attempt,
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Release a lease by key and holder. Releasing a lock that is not held
    /// is a no-op.
    pub async fn release(&self, key: &str, holder_id: &str) -> Result<bool, LockError> {
        Ok(self.store.release(key, holder_id).await?)
    }

    /// Run `f` while holding the lock for `key`.
    ///
    /// The lock is taken with retries and released on every exit path: after
    /// `f` succeeds or fails, and through [`LockGuard`]'s drop if the future
    /// is cancelled or `f` panics. `f`'s error is returned after releasing.
    pub async fn with_lock<T, E, F, Fut>(&self, key: &str, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<LockError>,
    {
        let guard = self.acquire_with_retry(key).await?;
        let result = f().await;
        if let Err(e) = guard.release().await {
            tracing::warn!(lock_key = key, error = %e, "Lock release failed; lease will expire");
        }
        result
    }

    /// The stored lease for `key`, live or not.
    pub async fn inspect(&self, key: &str) -> Result<Option<LockLease>, LockError> {
        Ok(self.store.find_lock(key).await?)
    }

    /// Delete released and expired leases.
    pub async fn cleanup_expired(&self) -> Result<u64, LockError> {
        Ok(self.store.cleanup_expired().await?)
    }
}

/// A held lease. Release it with [`LockGuard::release`]; dropping an
/// unreleased guard schedules the release on the current runtime.
pub struct LockGuard {
    store: Arc<dyn LockStore>,
    lease: LockLease,
    ttl: Duration,
    acquired: Instant,
    released: bool,
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard")
            .field("lease", &self.lease)
            .field("ttl", &self.ttl)
            .field("acquired", &self.acquired)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

impl LockGuard {
    pub fn key(&self) -> &str {
        &self.lease.lock_key
    }

    pub fn holder_id(&self) -> &str {
        &self.lease.holder_id
    }

    pub fn lease(&self) -> &LockLease {
        &self.lease
    }

    /// Release the lease. Returns `false` if it had already expired and was
    /// taken over or cleared.
    pub async fn release(mut self) -> Result<bool, LockError> {
        let held_for = self.acquired.elapsed();
        if held_for > self.ttl / 2 {
            tracing::warn!(
                lock_key = %self.lease.lock_key,
                held_ms = held_for.as_millis() as u64,
                ttl_ms = self.ttl.as_millis() as u64,
                "Critical section ran past half of the lock TTL",
            );
        }

        let result = self
            .store
            .release(&self.lease.lock_key, &self.lease.holder_id)
            .await;
        self.released = true;

        let cleared = result?;
        if !cleared {
            tracing::warn!(
                lock_key = %self.lease.lock_key,
                "Lock was no longer held at release (expired)",
            );
        }
        Ok(cleared)
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let store = Arc::clone(&self.store);
        let key = self.lease.lock_key.clone();
        let holder_id = self.lease.holder_id.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::debug!(lock_key = %key, "Lock guard dropped, releasing in background");
                handle.spawn(async move {
                    if let Err(e) = store.release(&key, &holder_id).await {
                        tracing::warn!(lock_key = %key, error = %e, "Background lock release failed");
                    }
                });
            }
            Err(_) => {
                tracing::warn!(lock_key = %key, "Lock guard dropped outside a runtime; lease will expire");
            }
        }
    }
}

