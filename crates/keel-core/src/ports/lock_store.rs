//! LockStore port - backing storage for the lock manager.
//!
//! Every mutation must be atomic with respect to other callers of the same
//! store (compare-and-set: "set only if absent, expired, or owned by me").
//! Implementations must not hold an internal lock across external I/O.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{Lock, StoreError};

/// Result of a conditional write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasOutcome {
    /// The write was applied.
    Stored,
    /// A live lock owned by someone else is in the way.
    HeldBy(Lock),
    /// There is no live lock to act on.
    Missing,
}

#[async_trait]
pub trait LockStore: Send + Sync {
    /// Store `lock` unless a non-expired entry with a different owner exists.
    /// Returns `Stored` or `HeldBy`.
    async fn compare_and_set(&self, lock: Lock, now: DateTime<Utc>)
    -> Result<CasOutcome, StoreError>;

    /// Move the deadline of a live lock held by `owner`.
    async fn extend(
        &self,
        key: &str,
        owner: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<CasOutcome, StoreError>;

    /// Delete the entry for `key` only if `owner` holds it. Returns whether
    /// something was removed.
    async fn remove_if_owner(&self, key: &str, owner: &str) -> Result<bool, StoreError>;

    /// Raw entry for `key`, expired or not.
    async fn get(&self, key: &str) -> Result<Option<Lock>, StoreError>;

    /// Drop expired entries; returns how many went away.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError>;
}
