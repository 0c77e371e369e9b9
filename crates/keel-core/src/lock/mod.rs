//! Lock manager: short-lived, named, owned locks.
//!
//! Expiry is evaluated lazily against the injected clock whenever a lock is
//! consulted. An expired entry is as good as absent, which is how a crashed
//! holder gets recovered without a watchdog. Mutual exclusion only holds
//! among callers that share the same [`LockStore`].
//!
//! # 方針
//! - TTL なしのロックは作らない（holder が落ちたら key が永久に塞がる）
//! - 複数インスタンスで使う場合は共有ストア（Redis 等）を LockStore として差し込む

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::{Lock, StoreError};
use crate::impls::InMemoryLockStore;
use crate::ports::{CasOutcome, Clock, LockStore, SystemClock, deadline};

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock {key} is already held by {holder}")]
    AlreadyLocked { key: String, holder: String },

    #[error("lock {key} is not held by {owner}")]
    NotHeld { key: String, owner: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LockError {
    pub fn code(&self) -> &'static str {
        match self {
            LockError::AlreadyLocked { .. } => "ALREADY_LOCKED",
            LockError::NotHeld { .. } => "NOT_HELD",
            LockError::Store(_) => "STORE_ERROR",
        }
    }
}

#[derive(Clone)]
pub struct LockManager {
    store: Arc<dyn LockStore>,
    clock: Arc<dyn Clock>,
}

impl LockManager {
    pub fn new(store: Arc<dyn LockStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Process-local manager on the wall clock.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryLockStore::new()), Arc::new(SystemClock))
    }

    /// Take `key` for `owner` for `ttl`.
    ///
    /// Succeeds when the key is free, expired, or already held by `owner`
    /// (re-acquiring refreshes the deadline).
    pub async fn acquire(&self, key: &str, owner: &str, ttl: Duration) -> Result<(), LockError> {
        let now = self.clock.now();
        let lock = Lock::new(key, owner, deadline(now, ttl));
        match self.store.compare_and_set(lock, now).await? {
            CasOutcome::HeldBy(current) => {
                debug!(key, owner, holder = %current.owner, "lock busy");
                Err(LockError::AlreadyLocked {
                    key: key.to_string(),
                    holder: current.owner,
                })
            }
            CasOutcome::Stored | CasOutcome::Missing => {
                debug!(key, owner, ttl_ms = ttl.as_millis() as u64, "lock acquired");
                Ok(())
            }
        }
    }

    /// Drop `key` if `owner` holds it. Never fails: releasing a lock you do
    /// not hold, or one that already expired, does nothing.
    pub async fn release(&self, key: &str, owner: &str) {
        match self.store.remove_if_owner(key, owner).await {
            Ok(true) => debug!(key, owner, "lock released"),
            Ok(false) => debug!(key, owner, "release skipped, not the holder"),
            Err(err) => warn!(key, owner, error = %err, "lock release failed"),
        }
    }

    /// True iff a live lock exists for `key`. A store failure reads as
    /// unlocked.
    pub async fn is_locked(&self, key: &str) -> bool {
        match self.holder(key).await {
            Ok(holder) => holder.is_some(),
            Err(err) => {
                warn!(key, error = %err, "lock lookup failed");
                false
            }
        }
    }

    /// Push the deadline of a lock `owner` currently holds.
    pub async fn renew(&self, key: &str, owner: &str, ttl: Duration) -> Result<(), LockError> {
        let now = self.clock.now();
        match self.store.extend(key, owner, deadline(now, ttl), now).await? {
            CasOutcome::Stored => Ok(()),
            CasOutcome::HeldBy(current) => Err(LockError::AlreadyLocked {
                key: key.to_string(),
                holder: current.owner,
            }),
            CasOutcome::Missing => Err(LockError::NotHeld {
                key: key.to_string(),
                owner: owner.to_string(),
            }),
        }
    }

    /// The live lock for `key`, if any.
    pub async fn holder(&self, key: &str) -> Result<Option<Lock>, LockError> {
        let now = self.clock.now();
        Ok(self
            .store
            .get(key)
            .await?
            .filter(|lock| !lock.is_expired(now)))
    }

    pub async fn purge_expired(&self) -> Result<usize, LockError> {
        Ok(self.store.purge_expired(self.clock.now()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::ManualClock;
    use chrono::{TimeZone, Utc};

    fn manager() -> (LockManager, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap(),
        ));
        let mgr = LockManager::new(Arc::new(InMemoryLockStore::new()), clock.clone());
        (mgr, clock)
    }

    const TTL: Duration = Duration::from_millis(1000);

    #[tokio::test]
    async fn second_owner_waits_for_release() {
        let (mgr, _) = manager();

        mgr.acquire("task:1", "A", TTL).await.unwrap();
        let err = mgr.acquire("task:1", "B", TTL).await.unwrap_err();
        assert_eq!(err.code(), "ALREADY_LOCKED");

        mgr.release("task:1", "A").await;
        mgr.acquire("task:1", "B", TTL).await.unwrap();
        assert_eq!(mgr.holder("task:1").await.unwrap().unwrap().owner, "B");
    }

    #[tokio::test]
    async fn same_owner_may_reacquire() {
        let (mgr, _) = manager();
        mgr.acquire("k", "A", TTL).await.unwrap();
        mgr.acquire("k", "A", TTL).await.unwrap();
        assert!(mgr.is_locked("k").await);
    }

    #[tokio::test]
    async fn expired_lock_counts_as_absent() {
        let (mgr, clock) = manager();
        mgr.acquire("k", "A", TTL).await.unwrap();

        clock.advance(Duration::from_millis(999));
        assert!(mgr.is_locked("k").await);

        clock.advance(Duration::from_millis(1));
        assert!(!mgr.is_locked("k").await);
        mgr.acquire("k", "B", TTL).await.unwrap();
    }

    #[tokio::test]
    async fn release_by_stranger_is_a_noop() {
        let (mgr, _) = manager();
        mgr.acquire("k", "A", TTL).await.unwrap();

        mgr.release("k", "B").await;
        assert!(mgr.is_locked("k").await);

        mgr.release("missing", "A").await;
    }

    #[tokio::test]
    async fn renew_extends_deadline() {
        let (mgr, clock) = manager();
        mgr.acquire("k", "A", TTL).await.unwrap();

        clock.advance(Duration::from_millis(800));
        mgr.renew("k", "A", TTL).await.unwrap();
        clock.advance(Duration::from_millis(800));
        assert!(mgr.is_locked("k").await);

        assert!(matches!(
            mgr.renew("k", "B", TTL).await,
            Err(LockError::AlreadyLocked { .. })
        ));

        clock.advance(Duration::from_millis(1000));
        assert!(matches!(
            mgr.renew("k", "A", TTL).await,
            Err(LockError::NotHeld { .. })
        ));
    }

    #[tokio::test]
    async fn purge_removes_stale_entries() {
        let (mgr, clock) = manager();
        mgr.acquire("a", "A", TTL).await.unwrap();
        mgr.acquire("b", "A", Duration::from_secs(60)).await.unwrap();

        clock.advance(Duration::from_secs(2));
        assert_eq!(mgr.purge_expired().await.unwrap(), 1);
        assert!(mgr.is_locked("b").await);
    }

    #[tokio::test]
    async fn concurrent_acquire_has_one_winner() {
        let mgr = LockManager::in_memory();
        let mut joins = Vec::new();
        for i in 0..16 {
            let mgr = mgr.clone();
            joins.push(tokio::spawn(async move {
                mgr.acquire("hot", &format!("owner-{i}"), Duration::from_secs(30))
                    .await
                    .is_ok()
            }));
        }

        let mut winners = 0;
        for j in joins {
            if j.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
