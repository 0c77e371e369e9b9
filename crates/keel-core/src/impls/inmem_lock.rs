//! InMemoryLockStore - single-process lock map.
//!
//! Every operation runs under one mutex and does no I/O while holding it, so
//! the check and the write of `compare_and_set` are atomic.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::{Lock, StoreError};
use crate::ports::{CasOutcome, LockStore};

#[derive(Default)]
pub struct InMemoryLockStore {
    locks: Mutex<HashMap<String, Lock>>,
}

impl InMemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.locks.lock().await.is_empty()
    }
}

#[async_trait]
impl LockStore for InMemoryLockStore {
    async fn compare_and_set(
        &self,
        lock: Lock,
        now: DateTime<Utc>,
    ) -> Result<CasOutcome, StoreError> {
        let mut locks = self.locks.lock().await;
        if let Some(current) = locks.get(&lock.key)
            && !current.admits(&lock.owner, now)
        {
            return Ok(CasOutcome::HeldBy(current.clone()));
        }
        locks.insert(lock.key.clone(), lock);
        Ok(CasOutcome::Stored)
    }

    async fn extend(
        &self,
        key: &str,
        owner: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<CasOutcome, StoreError> {
        let mut locks = self.locks.lock().await;
        match locks.get_mut(key) {
            Some(current) if current.is_expired(now) => Ok(CasOutcome::Missing),
            Some(current) if current.is_owned_by(owner) => {
                current.expires_at = expires_at;
                Ok(CasOutcome::Stored)
            }
            Some(current) => Ok(CasOutcome::HeldBy(current.clone())),
            None => Ok(CasOutcome::Missing),
        }
    }

    async fn remove_if_owner(&self, key: &str, owner: &str) -> Result<bool, StoreError> {
        let mut locks = self.locks.lock().await;
        if locks.get(key).is_some_and(|l| l.is_owned_by(owner)) {
            locks.remove(key);
            return Ok(true);
        }
        Ok(false)
    }

    async fn get(&self, key: &str) -> Result<Option<Lock>, StoreError> {
        Ok(self.locks.lock().await.get(key).cloned())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut locks = self.locks.lock().await;
        let before = locks.len();
        locks.retain(|_, lock| !lock.is_expired(now));
        Ok(before - locks.len())
    }
}
