//! Named, owned, expiring lock entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A lock as held in a lock store.
///
/// An entry whose `expires_at` has passed is treated as absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lock {
    pub key: String,
    pub owner: String,
    pub expires_at: DateTime<Utc>,
}

impl Lock {
    pub fn new(key: impl Into<String>, owner: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            owner: owner.into(),
            expires_at,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_owned_by(&self, owner: &str) -> bool {
        self.owner == owner
    }

    /// Whether `owner` may take this key at `now`.
    pub fn admits(&self, owner: &str, now: DateTime<Utc>) -> bool {
        self.is_expired(now) || self.is_owned_by(owner)
    }
}
