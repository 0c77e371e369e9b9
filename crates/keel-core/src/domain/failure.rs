//! Failure records kept by the failure tracker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::{CallError, TaskError};

/// The last error observed for a tracked resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastError {
    pub message: String,
    pub retryable: bool,
}

impl LastError {
    pub fn new(message: impl Into<String>, retryable: bool) -> Self {
        Self {
            message: message.into(),
            retryable,
        }
    }
}

impl From<&CallError> for LastError {
    fn from(err: &CallError) -> Self {
        Self::new(err.to_string(), err.retryable)
    }
}

impl From<CallError> for LastError {
    fn from(err: CallError) -> Self {
        Self::from(&err)
    }
}

impl From<&TaskError> for LastError {
    fn from(err: &TaskError) -> Self {
        Self::new(err.to_string(), err.retryable)
    }
}

/// One outstanding failure for a resource key.
///
/// `next_retry_at` is always derived by the tracker:
/// `last_attempt_at + base_delay * 2^(attempts - 1)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub resource_key: String,
    pub attempts: u32,
    pub last_error: LastError,
    pub last_attempt_at: DateTime<Utc>,
    pub next_retry_at: DateTime<Utc>,
}

impl FailureRecord {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_retry_at <= now
    }
}
