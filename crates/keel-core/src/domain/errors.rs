//! Error taxonomy and the error shapes that cross component boundaries.
//!
//! - [`CallError`]: one external call (transport, status check, publish).
//! - [`BodyError`]: a business failure returned by a unit of work.
//! - [`TaskError`]: what `TaskRunner::run` hands back, whatever went wrong.
//! - [`StoreError`]: a persistence collaborator failure.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::task::TaskStatus;

/// Operational classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Another owner holds the task lock.
    LockContention,
    /// Business rule violation reported by a unit of work.
    BodyError,
    /// The unit of work panicked.
    UnexpectedException,
    /// Network or infrastructure failure talking to an external service.
    #[serde(rename = "TRANSPORT_ERROR")]
    Transport,
    /// Well-formed rejection by an external service (4xx other than 429).
    #[serde(rename = "CLIENT_ERROR")]
    Client,
    /// Transport succeeded but the payload lacks a required part.
    InvalidResponse,
    /// An external asynchronous job reported failure.
    JobFailed,
    /// Polling exceeded its budget.
    Timeout,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::LockContention => "LOCK_CONTENTION",
            ErrorKind::BodyError => "BODY_ERROR",
            ErrorKind::UnexpectedException => "UNEXPECTED_EXCEPTION",
            ErrorKind::Transport => "TRANSPORT_ERROR",
            ErrorKind::Client => "CLIENT_ERROR",
            ErrorKind::InvalidResponse => "INVALID_RESPONSE",
            ErrorKind::JobFailed => "JOB_FAILED",
            ErrorKind::Timeout => "TIMEOUT",
        }
    }

    pub fn is_retryable_by_default(self) -> bool {
        matches!(
            self,
            ErrorKind::Transport | ErrorKind::JobFailed | ErrorKind::Timeout
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Anything the retry executor can classify.
pub trait Retryable {
    fn is_retryable(&self) -> bool;

    fn status_code(&self) -> Option<u16> {
        None
    }
}

/// Failure of a single external call.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct CallError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    pub retryable: bool,
}

impl CallError {
    /// Classify an HTTP-shaped failure: 5xx and 429 are retryable, any
    /// other status is a client error.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let retryable = status >= 500 || status == 429;
        Self {
            kind: if retryable {
                ErrorKind::Transport
            } else {
                ErrorKind::Client
            },
            message: message.into(),
            status_code: Some(status),
            retryable,
        }
    }

    /// Network-level failure with no status code.
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Transport,
            message: message.into(),
            status_code: None,
            retryable: true,
        }
    }

    /// The call went through but the response is structurally unusable.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::InvalidResponse,
            message: message.into(),
            status_code: None,
            retryable: false,
        }
    }

    pub fn job_failed(reason: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::JobFailed,
            message: reason.into(),
            status_code: None,
            retryable: true,
        }
    }

    pub fn timeout(elapsed: Duration) -> Self {
        Self {
            kind: ErrorKind::Timeout,
            message: format!("polling timed out after {}ms", elapsed.as_millis()),
            status_code: None,
            retryable: true,
        }
    }

    /// Same error, but not retryable.
    pub fn into_fatal(mut self) -> Self {
        self.retryable = false;
        self
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status_code == Some(429)
    }
}

impl Retryable for CallError {
    fn is_retryable(&self) -> bool {
        self.retryable
    }

    fn status_code(&self) -> Option<u16> {
        self.status_code
    }
}

/// Business failure returned by a unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct BodyError {
    pub message: String,
    pub cause: Option<String>,
    pub retryable: bool,
}

impl BodyError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
            retryable: false,
        }
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }
}

impl From<CallError> for BodyError {
    fn from(err: CallError) -> Self {
        Self {
            message: err.message,
            cause: Some(err.kind.to_string()),
            retryable: err.retryable,
        }
    }
}

/// The single failure shape returned by the task runner.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("[{agent}] {kind}: {message}")]
pub struct TaskError {
    pub kind: ErrorKind,
    /// Name of the unit of work that was being run.
    pub agent: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
    pub retryable: bool,
}

impl TaskError {
    pub fn lock_contention(agent: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::LockContention,
            agent: agent.into(),
            message: message.into(),
            cause: None,
            retryable: false,
        }
    }

    pub fn body(agent: impl Into<String>, err: BodyError) -> Self {
        Self {
            kind: ErrorKind::BodyError,
            agent: agent.into(),
            message: err.message,
            cause: err.cause,
            retryable: err.retryable,
        }
    }

    pub fn unexpected(agent: impl Into<String>, panic_message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::UnexpectedException,
            agent: agent.into(),
            message: panic_message.into(),
            cause: Some("panic".to_string()),
            retryable: false,
        }
    }
}

impl Retryable for TaskError {
    fn is_retryable(&self) -> bool {
        self.retryable
    }
}

/// Failure of a persistence collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("invalid status transition for {id}: {from:?} -> {to:?}")]
    InvalidTransition {
        id: String,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("store backend error: {0}")]
    Backend(String),
}
