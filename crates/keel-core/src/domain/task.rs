//! Task identity, status machine and the persisted task record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Caller-chosen task identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key under which the runner locks this task.
    pub fn lock_key(&self) -> String {
        format!("task:{}", self.0)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// One unit of work handed to the runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task<P> {
    pub id: TaskId,
    pub payload: P,
}

impl<P> Task<P> {
    pub fn new(id: impl Into<TaskId>, payload: P) -> Self {
        Self {
            id: id.into(),
            payload,
        }
    }
}

/// Task status.
///
/// Transitions only ever move forward:
/// - Pending -> Running -> Completed
/// - Pending -> Running -> Failed
/// - Pending -> Failed (lock contention, body never invoked)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Whether moving from `self` to `next` keeps the status monotonic.
    pub fn can_advance_to(self, next: TaskStatus) -> bool {
        match self {
            TaskStatus::Pending => true,
            TaskStatus::Running => next != TaskStatus::Pending,
            TaskStatus::Completed | TaskStatus::Failed => false,
        }
    }
}

/// Persisted view of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub status: TaskStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl TaskRecord {
    pub fn pending(id: impl Into<TaskId>) -> Self {
        Self {
            id: id.into(),
            status: TaskStatus::Pending,
            started_at: None,
            completed_at: None,
            output: None,
            error: None,
        }
    }

    /// Merge a partial update into the record. Fields left `None` in the
    /// patch are untouched.
    pub fn apply(&mut self, patch: &TaskPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(at) = patch.started_at {
            self.started_at = Some(at);
        }
        if let Some(at) = patch.completed_at {
            self.completed_at = Some(at);
        }
        if let Some(output) = &patch.output {
            self.output = Some(output.clone());
        }
        if let Some(error) = &patch.error {
            self.error = Some(error.clone());
        }
    }
}

/// Partial field update sent to the persistence collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskPatch {
    pub fn running(at: DateTime<Utc>) -> Self {
        Self {
            status: Some(TaskStatus::Running),
            started_at: Some(at),
            ..Self::default()
        }
    }

    pub fn completed(at: DateTime<Utc>, output: Option<serde_json::Value>) -> Self {
        Self {
            status: Some(TaskStatus::Completed),
            completed_at: Some(at),
            output,
            ..Self::default()
        }
    }

    pub fn failed(at: DateTime<Utc>, error: impl Into<String>) -> Self {
        Self {
            status: Some(TaskStatus::Failed),
            completed_at: Some(at),
            error: Some(error.into()),
            ..Self::default()
        }
    }
}
