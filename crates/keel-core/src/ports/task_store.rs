//! TaskStore port - where the task runner records status transitions.
//!
//! Writes are best-effort from the runner's point of view: any error here is
//! logged and dropped.

use async_trait::async_trait;

use crate::domain::{StoreError, TaskId, TaskPatch};

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Apply a partial update. Unknown ids yield `StoreError::NotFound`.
    async fn update(&self, task_id: &TaskId, patch: TaskPatch) -> Result<(), StoreError>;
}
