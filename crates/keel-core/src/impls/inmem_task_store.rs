//! Task stores for development and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{StoreError, TaskId, TaskPatch, TaskRecord};
use crate::ports::TaskStore;

/// Task records in a map.
///
/// Unknown ids are `NotFound`; a record in a terminal status refuses any
/// further status change.
#[derive(Default)]
pub struct InMemoryTaskStore {
    records: Mutex<HashMap<TaskId, TaskRecord>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task so later updates have something to land on.
    pub async fn insert(&self, record: TaskRecord) {
        self.records.lock().await.insert(record.id.clone(), record);
    }

    pub async fn get(&self, task_id: &TaskId) -> Option<TaskRecord> {
        self.records.lock().await.get(task_id).cloned()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn update(&self, task_id: &TaskId, patch: TaskPatch) -> Result<(), StoreError> {
        let mut records = self.records.lock().await;
        let record = records
            .get_mut(task_id)
            .ok_or_else(|| StoreError::NotFound(task_id.to_string()))?;

        if let Some(next) = patch.status
            && next != record.status
            && !record.status.can_advance_to(next)
        {
            return Err(StoreError::InvalidTransition {
                id: task_id.to_string(),
                from: record.status,
                to: next,
            });
        }

        record.apply(&patch);
        Ok(())
    }
}

/// Accepts every update and keeps nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTaskStore;

#[async_trait]
impl TaskStore for NoopTaskStore {
    async fn update(&self, _task_id: &TaskId, _patch: TaskPatch) -> Result<(), StoreError> {
        Ok(())
    }
}
