//! InMemoryFailureStore - failure records keyed by resource.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{FailureRecord, StoreError};
use crate::ports::FailureStore;

#[derive(Default)]
pub struct InMemoryFailureStore {
    records: Mutex<HashMap<String, FailureRecord>>,
}

impl InMemoryFailureStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FailureStore for InMemoryFailureStore {
    async fn get(&self, resource_key: &str) -> Result<Option<FailureRecord>, StoreError> {
        Ok(self.records.lock().await.get(resource_key).cloned())
    }

    async fn put(&self, record: FailureRecord) -> Result<(), StoreError> {
        self.records
            .lock()
            .await
            .insert(record.resource_key.clone(), record);
        Ok(())
    }

    async fn remove(&self, resource_key: &str) -> Result<Option<FailureRecord>, StoreError> {
        Ok(self.records.lock().await.remove(resource_key))
    }

    async fn list(&self) -> Result<Vec<FailureRecord>, StoreError> {
        let mut records: Vec<FailureRecord> =
            self.records.lock().await.values().cloned().collect();
        records.sort_by(|a, b| {
            a.next_retry_at
                .cmp(&b.next_retry_at)
                .then_with(|| a.resource_key.cmp(&b.resource_key))
        });
        Ok(records)
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.records.lock().await.clear();
        Ok(())
    }
}
