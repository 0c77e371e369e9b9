//! FailureStore port - the failure tracker's record map.
//!
//! One record per resource key; `put` replaces whatever was there.

use async_trait::async_trait;

use crate::domain::{FailureRecord, StoreError};

#[async_trait]
pub trait FailureStore: Send + Sync {
    async fn get(&self, resource_key: &str) -> Result<Option<FailureRecord>, StoreError>;

    async fn put(&self, record: FailureRecord) -> Result<(), StoreError>;

    async fn remove(&self, resource_key: &str) -> Result<Option<FailureRecord>, StoreError>;

    async fn list(&self) -> Result<Vec<FailureRecord>, StoreError>;

    async fn clear(&self) -> Result<(), StoreError>;
}
