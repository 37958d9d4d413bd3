//! Degenerate store used when no scoped client could be built.
//!
//! Reads answer with nothing; writes fail with [`StoreError::Unavailable`]
//! so a lost write is never reported as success.

use async_trait::async_trait;

use super::schema::{Record, RecordKey};
use super::store::{DataStore, Filter, QueryRequest, StoreError};

#[derive(Debug, Clone)]
pub struct EmptyStore {
    reason: String,
}

impl EmptyStore {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    fn unavailable(&self) -> StoreError {
        StoreError::Unavailable(self.reason.clone())
    }
}

#[async_trait]
impl DataStore for EmptyStore {
    async fn put_item(&self, _table: &str, _key: &RecordKey, _item: Record) -> Result<(), StoreError> {
        Err(self.unavailable())
    }

    async fn get_item(&self, _table: &str, _key: &RecordKey) -> Result<Option<Record>, StoreError> {
        Ok(None)
    }

    async fn update_item(
        &self,
        _table: &str,
        _key: &RecordKey,
        _changes: Record,
    ) -> Result<Record, StoreError> {
        Err(self.unavailable())
    }

    async fn delete_item(&self, _table: &str, _key: &RecordKey) -> Result<(), StoreError> {
        Err(self.unavailable())
    }

    async fn query(&self, _table: &str, _request: &QueryRequest) -> Result<Vec<Record>, StoreError> {
        Ok(Vec::new())
    }

    async fn scan(&self, _table: &str, _filter: &Filter) -> Result<Vec<Record>, StoreError> {
        Ok(Vec::new())
    }
}
