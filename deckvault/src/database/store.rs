//! Data store abstraction.
//!
//! A [`DataStore`] is a key-value document store addressed by table name;
//! a [`StoreConnector`] builds one from a scoped credential.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use super::schema::{Record, RecordKey};
use crate::credentials::ScopedCredential;

/// Default transport-level max attempts for data-store clients.
pub const DEFAULT_STORE_MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The request was rejected as malformed (bad key, bad expression, missing index).
    #[error("Validation error: {0}")]
    Validation(String),

    /// The credential does not grant the requested action.
    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Throttled: {0}")]
    Throttled(String),

    /// A write precondition failed (e.g. updating a record that does not exist).
    #[error("Condition failed: {0}")]
    ConditionFailed(String),

    /// No usable client (credentials could not be acquired).
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Failures caused by the credential or the request rather than the backend.
    pub fn is_permission_or_validation(&self) -> bool {
        matches!(self, Self::AccessDenied(_) | Self::Validation(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Conjunction of field equality conditions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, Value)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(field, value);
        self
    }

    pub fn push(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.conditions.push((field.into(), value.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn conditions(&self) -> &[(String, Value)] {
        &self.conditions
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.conditions
            .iter()
            .all(|(field, value)| record.get(field) == Some(value))
    }
}

/// Equality lookup on a partition key or a secondary index.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub key_name: String,
    pub key_value: Value,
    /// Index serving the lookup; `None` queries the table's partition key.
    pub index: Option<String>,
    pub filter: Filter,
    pub limit: Option<usize>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Write a full record, replacing any existing one with the same key.
    async fn put_item(&self, table: &str, key: &RecordKey, item: Record)
    -> Result<(), StoreError>;

    async fn get_item(&self, table: &str, key: &RecordKey) -> Result<Option<Record>, StoreError>;

    /// Merge `changes` into an existing record and return the result.
    ///
    /// Fails with [`StoreError::ConditionFailed`] if the record does not exist.
    async fn update_item(
        &self,
        table: &str,
        key: &RecordKey,
        changes: Record,
    ) -> Result<Record, StoreError>;

    async fn delete_item(&self, table: &str, key: &RecordKey) -> Result<(), StoreError>;

    async fn query(&self, table: &str, request: &QueryRequest) -> Result<Vec<Record>, StoreError>;

    async fn scan(&self, table: &str, filter: &Filter) -> Result<Vec<Record>, StoreError>;
}

/// Configuration a connector binds into a new client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub region: String,
    pub credential: ScopedCredential,
    pub max_attempts: u32,
    /// Endpoint override (e.g. LocalStack).
    pub endpoint: Option<String>,
}

impl ClientConfig {
    pub fn new(region: impl Into<String>, credential: ScopedCredential) -> Self {
        Self {
            region: region.into(),
            credential,
            max_attempts: DEFAULT_STORE_MAX_ATTEMPTS,
            endpoint: None,
        }
    }
}

/// Builds data-store clients bound to a credential.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StoreConnector: Send + Sync {
    async fn connect(&self, config: &ClientConfig) -> Result<Arc<dyn DataStore>, StoreError>;
}
