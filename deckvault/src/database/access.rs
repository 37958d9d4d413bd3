//! Data access façade.
//!
//! CRUD, query and scan over the named collections. Writes validate against
//! the collection's [`EntitySchema`](super::EntitySchema) before any I/O and
//! propagate store failures. List reads absorb every store failure into
//! [`ListOutcome::Degraded`]; only schema errors fail them.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, instrument, warn};

use super::client::{ScopedClient, ScopedClientFactory};
use super::models::Entity;
use super::schema::{
    EntityKind, FIELD_CREATED_AT, FIELD_ID, FIELD_UPDATED_AT, Record, SchemaError, TableNames,
    check_key_value,
};
use super::store::{DataStore, Filter, QueryRequest, StoreError};
use super::time::now_rfc3339;
use crate::credentials::CredentialError;

#[derive(Debug, Clone, Error)]
pub enum DataError {
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),
}

/// Result of a list-style read.
#[derive(Debug, Clone, PartialEq)]
pub enum ListOutcome<T = Record> {
    Complete(Vec<T>),
    /// The read could not be served; callers get no data and the reason.
    Degraded { reason: String },
}

impl<T> ListOutcome<T> {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Complete(_) => None,
            Self::Degraded { reason } => Some(reason),
        }
    }

    /// The items; empty when degraded.
    pub fn items(&self) -> &[T] {
        match self {
            Self::Complete(items) => items,
            Self::Degraded { .. } => &[],
        }
    }

    pub fn into_items(self) -> Vec<T> {
        match self {
            Self::Complete(items) => items,
            Self::Degraded { .. } => Vec::new(),
        }
    }
}

/// Optional refinements for [`DataAccess::query`].
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub filter: Filter,
    pub limit: Option<usize>,
}

/// Where the façade gets its data-store client.
pub enum ClientSource {
    /// Per-user credentials from the identity provider.
    Scoped(Arc<ScopedClientFactory>),
    /// Ambient server-side credentials.
    Server(Arc<dyn DataStore>),
}

pub struct DataAccess {
    source: ClientSource,
    tables: TableNames,
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

impl DataAccess {
    pub fn new(source: ClientSource, tables: TableNames) -> Self {
        Self { source, tables }
    }

    pub fn scoped(factory: Arc<ScopedClientFactory>, tables: TableNames) -> Self {
        Self::new(ClientSource::Scoped(factory), tables)
    }

    pub fn server(store: Arc<dyn DataStore>, tables: TableNames) -> Self {
        Self::new(ClientSource::Server(store), tables)
    }

    async fn client(&self) -> ScopedClient {
        match &self.source {
            ClientSource::Scoped(factory) => factory.get_client().await,
            ClientSource::Server(store) => ScopedClient::ready(store.clone()),
        }
    }

    /// A usable store for a write, or the reason there is none.
    async fn write_store(&self) -> Result<Arc<dyn DataStore>, DataError> {
        let client = self.client().await;
        match client.degraded_error() {
            Some(err) => Err(err.clone()),
            None => Ok(client.store().clone()),
        }
    }

    /// A usable store for a list read, or the degradation reason.
    async fn list_store(&self) -> Result<Arc<dyn DataStore>, String> {
        let client = self.client().await;
        match client.degraded_reason() {
            Some(reason) => Err(reason),
            None => Ok(client.store().clone()),
        }
    }

    /// Every store failure on a list read becomes an empty, degraded result.
    fn settle(
        kind: EntityKind,
        operation: &str,
        result: Result<Vec<Record>, StoreError>,
    ) -> ListOutcome {
        match result {
            Ok(items) => {
                debug!(%kind, operation, count = items.len(), "List read complete");
                ListOutcome::Complete(items)
            }
            Err(err) => {
                if err.is_permission_or_validation() {
                    warn!(%kind, operation, error = %err, "List read degraded");
                } else {
                    error!(%kind, operation, error = %err, "List read failed; degrading to empty");
                }
                ListOutcome::Degraded {
                    reason: err.to_string(),
                }
            }
        }
    }

    /// Validate, stamp and write a new record. Returns the stored record.
    ///
    /// Single-key `id` collections get a UUID v4 id when none is supplied.
    #[instrument(skip(self, record), fields(%kind))]
    pub async fn create(&self, kind: EntityKind, mut record: Record) -> Result<Record, DataError> {
        let schema = kind.schema();

        if schema.key.is_generated_id() && record.get(FIELD_ID).is_none_or(is_blank) {
            record.insert(
                FIELD_ID.to_string(),
                Value::String(uuid::Uuid::new_v4().to_string()),
            );
        }

        let now = now_rfc3339();
        record.insert(FIELD_CREATED_AT.to_string(), Value::String(now.clone()));
        record.insert(FIELD_UPDATED_AT.to_string(), Value::String(now));

        let key = schema.validate(&record)?;
        let store = self.write_store().await?;

        store
            .put_item(self.tables.get(kind), &key, record.clone())
            .await
            .inspect_err(|e| error!(%key, error = %e, "Create failed"))?;

        debug!(%key, "Record created");
        Ok(record)
    }

    /// Read one record by its key fields. `Ok(None)` when absent.
    #[instrument(skip(self, key), fields(%kind))]
    pub async fn get_by_id(&self, kind: EntityKind, key: &Record) -> Result<Option<Record>, DataError> {
        let key = kind.schema().key_from(key)?;
        let client = self.client().await;
        if let Some(reason) = client.degraded_reason() {
            warn!(%key, reason, "Reading through an empty data client");
        }

        Ok(client
            .store()
            .get_item(self.tables.get(kind), &key)
            .await?)
    }

    /// Apply a partial update. Key fields, `id` and `createdAt` are never changed.
    #[instrument(skip(self, key, changes), fields(%kind))]
    pub async fn update(
        &self,
        kind: EntityKind,
        key: &Record,
        changes: Record,
    ) -> Result<Record, DataError> {
        let schema = kind.schema();
        let key = schema.key_from(key)?;

        let mut changes: Record = changes
            .into_iter()
            .filter(|(field, _)| !schema.is_immutable(field) && field != FIELD_UPDATED_AT)
            .collect();
        if changes.is_empty() {
            return Err(SchemaError::EmptyUpdate { kind }.into());
        }
        changes.insert(FIELD_UPDATED_AT.to_string(), Value::String(now_rfc3339()));

        let store = self.write_store().await?;
        let updated = store
            .update_item(self.tables.get(kind), &key, changes)
            .await
            .inspect_err(|e| error!(%key, error = %e, "Update failed"))?;

        debug!(%key, "Record updated");
        Ok(updated)
    }

    /// Unconditional delete by key.
    #[instrument(skip(self, key), fields(%kind))]
    pub async fn delete(&self, kind: EntityKind, key: &Record) -> Result<(), DataError> {
        let key = kind.schema().key_from(key)?;
        let store = self.write_store().await?;
        store
            .delete_item(self.tables.get(kind), &key)
            .await
            .inspect_err(|e| error!(%key, error = %e, "Delete failed"))?;
        debug!(%key, "Record deleted");
        Ok(())
    }

    /// Every record owned by `user_id`.
    #[instrument(skip(self), fields(%kind))]
    pub async fn get_by_user_id(
        &self,
        kind: EntityKind,
        user_id: &str,
    ) -> Result<ListOutcome, DataError> {
        let filter = Filter::new().eq(kind.schema().owner_field, user_id);
        self.scan(kind, filter).await
    }

    /// Equality lookup on the partition key or a declared secondary lookup.
    #[instrument(skip(self, key_value, options), fields(%kind))]
    pub async fn query(
        &self,
        kind: EntityKind,
        key_name: &str,
        key_value: Value,
        options: QueryOptions,
    ) -> Result<ListOutcome, DataError> {
        let schema = kind.schema();
        let index = schema.lookup_index(key_name)?;
        check_key_value(kind, key_name, &key_value)?;

        let store = match self.list_store().await {
            Ok(store) => store,
            Err(reason) => return Ok(ListOutcome::Degraded { reason }),
        };

        let request = QueryRequest {
            key_name: key_name.to_string(),
            key_value,
            index: index.map(str::to_string),
            filter: options.filter,
            limit: options.limit,
        };
        Ok(Self::settle(
            kind,
            "query",
            store.query(self.tables.get(kind), &request).await,
        ))
    }

    /// Full scan with an optional equality filter.
    #[instrument(skip(self, filter), fields(%kind))]
    pub async fn scan(&self, kind: EntityKind, filter: Filter) -> Result<ListOutcome, DataError> {
        let store = match self.list_store().await {
            Ok(store) => store,
            Err(reason) => return Ok(ListOutcome::Degraded { reason }),
        };
        Ok(Self::settle(
            kind,
            "scan",
            store.scan(self.tables.get(kind), &filter).await,
        ))
    }

    /// Create a typed entity and return it as stored.
    pub async fn create_entity<E: Entity>(&self, entity: &E) -> Result<E, DataError> {
        let record = entity.to_record().map_err(StoreError::from)?;
        let stored = self.create(E::KIND, record).await?;
        Ok(E::from_record(stored).map_err(StoreError::from)?)
    }

    pub async fn get_entity<E: Entity>(&self, key: &Record) -> Result<Option<E>, DataError> {
        match self.get_by_id(E::KIND, key).await? {
            Some(record) => Ok(Some(E::from_record(record).map_err(StoreError::from)?)),
            None => Ok(None),
        }
    }

    /// Typed [`get_by_user_id`](Self::get_by_user_id). Records that do not
    /// parse as `E` are skipped with a warning.
    pub async fn list_entities_for_user<E: Entity>(
        &self,
        user_id: &str,
    ) -> Result<ListOutcome<E>, DataError> {
        Ok(match self.get_by_user_id(E::KIND, user_id).await? {
            ListOutcome::Complete(records) => ListOutcome::Complete(
                records
                    .into_iter()
                    .filter_map(|record| {
                        E::from_record(record)
                            .inspect_err(|e| warn!(kind = %E::KIND, error = %e, "Skipping malformed record"))
                            .ok()
                    })
                    .collect(),
            ),
            ListOutcome::Degraded { reason } => ListOutcome::Degraded { reason },
        })
    }
}
