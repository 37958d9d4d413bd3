//! SQLite-backed document store.
//!
//! One table per collection, each row holding the record as a JSON body
//! keyed by its partition and sort key text. Used for local development and
//! as the integration-test backend.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::Row;
use tracing::debug;

use super::DbPool;
use super::schema::{Record, RecordKey, TableNames};
use super::store::{ClientConfig, DataStore, Filter, QueryRequest, StoreConnector, StoreError};

/// Sort-key text stored for single-key tables.
const NO_SORT_KEY: &str = "";

/// Table names must look like DynamoDB table names.
fn checked_table(table: &str) -> Result<&str, StoreError> {
    let valid_len = (3..=255).contains(&table.len());
    let valid_chars = table
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid_len && valid_chars {
        Ok(table)
    } else {
        Err(StoreError::Validation(format!("invalid table name '{table}'")))
    }
}

fn sort_text(key: &RecordKey) -> String {
    key.sort
        .as_ref()
        .map(|part| part.as_text())
        .unwrap_or_else(|| NO_SORT_KEY.to_string())
}

fn parse_body(body: &str) -> Result<Record, StoreError> {
    match serde_json::from_str(body)? {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(StoreError::Serialization(format!(
            "stored body is not an object: {other}"
        ))),
    }
}

/// SQLx implementation of [`DataStore`].
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create the per-collection tables if they do not exist yet.
    pub async fn ensure_tables(&self, tables: &TableNames) -> Result<(), StoreError> {
        for (kind, table) in tables.iter() {
            let table = checked_table(table)?;
            sqlx::query(&format!(
                r#"CREATE TABLE IF NOT EXISTS "{table}" (
                    pk TEXT NOT NULL,
                    sk TEXT NOT NULL DEFAULT '',
                    body TEXT NOT NULL,
                    PRIMARY KEY (pk, sk)
                )"#
            ))
            .execute(&self.pool)
            .await?;
            debug!(%kind, table, "SQLite table ready");
        }
        Ok(())
    }

    async fn rows(&self, table: &str, partition: Option<&str>) -> Result<Vec<Record>, StoreError> {
        let table = checked_table(table)?;
        let rows = match partition {
            Some(pk) => {
                sqlx::query(&format!(
                    r#"SELECT body FROM "{table}" WHERE pk = ? ORDER BY pk, sk"#
                ))
                .bind(pk)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(r#"SELECT body FROM "{table}" ORDER BY pk, sk"#))
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.iter()
            .map(|row| parse_body(&row.get::<String, _>("body")))
            .collect()
    }
}

#[async_trait]
impl DataStore for SqliteStore {
    async fn put_item(&self, table: &str, key: &RecordKey, item: Record) -> Result<(), StoreError> {
        let table = checked_table(table)?;
        let body = serde_json::to_string(&item)?;
        sqlx::query(&format!(
            r#"INSERT INTO "{table}" (pk, sk, body) VALUES (?, ?, ?)
               ON CONFLICT(pk, sk) DO UPDATE SET body = excluded.body"#
        ))
        .bind(key.partition.as_text())
        .bind(sort_text(key))
        .bind(body)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_item(&self, table: &str, key: &RecordKey) -> Result<Option<Record>, StoreError> {
        let table = checked_table(table)?;
        let row = sqlx::query(&format!(
            r#"SELECT body FROM "{table}" WHERE pk = ? AND sk = ?"#
        ))
        .bind(key.partition.as_text())
        .bind(sort_text(key))
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| parse_body(&row.get::<String, _>("body")))
            .transpose()
    }

    async fn update_item(
        &self,
        table: &str,
        key: &RecordKey,
        changes: Record,
    ) -> Result<Record, StoreError> {
        let table = checked_table(table)?;
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            r#"SELECT body FROM "{table}" WHERE pk = ? AND sk = ?"#
        ))
        .bind(key.partition.as_text())
        .bind(sort_text(key))
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Err(StoreError::ConditionFailed(format!(
                "no record with key {key} in {table}"
            )));
        };

        let mut record = parse_body(&row.get::<String, _>("body"))?;
        record.extend(changes);

        sqlx::query(&format!(
            r#"UPDATE "{table}" SET body = ? WHERE pk = ? AND sk = ?"#
        ))
        .bind(serde_json::to_string(&record)?)
        .bind(key.partition.as_text())
        .bind(sort_text(key))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(record)
    }

    async fn delete_item(&self, table: &str, key: &RecordKey) -> Result<(), StoreError> {
        let table = checked_table(table)?;
        sqlx::query(&format!(r#"DELETE FROM "{table}" WHERE pk = ? AND sk = ?"#))
            .bind(key.partition.as_text())
            .bind(sort_text(key))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn query(&self, table: &str, request: &QueryRequest) -> Result<Vec<Record>, StoreError> {
        // Secondary lookups have no SQL index; they scan and match the field.
        let partition = match (&request.index, &request.key_value) {
            (None, serde_json::Value::String(s)) => Some(s.clone()),
            (None, other) => Some(other.to_string()),
            (Some(_), _) => None,
        };

        let key_filter = Filter::new().eq(request.key_name.clone(), request.key_value.clone());
        let matches = self
            .rows(table, partition.as_deref())
            .await?
            .into_iter()
            .filter(|record| key_filter.matches(record) && request.filter.matches(record));

        Ok(match request.limit {
            Some(limit) => matches.take(limit).collect(),
            None => matches.collect(),
        })
    }

    async fn scan(&self, table: &str, filter: &Filter) -> Result<Vec<Record>, StoreError> {
        Ok(self
            .rows(table, None)
            .await?
            .into_iter()
            .filter(|record| filter.matches(record))
            .collect())
    }
}

/// Connector handing out the shared SQLite store.
///
/// Local storage has no notion of scoped credentials; the credential is only
/// logged (masked) so the scoped flow can be exercised end to end.
pub struct SqliteConnector {
    store: Arc<SqliteStore>,
}

impl SqliteConnector {
    pub fn new(store: Arc<SqliteStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl StoreConnector for SqliteConnector {
    async fn connect(&self, config: &ClientConfig) -> Result<Arc<dyn DataStore>, StoreError> {
        debug!(
            access_key = %config.credential.masked_access_key(),
            region = %config.region,
            "Binding SQLite store to scoped credential"
        );
        Ok(self.store.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::init_pool_with_size;
    use crate::database::schema::EntityKind;
    use serde_json::json;

    async fn store() -> SqliteStore {
        // One connection: every in-memory connection is its own database.
        let pool = init_pool_with_size("sqlite::memory:", 1).await.unwrap();
        let store = SqliteStore::new(pool);
        store.ensure_tables(&TableNames::default()).await.unwrap();
        store
    }

    fn record(value: serde_json::Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn rejects_table_names_that_need_escaping() {
        assert!(checked_table("mtg-decks").is_ok());
        assert!(checked_table("decks\"; DROP TABLE x; --").is_err());
        assert!(checked_table("ab").is_err());
    }

    #[tokio::test]
    async fn put_get_delete_composite_key() {
        let store = store().await;
        let schema = EntityKind::Collections.schema();
        let item = record(json!({"userId": "u1", "cardId": "c1", "quantity": 3}));
        let key = schema.key_of(&item).unwrap();

        store.put_item("mtg-collections", &key, item.clone()).await.unwrap();
        assert_eq!(store.get_item("mtg-collections", &key).await.unwrap(), Some(item));

        store.delete_item("mtg-collections", &key).await.unwrap();
        assert!(store.get_item("mtg-collections", &key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_merges_and_requires_existing_record() {
        let store = store().await;
        let schema = EntityKind::Decks.schema();
        let item = record(json!({"id": "d1", "userId": "u1", "name": "Burn"}));
        let key = schema.key_of(&item).unwrap();

        let err = store
            .update_item("mtg-decks", &key, record(json!({"name": "x"})))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ConditionFailed(_)));

        store.put_item("mtg-decks", &key, item).await.unwrap();
        let updated = store
            .update_item("mtg-decks", &key, record(json!({"format": "modern"})))
            .await
            .unwrap();
        assert_eq!(updated["name"], "Burn");
        assert_eq!(updated["format"], "modern");
    }

    #[tokio::test]
    async fn query_by_partition_and_lookup() {
        let store = store().await;
        let schema = EntityKind::Decks.schema();
        for (id, user, format) in [("d1", "u1", "modern"), ("d2", "u1", "legacy"), ("d3", "u2", "modern")] {
            let item = record(json!({"id": id, "userId": user, "name": id, "format": format}));
            let key = schema.key_of(&item).unwrap();
            store.put_item("mtg-decks", &key, item).await.unwrap();
        }

        let by_user = store
            .query(
                "mtg-decks",
                &QueryRequest {
                    key_name: "userId".into(),
                    key_value: json!("u1"),
                    index: Some("userId-index".into()),
                    filter: Filter::new().eq("format", "modern"),
                    limit: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(by_user.len(), 1);
        assert_eq!(by_user[0]["id"], "d1");

        let by_id = store
            .query(
                "mtg-decks",
                &QueryRequest {
                    key_name: "id".into(),
                    key_value: json!("d3"),
                    index: None,
                    filter: Filter::new(),
                    limit: Some(5),
                },
            )
            .await
            .unwrap();
        assert_eq!(by_id.len(), 1);

        let all = store.scan("mtg-decks", &Filter::new()).await.unwrap();
        assert_eq!(all.len(), 3);
        let limited = store
            .query(
                "mtg-decks",
                &QueryRequest {
                    key_name: "userId".into(),
                    key_value: json!("u1"),
                    index: Some("userId-index".into()),
                    filter: Filter::new(),
                    limit: Some(1),
                },
            )
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
    }
}
