//! Data access layer.
//!
//! - [`schema`]: static per-collection schemas and record keys
//! - [`store`]: the [`DataStore`] / [`StoreConnector`] seams
//! - [`client`]: scoped client factory bound to acquired credentials
//! - [`access`]: the [`DataAccess`] façade used by callers
//!
//! Backends: [`SqliteStore`] (local), `DynamoDbStore` (feature `dynamodb`)
//! and the degenerate [`EmptyStore`].

pub mod access;
pub mod client;
#[cfg(feature = "dynamodb")]
pub mod dynamodb;
pub mod empty;
pub mod models;
pub mod schema;
pub mod sqlite;
pub mod store;
pub mod time;

pub use access::{ClientSource, DataAccess, DataError, ListOutcome, QueryOptions};
pub use client::{ScopedClient, ScopedClientFactory};
#[cfg(feature = "dynamodb")]
pub use dynamodb::{DynamoDbConnector, DynamoDbStore};
pub use empty::EmptyStore;
pub use schema::{EntityKind, EntitySchema, Record, RecordKey, SchemaError, TableNames};
pub use sqlite::{SqliteConnector, SqliteStore};
pub use store::{ClientConfig, DataStore, Filter, QueryRequest, StoreConnector, StoreError};

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Row, Sqlite};
use std::str::FromStr;
use std::time::Duration;

/// Database connection pool type alias.
pub type DbPool = Pool<Sqlite>;

/// Default connection pool size.
const DEFAULT_POOL_SIZE: u32 = 10;

/// Default busy timeout in milliseconds.
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 30_000;

async fn ensure_wal_mode(pool: &DbPool) -> Result<(), sqlx::Error> {
    let mut conn = pool.acquire().await?;
    let row = sqlx::query("PRAGMA journal_mode")
        .fetch_one(&mut *conn)
        .await?;
    let mode: String = row.get(0);
    if mode != "wal" && mode != "memory" {
        tracing::warn!("journal_mode was '{}', expected 'wal'; re-setting", mode);
        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// Initialize the SQLite pool with WAL mode.
///
/// # Arguments
/// * `database_url` - SQLite database URL (e.g., "sqlite:deckvault.db?mode=rwc")
/// * `max_connections` - Maximum number of connections in the pool
pub async fn init_pool_with_size(
    database_url: &str,
    max_connections: u32,
) -> Result<DbPool, sqlx::Error> {
    let connect_options = SqliteConnectOptions::from_str(database_url)?
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect_with(connect_options)
        .await?;

    ensure_wal_mode(&pool).await?;

    tracing::info!(
        "Database pool initialized with WAL mode, {} max connections",
        max_connections
    );

    Ok(pool)
}

/// Initialize the SQLite pool with the default size.
pub async fn init_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    init_pool_with_size(database_url, DEFAULT_POOL_SIZE).await
}
