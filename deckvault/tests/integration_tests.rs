use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tempfile::TempDir;

use deckvault::credentials::{
    CredentialAcquirer, CredentialCache, RetryPolicy, ScopedCredential, StaticIdentityProvider,
};
use deckvault::database::models::{Board, CollectionEntry, Deck, Favorite, UserProfile};
use deckvault::database::{
    self, DataAccess, DataError, DataStore, EntityKind, Filter, ListOutcome, QueryOptions,
    QueryRequest, Record, RecordKey, ScopedClientFactory, SqliteConnector, SqliteStore,
    StoreError, TableNames,
};

fn record(value: serde_json::Value) -> Record {
    value.as_object().cloned().unwrap()
}

async fn sqlite_store(dir: &TempDir) -> Arc<SqliteStore> {
    let db_path = dir.path().join("deckvault.db");
    let db_url = format!(
        "sqlite:{}?mode=rwc",
        db_path.to_string_lossy().replace('\\', "/")
    );

    let pool = database::init_pool(&db_url).await.unwrap();
    let store = Arc::new(SqliteStore::new(pool));
    store.ensure_tables(&TableNames::default()).await.unwrap();
    store
}

fn scoped_access(store: Arc<SqliteStore>, credential: Option<ScopedCredential>) -> DataAccess {
    let acquirer = CredentialAcquirer::new(
        Arc::new(StaticIdentityProvider::new("u1", credential)),
        Arc::new(CredentialCache::new()),
        RetryPolicy::default(),
    );
    let factory = ScopedClientFactory::new(
        Arc::new(acquirer),
        Arc::new(SqliteConnector::new(store)),
        "us-east-1",
    );
    DataAccess::scoped(Arc::new(factory), TableNames::default())
}

/// Store whose every call fails with the configured error.
struct FailingStore(StoreError);

#[async_trait]
impl DataStore for FailingStore {
    async fn put_item(&self, _: &str, _: &RecordKey, _: Record) -> Result<(), StoreError> {
        Err(self.0.clone())
    }

    async fn get_item(&self, _: &str, _: &RecordKey) -> Result<Option<Record>, StoreError> {
        Err(self.0.clone())
    }

    async fn update_item(&self, _: &str, _: &RecordKey, _: Record) -> Result<Record, StoreError> {
        Err(self.0.clone())
    }

    async fn delete_item(&self, _: &str, _: &RecordKey) -> Result<(), StoreError> {
        Err(self.0.clone())
    }

    async fn query(&self, _: &str, _: &QueryRequest) -> Result<Vec<Record>, StoreError> {
        Err(self.0.clone())
    }

    async fn scan(&self, _: &str, _: &Filter) -> Result<Vec<Record>, StoreError> {
        Err(self.0.clone())
    }
}

#[tokio::test]
async fn create_then_read_back_by_id() {
    let dir = TempDir::new().unwrap();
    let access = DataAccess::server(sqlite_store(&dir).await, TableNames::default());

    let created = access
        .create(
            EntityKind::Decks,
            record(json!({ "userId": "u1", "name": "Mono Red", "format": "modern" })),
        )
        .await
        .unwrap();

    let id = created["id"].as_str().unwrap().to_string();
    assert!(!id.is_empty());
    assert!(created["createdAt"].is_string());
    assert!(created["updatedAt"].is_string());

    let read = access
        .get_by_id(EntityKind::Decks, &record(json!({ "id": id })))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(read, created);
}

#[tokio::test]
async fn scoped_access_round_trip_through_static_credentials() {
    let dir = TempDir::new().unwrap();
    let access = scoped_access(
        sqlite_store(&dir).await,
        Some(ScopedCredential::new("AKIAINTEGRATION", "secret")),
    );

    for card in ["c1", "c2"] {
        let entry = CollectionEntry::new("u1", card, 4);
        access.create_entity(&entry).await.unwrap();
    }
    access
        .create_entity(&CollectionEntry::new("u2", "c1", 1))
        .await
        .unwrap();

    let owned = access
        .list_entities_for_user::<CollectionEntry>("u1")
        .await
        .unwrap();
    assert!(!owned.is_degraded());
    let mut cards: Vec<_> = owned.items().iter().map(|e| e.card_id.as_str()).collect();
    cards.sort_unstable();
    assert_eq!(cards, ["c1", "c2"]);

    let fetched: Option<CollectionEntry> = access
        .get_entity(&record(json!({ "userId": "u2", "cardId": "c1" })))
        .await
        .unwrap();
    assert_eq!(fetched.map(|e| e.quantity), Some(1));
}

#[tokio::test]
async fn typed_deck_round_trip_and_lookup_query() {
    let dir = TempDir::new().unwrap();
    let access = DataAccess::server(sqlite_store(&dir).await, TableNames::default());

    let mut deck = Deck::new("u1", "Burn").with_format("modern");
    deck.add_card("lightning-bolt", 4, Board::Main);
    deck.add_card("smash-to-smithereens", 2, Board::Sideboard);
    let stored = access.create_entity(&deck).await.unwrap();
    assert!(!stored.id.is_empty());
    assert!(stored.created_at.is_some());
    assert_eq!(stored.card_count(Board::Main), 4);

    access
        .create_entity(&Deck::new("u1", "Control").with_format("legacy"))
        .await
        .unwrap();

    let modern = access
        .query(
            EntityKind::Decks,
            "userId",
            json!("u1"),
            QueryOptions {
                filter: Filter::new().eq("format", "modern"),
                limit: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(modern.items().len(), 1);
    assert_eq!(modern.items()[0]["name"], json!("Burn"));
}

#[tokio::test]
async fn profiles_by_email_and_favourites_by_owner() {
    let dir = TempDir::new().unwrap();
    let access = DataAccess::server(sqlite_store(&dir).await, TableNames::default());

    access
        .create_entity(&UserProfile::new("u1", "jace@example.com").with_display_name("Jace"))
        .await
        .unwrap();
    access
        .create_entity(&UserProfile::new("u2", "liliana@example.com"))
        .await
        .unwrap();

    let by_email = access
        .query(
            EntityKind::Users,
            "email",
            json!("jace@example.com"),
            QueryOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(by_email.items().len(), 1);
    assert_eq!(by_email.items()[0]["id"], json!("u1"));

    for card in ["black-lotus", "mox-pearl"] {
        access.create_entity(&Favorite::new("u1", card)).await.unwrap();
    }
    let favourites = access
        .list_entities_for_user::<Favorite>("u1")
        .await
        .unwrap()
        .into_items();
    assert_eq!(favourites.len(), 2);
    assert!(favourites.iter().all(|f| f.created_at.is_some()));

    let own_profile = access
        .list_entities_for_user::<UserProfile>("u1")
        .await
        .unwrap()
        .into_items();
    assert_eq!(own_profile.len(), 1);
    assert_eq!(own_profile[0].display_name.as_deref(), Some("Jace"));
}

#[tokio::test]
async fn update_keeps_identity_fields() {
    let dir = TempDir::new().unwrap();
    let access = DataAccess::server(sqlite_store(&dir).await, TableNames::default());

    let created = access
        .create(
            EntityKind::Collections,
            record(json!({ "userId": "u1", "cardId": "c1", "quantity": 2 })),
        )
        .await
        .unwrap();

    let updated = access
        .update(
            EntityKind::Collections,
            &record(json!({ "userId": "u1", "cardId": "c1" })),
            record(json!({
                "quantity": 3,
                "userId": "someone-else",
                "createdAt": "2000-01-01T00:00:00.000Z",
            })),
        )
        .await
        .unwrap();

    assert_eq!(updated["quantity"], json!(3));
    assert_eq!(updated["userId"], json!("u1"));
    assert_eq!(updated["createdAt"], created["createdAt"]);
}

#[tokio::test]
async fn update_of_missing_record_is_an_error() {
    let dir = TempDir::new().unwrap();
    let access = DataAccess::server(sqlite_store(&dir).await, TableNames::default());

    let err = access
        .update(
            EntityKind::Decks,
            &record(json!({ "id": "missing" })),
            record(json!({ "name": "renamed" })),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DataError::Store(StoreError::ConditionFailed(_))));
}

#[tokio::test]
async fn delete_removes_the_record() {
    let dir = TempDir::new().unwrap();
    let access = DataAccess::server(sqlite_store(&dir).await, TableNames::default());
    let key = record(json!({ "userId": "u1", "cardId": "c1" }));

    access
        .create(EntityKind::Favorites, key.clone())
        .await
        .unwrap();
    access.delete(EntityKind::Favorites, &key).await.unwrap();
    assert!(
        access
            .get_by_id(EntityKind::Favorites, &key)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn permission_failure_degrades_list_reads() {
    let access = DataAccess::server(
        Arc::new(FailingStore(StoreError::AccessDenied("not authorized".into()))),
        TableNames::default(),
    );

    let outcome = access
        .get_by_user_id(EntityKind::Decks, "u1")
        .await
        .unwrap();
    match outcome {
        ListOutcome::Degraded { reason } => assert!(reason.contains("not authorized")),
        ListOutcome::Complete(_) => panic!("expected a degraded outcome"),
    }
}

#[tokio::test]
async fn backend_failure_fails_writes_and_degrades_reads() {
    let access = DataAccess::server(
        Arc::new(FailingStore(StoreError::Backend("disk full".into()))),
        TableNames::default(),
    );

    let err = access
        .create(
            EntityKind::Favorites,
            record(json!({ "userId": "u1", "cardId": "c1" })),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DataError::Store(StoreError::Backend(_))));

    // List reads absorb the same failure.
    let outcome = access.scan(EntityKind::Favorites, Filter::new()).await.unwrap();
    assert_eq!(outcome.reason(), Some("Backend error: disk full"));
}

#[tokio::test]
async fn signed_out_user_gets_empty_lists_and_failing_writes() {
    let dir = TempDir::new().unwrap();
    let access = scoped_access(sqlite_store(&dir).await, None);

    let outcome = access
        .get_by_user_id(EntityKind::Collections, "u1")
        .await
        .unwrap();
    assert!(outcome.is_degraded());
    assert!(outcome.items().is_empty());

    let err = access
        .create(
            EntityKind::Favorites,
            record(json!({ "userId": "u1", "cardId": "c1" })),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DataError::Credential(e) if e.requires_relogin()));
}
