//! Service container for dependency injection.
//!
//! Builds the identity provider, credential acquirer, scoped client factory
//! and store backend from an [`AppConfig`], and hands out [`DataAccess`]
//! façades over them.

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::{AppConfig, IdentityBackend, StoreBackend};
use crate::credentials::{
    CachedCredential, CognitoIdentityProvider, CredentialAcquirer, CredentialCache,
    CredentialError, IdentitySessionProvider, StaticIdentityProvider,
};
use crate::database::{
    self, DataAccess, DataStore, ScopedClientFactory, SqliteConnector, SqliteStore,
    StoreConnector,
};
use crate::{Error, Result};

/// Holds the shared services for one process.
pub struct ServiceContainer {
    pub config: AppConfig,
    /// Owns the credential acquirer; cached credential and client are
    /// invalidated together through it.
    factory: Arc<ScopedClientFactory>,
    /// Local store, when the SQLite backend is selected.
    sqlite: Option<Arc<SqliteStore>>,
}

impl ServiceContainer {
    /// Build every service from configuration.
    pub async fn new(config: AppConfig) -> Result<Self> {
        let provider = Self::identity_provider(&config)?;

        let (connector, sqlite): (Arc<dyn StoreConnector>, _) = match config.store {
            StoreBackend::Sqlite => {
                let pool = database::init_pool(&config.database_url).await?;
                let store = Arc::new(SqliteStore::new(pool));
                store.ensure_tables(&config.tables).await?;
                (Arc::new(SqliteConnector::new(store.clone())), Some(store))
            }
            StoreBackend::DynamoDb => (Self::dynamodb_connector(&config)?, None),
        };

        Ok(Self::with_parts(config, provider, connector, sqlite))
    }

    /// Assemble from pre-built parts.
    pub fn with_parts(
        config: AppConfig,
        provider: Arc<dyn IdentitySessionProvider>,
        connector: Arc<dyn StoreConnector>,
        sqlite: Option<Arc<SqliteStore>>,
    ) -> Self {
        let acquirer = Arc::new(CredentialAcquirer::new(
            provider,
            Arc::new(CredentialCache::new()),
            config.retry.clone(),
        ));
        let factory = Arc::new(
            ScopedClientFactory::new(acquirer, connector, config.region.clone())
                .with_max_attempts(config.store_max_attempts)
                .with_endpoint(config.dynamodb_endpoint.clone()),
        );

        info!(
            store = %config.store,
            identity = %config.identity,
            region = %config.region,
            "Services initialized"
        );

        Self {
            config,
            factory,
            sqlite,
        }
    }

    fn identity_provider(config: &AppConfig) -> Result<Arc<dyn IdentitySessionProvider>> {
        Ok(match config.identity {
            IdentityBackend::Cognito => {
                let mut provider = CognitoIdentityProvider::new(config.cognito_config()?)
                    .map_err(|e| Error::config(e.to_string()))?;
                if let Some(token) = &config.id_token {
                    provider = provider.with_id_token(token.clone());
                } else {
                    debug!("No ID token configured; scoped access will be degraded");
                }
                Arc::new(provider)
            }
            IdentityBackend::Static => Arc::new(StaticIdentityProvider::new(
                config.static_user_id.clone(),
                config.static_credential.clone(),
            )),
        })
    }

    #[cfg(feature = "dynamodb")]
    fn dynamodb_connector(config: &AppConfig) -> Result<Arc<dyn StoreConnector>> {
        Ok(Arc::new(database::DynamoDbConnector {
            operation_timeout: Some(config.provider_timeout),
        }))
    }

    #[cfg(not(feature = "dynamodb"))]
    fn dynamodb_connector(_config: &AppConfig) -> Result<Arc<dyn StoreConnector>> {
        Err(Error::config(
            "DECKVAULT_STORE=dynamodb requires the `dynamodb` feature",
        ))
    }

    /// The current scoped credential with its computed expiry.
    pub async fn credential(&self) -> std::result::Result<CachedCredential, CredentialError> {
        self.factory.acquirer().acquire().await
    }

    /// Forget the cached credential and the client bound to it.
    pub fn sign_out(&self) {
        self.factory.invalidate();
    }

    /// Façade over the per-user scoped client.
    pub fn scoped_access(&self) -> DataAccess {
        DataAccess::scoped(self.factory.clone(), self.config.tables.clone())
    }

    /// Façade over the server-side client using ambient credentials.
    pub async fn server_access(&self) -> Result<DataAccess> {
        let store = self.server_store().await?;
        Ok(DataAccess::server(store, self.config.tables.clone()))
    }

    async fn server_store(&self) -> Result<Arc<dyn DataStore>> {
        if let Some(store) = &self.sqlite {
            return Ok(store.clone());
        }
        self.ambient_store().await
    }

    #[cfg(feature = "dynamodb")]
    async fn ambient_store(&self) -> Result<Arc<dyn DataStore>> {
        let config = &self.config;
        Ok(Arc::new(
            database::DynamoDbStore::ambient(
                &config.region,
                config.dynamodb_endpoint.as_deref(),
                config.store_max_attempts,
                Some(config.provider_timeout),
            )
            .await,
        ))
    }

    #[cfg(not(feature = "dynamodb"))]
    async fn ambient_store(&self) -> Result<Arc<dyn DataStore>> {
        Err(Error::config("no server-side store configured"))
    }
}
