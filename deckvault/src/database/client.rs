//! Scoped data client factory.
//!
//! Binds a data-store client to the credential returned by the
//! [`CredentialAcquirer`] and reuses it until that credential expires. When no
//! credential can be obtained the factory hands out a degenerate
//! [`EmptyStore`] instead of failing, and does not cache it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::access::DataError;
use super::empty::EmptyStore;
use super::store::{ClientConfig, DEFAULT_STORE_MAX_ATTEMPTS, DataStore, StoreConnector};
use crate::credentials::CredentialAcquirer;
use crate::credentials::is_before_deadline;

/// A data-store client, possibly degenerate.
#[derive(Clone)]
pub struct ScopedClient {
    store: Arc<dyn DataStore>,
    degraded: Option<DataError>,
}

impl ScopedClient {
    pub fn ready(store: Arc<dyn DataStore>) -> Self {
        Self {
            store,
            degraded: None,
        }
    }

    pub fn degraded(cause: DataError) -> Self {
        Self {
            store: Arc::new(EmptyStore::new(cause.to_string())),
            degraded: Some(cause),
        }
    }

    pub fn store(&self) -> &Arc<dyn DataStore> {
        &self.store
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }

    /// The failure that made the client degenerate, if any.
    pub fn degraded_error(&self) -> Option<&DataError> {
        self.degraded.as_ref()
    }

    pub fn degraded_reason(&self) -> Option<String> {
        self.degraded.as_ref().map(ToString::to_string)
    }
}

impl std::fmt::Debug for ScopedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedClient")
            .field("degraded", &self.degraded)
            .finish_non_exhaustive()
    }
}

struct CachedClient {
    store: Arc<dyn DataStore>,
    /// Expiry of the credential the client was built with.
    expires_at: DateTime<Utc>,
}

pub struct ScopedClientFactory {
    acquirer: Arc<CredentialAcquirer>,
    connector: Arc<dyn StoreConnector>,
    region: String,
    max_attempts: u32,
    endpoint: Option<String>,
    slot: RwLock<Option<CachedClient>>,
    build_lock: Mutex<()>,
}

impl ScopedClientFactory {
    pub fn new(
        acquirer: Arc<CredentialAcquirer>,
        connector: Arc<dyn StoreConnector>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            acquirer,
            connector,
            region: region.into(),
            max_attempts: DEFAULT_STORE_MAX_ATTEMPTS,
            endpoint: None,
            slot: RwLock::new(None),
            build_lock: Mutex::new(()),
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_endpoint(mut self, endpoint: Option<String>) -> Self {
        self.endpoint = endpoint;
        self
    }

    pub fn acquirer(&self) -> &Arc<CredentialAcquirer> {
        &self.acquirer
    }

    /// Drop the cached client and credential (sign-out, forced refresh).
    pub fn invalidate(&self) {
        self.slot.write().take();
        self.acquirer.invalidate();
    }

    fn cached(&self) -> Option<Arc<dyn DataStore>> {
        let skew = self.acquirer.policy().refresh_skew_chrono();
        let now = Utc::now();
        self.slot
            .read()
            .as_ref()
            .filter(|cached| is_before_deadline(now, cached.expires_at, skew))
            .map(|cached| cached.store.clone())
    }

    /// Return a client bound to a valid credential, or a degenerate one.
    pub async fn get_client(&self) -> ScopedClient {
        if let Some(store) = self.cached() {
            return ScopedClient::ready(store);
        }

        let _guard = self.build_lock.lock().await;

        // Double-check after acquiring lock (another task may have built it)
        if let Some(store) = self.cached() {
            return ScopedClient::ready(store);
        }

        let cached = match self.acquirer.acquire().await {
            Ok(cached) => cached,
            Err(err) => {
                warn!(error = %err, "Scoped credential unavailable; using empty data client");
                return ScopedClient::degraded(DataError::Credential(err));
            }
        };

        let mut config = ClientConfig::new(self.region.clone(), cached.credential);
        config.max_attempts = self.max_attempts;
        config.endpoint = self.endpoint.clone();

        let store = match self.connector.connect(&config).await {
            Ok(store) => store,
            Err(err) => {
                warn!(error = %err, "Failed to build data client; using empty data client");
                return ScopedClient::degraded(DataError::Store(err));
            }
        };

        if self.slot.read().is_some() {
            debug!("Cached data client expired with its credential");
        }
        *self.slot.write() = Some(CachedClient {
            store: store.clone(),
            expires_at: cached.expires_at,
        });
        info!(
            region = %self.region,
            expires_at = %cached.expires_at,
            "Scoped data client ready"
        );

        ScopedClient::ready(store)
    }
}
