//! Environment configuration.
//!
//! `.env` is loaded through `dotenvy` before the process environment is
//! read. Every setting has a default except the identity pool, which the
//! Cognito provider requires.

use std::str::FromStr;
use std::time::Duration;

use tracing::debug;

use crate::credentials::{CognitoConfig, RetryPolicy, ScopedCredential};
use crate::database::TableNames;
use crate::database::store::DEFAULT_STORE_MAX_ATTEMPTS;
use crate::{Error, Result};

pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_DATABASE_URL: &str = "sqlite:deckvault.db?mode=rwc";
pub const DEFAULT_STATIC_USER_ID: &str = "local";
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound for the credential lifetime and refresh skew settings.
pub const MAX_CREDENTIAL_WINDOW: Duration = Duration::from_secs(7 * 24 * 3600);

/// Which [`DataStore`](crate::database::DataStore) backend to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum StoreBackend {
    Sqlite,
    #[strum(serialize = "dynamodb")]
    DynamoDb,
}

/// Which identity provider mints scoped credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum IdentityBackend {
    Cognito,
    Static,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub region: String,
    pub tables: TableNames,
    pub store: StoreBackend,
    pub database_url: String,
    pub dynamodb_endpoint: Option<String>,
    pub identity: IdentityBackend,
    pub cognito_identity_pool_id: Option<String>,
    pub cognito_user_pool_id: Option<String>,
    pub cognito_endpoint: Option<String>,
    /// The signed-in user's ID token.
    pub id_token: Option<String>,
    /// Credential for the static provider and the server-side client.
    pub static_credential: Option<ScopedCredential>,
    pub static_user_id: String,
    pub retry: RetryPolicy,
    pub store_max_attempts: u32,
    pub provider_timeout: Duration,
}

/// Read a variable, treating empty values as unset.
fn var<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name).filter(|v| !v.trim().is_empty())
}

fn parsed<F, T>(lookup: &F, name: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(lookup, name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::config(format!("{name}={raw:?}: {e}"))),
        None => Ok(default),
    }
}

impl AppConfig {
    /// Load `.env`, then read the process environment.
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "Loaded .env");
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = TableNames::default();
        let tables = TableNames {
            users: var(&lookup, "DECKVAULT_USERS_TABLE").unwrap_or(defaults.users),
            collections: var(&lookup, "DECKVAULT_COLLECTIONS_TABLE")
                .unwrap_or(defaults.collections),
            decks: var(&lookup, "DECKVAULT_DECKS_TABLE").unwrap_or(defaults.decks),
            favorites: var(&lookup, "DECKVAULT_FAVORITES_TABLE").unwrap_or(defaults.favorites),
        };

        let default_retry = RetryPolicy::default();
        let retry = RetryPolicy {
            max_attempts: parsed(&lookup, "CREDENTIAL_MAX_ATTEMPTS", default_retry.max_attempts)?,
            base_delay: Duration::from_millis(parsed(
                &lookup,
                "CREDENTIAL_BASE_DELAY_MS",
                u64::try_from(default_retry.base_delay.as_millis()).unwrap_or(1000),
            )?),
            default_lifetime: Duration::from_secs(parsed(
                &lookup,
                "CREDENTIAL_DEFAULT_LIFETIME_SECS",
                default_retry.default_lifetime.as_secs(),
            )?),
            refresh_skew: Duration::from_secs(parsed(
                &lookup,
                "CREDENTIAL_REFRESH_SKEW_SECS",
                0u64,
            )?),
            jitter: false,
        };
        if retry.max_attempts == 0 {
            return Err(Error::config("CREDENTIAL_MAX_ATTEMPTS must be at least 1"));
        }
        for (name, value) in [
            ("CREDENTIAL_DEFAULT_LIFETIME_SECS", retry.default_lifetime),
            ("CREDENTIAL_REFRESH_SKEW_SECS", retry.refresh_skew),
        ] {
            if value > MAX_CREDENTIAL_WINDOW {
                return Err(Error::config(format!(
                    "{name} must be at most {}",
                    MAX_CREDENTIAL_WINDOW.as_secs()
                )));
            }
        }

        let static_credential = match (
            var(&lookup, "AWS_ACCESS_KEY_ID"),
            var(&lookup, "AWS_SECRET_ACCESS_KEY"),
        ) {
            (Some(key), Some(secret)) => {
                let mut credential = ScopedCredential::new(key, secret);
                credential.session_token = var(&lookup, "AWS_SESSION_TOKEN");
                Some(credential)
            }
            _ => None,
        };

        Ok(Self {
            region: var(&lookup, "AWS_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string()),
            tables,
            store: parsed(&lookup, "DECKVAULT_STORE", StoreBackend::Sqlite)?,
            database_url: var(&lookup, "DATABASE_URL")
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            dynamodb_endpoint: var(&lookup, "DYNAMODB_ENDPOINT"),
            identity: parsed(&lookup, "DECKVAULT_IDENTITY", IdentityBackend::Cognito)?,
            cognito_identity_pool_id: var(&lookup, "COGNITO_IDENTITY_POOL_ID"),
            cognito_user_pool_id: var(&lookup, "COGNITO_USER_POOL_ID"),
            cognito_endpoint: var(&lookup, "COGNITO_ENDPOINT"),
            id_token: var(&lookup, "DECKVAULT_ID_TOKEN"),
            static_credential,
            static_user_id: var(&lookup, "DECKVAULT_USER_ID")
                .unwrap_or_else(|| DEFAULT_STATIC_USER_ID.to_string()),
            retry,
            store_max_attempts: parsed(&lookup, "STORE_MAX_ATTEMPTS", DEFAULT_STORE_MAX_ATTEMPTS)?,
            provider_timeout: Duration::from_secs(parsed(
                &lookup,
                "PROVIDER_TIMEOUT_SECS",
                DEFAULT_PROVIDER_TIMEOUT.as_secs(),
            )?),
        })
    }

    /// Settings for the Cognito provider.
    pub fn cognito_config(&self) -> Result<CognitoConfig> {
        let pool = self
            .cognito_identity_pool_id
            .clone()
            .ok_or_else(|| Error::config("COGNITO_IDENTITY_POOL_ID is required for cognito identity"))?;

        let mut config = CognitoConfig::new(self.region.clone(), pool);
        config.user_pool_id = self.cognito_user_pool_id.clone();
        config.endpoint = self.cognito_endpoint.clone();
        config.timeout = self.provider_timeout;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(move |name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = config(&[]).unwrap();
        assert_eq!(config.region, "us-east-1");
        assert_eq!(config.tables, TableNames::default());
        assert_eq!(config.store, StoreBackend::Sqlite);
        assert_eq!(config.identity, IdentityBackend::Cognito);
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_delay, Duration::from_millis(1000));
        assert_eq!(config.retry.default_lifetime, Duration::from_secs(3600));
        assert_eq!(config.store_max_attempts, 5);
        assert_eq!(config.provider_timeout, Duration::from_secs(30));
        assert!(config.static_credential.is_none());
        assert!(config.cognito_config().is_err());
    }

    #[test]
    fn overrides_are_read() {
        let config = config(&[
            ("AWS_REGION", "eu-central-1"),
            ("DECKVAULT_DECKS_TABLE", "prod-decks"),
            ("DECKVAULT_STORE", "DynamoDB"),
            ("DECKVAULT_IDENTITY", "static"),
            ("AWS_ACCESS_KEY_ID", "AKIALOCAL"),
            ("AWS_SECRET_ACCESS_KEY", "secret"),
            ("CREDENTIAL_BASE_DELAY_MS", "250"),
            ("CREDENTIAL_REFRESH_SKEW_SECS", "60"),
            ("COGNITO_IDENTITY_POOL_ID", "eu-central-1:pool"),
            ("COGNITO_USER_POOL_ID", "eu-central-1_X"),
        ])
        .unwrap();

        assert_eq!(config.region, "eu-central-1");
        assert_eq!(config.tables.decks, "prod-decks");
        assert_eq!(config.tables.users, "mtg-users");
        assert_eq!(config.store, StoreBackend::DynamoDb);
        assert_eq!(config.identity, IdentityBackend::Static);
        assert_eq!(config.retry.base_delay, Duration::from_millis(250));
        assert_eq!(config.retry.refresh_skew, Duration::from_secs(60));
        assert_eq!(
            config.static_credential.as_ref().map(|c| c.access_key_id.as_str()),
            Some("AKIALOCAL")
        );

        let cognito = config.cognito_config().unwrap();
        assert_eq!(cognito.region, "eu-central-1");
        assert_eq!(cognito.user_pool_id.as_deref(), Some("eu-central-1_X"));
    }

    #[test]
    fn malformed_values_are_configuration_errors() {
        for vars in [
            [("CREDENTIAL_MAX_ATTEMPTS", "three")],
            [("CREDENTIAL_MAX_ATTEMPTS", "0")],
            [("STORE_MAX_ATTEMPTS", "-1")],
            [("DECKVAULT_STORE", "postgres")],
            [("CREDENTIAL_REFRESH_SKEW_SECS", "100000000000000")],
            [("CREDENTIAL_DEFAULT_LIFETIME_SECS", "604801")],
        ] {
            let err = config(&vars).unwrap_err();
            assert!(matches!(err, Error::Configuration(_)), "{vars:?}");
        }
    }

    #[test]
    fn credential_window_accepts_its_upper_bound() {
        let config = config(&[
            ("CREDENTIAL_DEFAULT_LIFETIME_SECS", "604800"),
            ("CREDENTIAL_REFRESH_SKEW_SECS", "604800"),
        ])
        .unwrap();
        assert_eq!(config.retry.default_lifetime, MAX_CREDENTIAL_WINDOW);
        assert_eq!(config.retry.refresh_skew, MAX_CREDENTIAL_WINDOW);
    }

    #[test]
    fn blank_values_count_as_unset() {
        let config = config(&[("AWS_REGION", "  "), ("DYNAMODB_ENDPOINT", "")]).unwrap();
        assert_eq!(config.region, "us-east-1");
        assert!(config.dynamodb_endpoint.is_none());
    }
}
