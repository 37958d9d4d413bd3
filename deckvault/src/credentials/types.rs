//! Core credential types.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Short-lived access key / secret / session token triple for the data store.
///
/// Immutable once issued; a refresh produces a new value instead of mutating
/// the old one.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopedCredential {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
    /// Hard expiry reported by the provider, if any.
    pub expiration: Option<DateTime<Utc>>,
}

impl ScopedCredential {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
            expiration: None,
        }
    }

    pub fn with_session_token(mut self, session_token: impl Into<String>) -> Self {
        self.session_token = Some(session_token.into());
        self
    }

    pub fn with_expiration(mut self, expiration: DateTime<Utc>) -> Self {
        self.expiration = Some(expiration);
        self
    }

    /// Both the access key and the secret are present.
    #[inline]
    pub fn is_complete(&self) -> bool {
        !self.access_key_id.is_empty() && !self.secret_access_key.is_empty()
    }

    /// Access key id with everything but the first and last four characters hidden.
    pub fn masked_access_key(&self) -> String {
        let key = &self.access_key_id;
        if key.len() <= 8 || !key.is_ascii() {
            return "****".to_string();
        }
        format!("{}****{}", &key[..4], &key[key.len() - 4..])
    }
}

impl fmt::Debug for ScopedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedCredential")
            .field("access_key_id", &self.masked_access_key())
            .field("secret_access_key", &"<redacted>")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "<redacted>"),
            )
            .field("expiration", &self.expiration)
            .finish()
    }
}

/// A credential together with the instant after which it must not be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedCredential {
    pub credential: ScopedCredential,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CachedCredential {
    /// Wrap a freshly issued credential.
    ///
    /// The provider's `expiration` wins; without one the credential lives for
    /// `default_lifetime` from `acquired_at`, capped at the latest
    /// representable instant.
    pub fn new(
        credential: ScopedCredential,
        acquired_at: DateTime<Utc>,
        default_lifetime: Duration,
    ) -> Self {
        let expires_at = credential.expiration.unwrap_or_else(|| {
            acquired_at
                .checked_add_signed(default_lifetime)
                .unwrap_or(DateTime::<Utc>::MAX_UTC)
        });
        Self {
            credential,
            acquired_at,
            expires_at,
        }
    }

    /// Usable at `now`, treating it as expired `skew` early.
    #[inline]
    pub fn is_fresh_at(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        is_before_deadline(now, self.expires_at, skew)
    }
}

/// `now < expires_at - skew`; a skew reaching past the earliest
/// representable instant means nothing is fresh.
pub(crate) fn is_before_deadline(
    now: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    skew: Duration,
) -> bool {
    expires_at
        .checked_sub_signed(skew)
        .is_some_and(|deadline| now < deadline)
}

/// The signed-in user as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub user_id: String,
    pub username: Option<String>,
    pub email: Option<String>,
}

/// Result of a session fetch: scoped credentials plus the resolved identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentitySession {
    pub credentials: Option<ScopedCredential>,
    pub identity_id: Option<String>,
}
