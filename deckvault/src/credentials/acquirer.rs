//! Scoped credential acquisition.
//!
//! Returns a currently-valid [`ScopedCredential`], calling the identity
//! provider only when the cache is empty or expired, and retrying transient
//! provider failures with classified backoff.

use std::sync::Arc;

use chrono::Utc;
use tokio::time::{Instant, sleep};
use tracing::{debug, error, info, instrument, warn};

use super::cache::CredentialCache;
use super::error::{CredentialError, ProviderError};
use super::policy::{FailureClass, RetryPolicy};
use super::provider::IdentitySessionProvider;
use super::types::{CachedCredential, ScopedCredential};

/// Per-call retry bookkeeping. Never persisted.
struct AttemptState {
    attempt_index: u32,
    started_at: Instant,
}

impl AttemptState {
    fn start() -> Self {
        Self {
            attempt_index: 0,
            started_at: Instant::now(),
        }
    }

    fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started_at.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// Credential acquirer.
///
/// Owns no global state: the cache is injected so several acquirers (or a
/// test) can share or isolate it explicitly.
pub struct CredentialAcquirer {
    provider: Arc<dyn IdentitySessionProvider>,
    cache: Arc<CredentialCache>,
    policy: RetryPolicy,
}

impl CredentialAcquirer {
    pub fn new(
        provider: Arc<dyn IdentitySessionProvider>,
        cache: Arc<CredentialCache>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            cache,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Drop the cached credential so the next call goes to the provider.
    pub fn invalidate(&self) {
        self.cache.invalidate();
    }

    /// Return a valid credential.
    pub async fn credential(&self) -> Result<ScopedCredential, CredentialError> {
        self.acquire().await.map(|cached| cached.credential)
    }

    /// Return a valid credential together with its computed expiry.
    ///
    /// # Returns
    /// * `Ok(CachedCredential)` - From cache or freshly acquired
    /// * `Err(CredentialError::NotAuthenticated)` - No session; not retried
    /// * `Err(CredentialError::Exhausted)` - Every attempt failed
    #[instrument(skip(self))]
    pub async fn acquire(&self) -> Result<CachedCredential, CredentialError> {
        let skew = self.policy.refresh_skew_chrono();

        if let Some(cached) = self.cache.get_fresh(Utc::now(), skew) {
            return Ok(cached);
        }

        let _guard = self.cache.lock_refresh().await;

        // Double-check after acquiring lock (another task may have refreshed)
        if let Some(cached) = self.cache.get_fresh(Utc::now(), skew) {
            debug!("Credential refreshed by a concurrent caller");
            return Ok(cached);
        }

        self.acquire_with_retry().await
    }

    async fn acquire_with_retry(&self) -> Result<CachedCredential, CredentialError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut state = AttemptState::start();
        let mut previous = FailureClass::Generic;
        let mut last_error = String::new();

        while state.attempt_index < max_attempts {
            let attempt = state.attempt_index;
            if attempt > 0 {
                let delay = self.policy.delay_before_attempt(attempt, previous);
                warn!(
                    attempt = attempt + 1,
                    max_attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    class = %previous,
                    error = %last_error,
                    "Retrying credential acquisition"
                );
                sleep(delay).await;
            }

            match self.attempt_once().await {
                Ok(credential) => {
                    let cached = CachedCredential::new(
                        credential,
                        Utc::now(),
                        self.policy.default_lifetime_chrono(),
                    );
                    info!(
                        access_key = %cached.credential.masked_access_key(),
                        expires_at = %cached.expires_at,
                        attempts = attempt + 1,
                        elapsed_ms = state.elapsed_ms(),
                        "Scoped credential acquired"
                    );
                    self.cache.store(cached.clone());
                    return Ok(cached);
                }
                Err(err) => {
                    let class = FailureClass::of(&err);
                    if !class.is_retryable() {
                        warn!(error = %err, "Identity session is not authenticated");
                        return Err(CredentialError::NotAuthenticated(err.to_string()));
                    }
                    debug!(attempt = attempt + 1, class = %class, error = %err, "Credential attempt failed");
                    previous = class;
                    last_error = err.to_string();
                }
            }

            state.attempt_index += 1;
        }

        error!(
            attempts = max_attempts,
            elapsed_ms = state.elapsed_ms(),
            error = %last_error,
            "Credential acquisition exhausted"
        );
        Err(CredentialError::Exhausted {
            attempts: max_attempts,
            last_error,
        })
    }

    /// One provider round trip: verify the session, then fetch credentials.
    async fn attempt_once(&self) -> Result<ScopedCredential, ProviderError> {
        let user = self.provider.current_user().await?;
        debug!(user_id = %user.user_id, "Identity session verified");

        let session = self.provider.fetch_session().await?;
        match session.credentials {
            Some(credential) if credential.is_complete() => Ok(credential),
            _ => Err(ProviderError::InvalidResponse(
                "session did not include an access key and secret".to_string(),
            )),
        }
    }
}
