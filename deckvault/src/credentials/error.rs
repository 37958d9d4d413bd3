//! Credential error types.

use thiserror::Error;

/// Failures reported by an identity session provider.
///
/// Providers map their wire-level error codes onto these variants once, at the
/// boundary, so the acquirer can classify failures with a plain `match`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The user is definitively not signed in (missing, revoked or expired token).
    #[error("Not authenticated: {0}")]
    NotAuthenticated(String),

    /// The provider throttled the request.
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// The session exists but could not be resolved yet (e.g. identity not propagated).
    #[error("Session unavailable: {0}")]
    SessionUnavailable(String),

    /// Network failure, timeout or provider-side 5xx.
    #[error("Transient provider error: {0}")]
    Transient(String),

    /// The provider answered with a body we could not interpret.
    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Check if this error means the user must sign in again.
    #[inline]
    pub fn requires_relogin(&self) -> bool {
        matches!(self, Self::NotAuthenticated(_))
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else {
            Self::Transient(err.to_string())
        }
    }
}

/// Errors surfaced by the credential acquirer.
#[derive(Debug, Clone, Error)]
pub enum CredentialError {
    /// The caller holds no valid identity session. Never retried.
    #[error("Not authenticated: {0}")]
    NotAuthenticated(String),

    /// Every attempt failed with a retryable error.
    #[error("Credential acquisition failed after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },
}

impl CredentialError {
    /// Check if this error requires manual re-login.
    pub fn requires_relogin(&self) -> bool {
        matches!(self, Self::NotAuthenticated(_))
    }
}
