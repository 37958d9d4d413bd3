//! Scoped credential acquisition.
//!
//! # Architecture
//!
//! - [`IdentitySessionProvider`]: Managed identity service minting scoped credentials
//! - [`CredentialCache`]: Single-slot cache with a single-flight refresh lock
//! - [`RetryPolicy`] / [`FailureClass`]: Backoff schedule per failure class
//! - [`CredentialAcquirer`]: Cache check, then bounded classified retries

mod acquirer;
mod cache;
mod cognito;
mod error;
mod policy;
mod provider;
mod types;

pub use acquirer::CredentialAcquirer;
pub use cache::CredentialCache;
pub use cognito::{CognitoConfig, CognitoIdentityProvider};
pub use error::{CredentialError, ProviderError};
pub use policy::{
    DEFAULT_BASE_DELAY, DEFAULT_CREDENTIAL_LIFETIME, DEFAULT_MAX_ATTEMPTS, FailureClass,
    RetryPolicy,
};
pub use provider::IdentitySessionProvider;
pub use provider::StaticIdentityProvider;
pub use types::{CachedCredential, IdentitySession, ScopedCredential, SessionUser};
pub(crate) use types::is_before_deadline;

#[cfg(test)]
pub use provider::MockIdentitySessionProvider;
