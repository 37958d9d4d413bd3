//! Identity session provider abstraction.
//!
//! The managed identity service lives behind this trait. Concrete
//! implementations: [`CognitoIdentityProvider`](super::CognitoIdentityProvider)
//! and [`StaticIdentityProvider`].

use async_trait::async_trait;

use super::error::ProviderError;
use super::types::{IdentitySession, ScopedCredential, SessionUser};

/// A managed identity service able to mint scoped data-store credentials for
/// the signed-in user.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentitySessionProvider: Send + Sync {
    /// Return the signed-in user.
    ///
    /// # Returns
    /// * `Ok(SessionUser)` - A session is present
    /// * `Err(ProviderError::NotAuthenticated)` - Nobody is signed in
    /// * `Err(...)` - The session could not be checked
    async fn current_user(&self) -> Result<SessionUser, ProviderError>;

    /// Fetch the current session, including freshly minted scoped credentials.
    async fn fetch_session(&self) -> Result<IdentitySession, ProviderError>;
}

/// Provider answering with a fixed credential.
///
/// Used for local development and server-side tooling where the credential is
/// taken from the environment instead of a user sign-in.
pub struct StaticIdentityProvider {
    user: SessionUser,
    credential: Option<ScopedCredential>,
}

impl StaticIdentityProvider {
    pub fn new(user_id: impl Into<String>, credential: Option<ScopedCredential>) -> Self {
        Self {
            user: SessionUser {
                user_id: user_id.into(),
                username: None,
                email: None,
            },
            credential,
        }
    }
}

#[async_trait]
impl IdentitySessionProvider for StaticIdentityProvider {
    async fn current_user(&self) -> Result<SessionUser, ProviderError> {
        if self.credential.is_none() {
            return Err(ProviderError::NotAuthenticated(
                "no static credentials configured".to_string(),
            ));
        }
        Ok(self.user.clone())
    }

    async fn fetch_session(&self) -> Result<IdentitySession, ProviderError> {
        Ok(IdentitySession {
            credentials: self.credential.clone(),
            identity_id: Some(self.user.user_id.clone()),
        })
    }
}
