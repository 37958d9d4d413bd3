//! Single-slot credential cache.
//!
//! Holds the most recent scoped credential and its computed expiry. The slot
//! is read without awaiting; refreshes serialize on an async lock so that
//! concurrent callers observing an empty or expired slot share one
//! acquisition.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use tokio::sync::{Mutex, MutexGuard};

use super::types::CachedCredential;

pub struct CredentialCache {
    slot: RwLock<Option<CachedCredential>>,
    /// Held for the duration of a refresh.
    refresh_lock: Mutex<()>,
}

impl CredentialCache {
    pub fn new() -> Self {
        Self {
            slot: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Return the cached credential if it is still usable at `now`.
    pub fn get_fresh(&self, now: DateTime<Utc>, skew: Duration) -> Option<CachedCredential> {
        self.slot
            .read()
            .as_ref()
            .filter(|cached| cached.is_fresh_at(now, skew))
            .cloned()
    }

    /// Return the cached entry regardless of freshness.
    #[cfg(test)]
    pub(crate) fn peek(&self) -> Option<CachedCredential> {
        self.slot.read().clone()
    }

    /// Replace the slot wholesale.
    pub fn store(&self, cached: CachedCredential) {
        *self.slot.write() = Some(cached);
    }

    /// Drop the cached credential (sign-out, forced refresh).
    pub fn invalidate(&self) {
        self.slot.write().take();
    }

    /// Acquire the refresh lock.
    pub(crate) async fn lock_refresh(&self) -> MutexGuard<'_, ()> {
        self.refresh_lock.lock().await
    }
}

impl Default for CredentialCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::types::ScopedCredential;

    fn cached(expires_in: Duration) -> CachedCredential {
        let now = Utc::now();
        CachedCredential {
            credential: ScopedCredential::new("AKIA", "secret"),
            acquired_at: now,
            expires_at: now + expires_in,
        }
    }

    #[test]
    fn empty_cache_has_nothing_fresh() {
        let cache = CredentialCache::new();
        assert!(cache.get_fresh(Utc::now(), Duration::zero()).is_none());
        assert!(cache.peek().is_none());
    }

    #[test]
    fn expired_entries_are_treated_as_absent_but_kept() {
        let cache = CredentialCache::new();
        cache.store(cached(Duration::seconds(-5)));
        assert!(cache.get_fresh(Utc::now(), Duration::zero()).is_none());
        assert!(cache.peek().is_some());
    }

    #[test]
    fn store_replaces_and_invalidate_clears() {
        let cache = CredentialCache::new();
        cache.store(cached(Duration::minutes(10)));
        let mut replacement = cached(Duration::minutes(30));
        replacement.credential = ScopedCredential::new("AKIA2", "secret2");
        cache.store(replacement);

        let fresh = cache.get_fresh(Utc::now(), Duration::zero()).unwrap();
        assert_eq!(fresh.credential.access_key_id, "AKIA2");

        cache.invalidate();
        assert!(cache.peek().is_none());
    }

    #[test]
    fn skew_expires_entries_early() {
        let cache = CredentialCache::new();
        cache.store(cached(Duration::minutes(2)));
        assert!(cache.get_fresh(Utc::now(), Duration::zero()).is_some());
        assert!(cache.get_fresh(Utc::now(), Duration::minutes(5)).is_none());
    }
}
