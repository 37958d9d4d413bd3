//! Retry policy and failure classification for credential acquisition.

use std::time::Duration;

use rand::RngExt;

use super::error::ProviderError;

/// Default maximum number of acquisition attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default backoff base.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Lifetime assigned to credentials issued without an expiration.
pub const DEFAULT_CREDENTIAL_LIFETIME: Duration = Duration::from_secs(3600);

/// How a failed attempt affects the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum FailureClass {
    /// Stop immediately.
    Fatal,
    /// Provider throttling; back off harder.
    RateLimited,
    /// Session not resolvable yet; moderate backoff.
    TransientSession,
    /// Anything else; plain exponential backoff.
    Generic,
}

impl FailureClass {
    /// Classify a provider failure.
    pub fn of(err: &ProviderError) -> Self {
        match err {
            ProviderError::NotAuthenticated(_) => Self::Fatal,
            ProviderError::RateLimited(_) => Self::RateLimited,
            ProviderError::SessionUnavailable(_) => Self::TransientSession,
            ProviderError::Transient(_) | ProviderError::InvalidResponse(_) => Self::Generic,
        }
    }

    #[inline]
    pub fn is_retryable(self) -> bool {
        !matches!(self, Self::Fatal)
    }
}

/// Configuration for credential acquisition retries and caching.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,
    /// Base delay. Attempt `k` waits at least `base * 2^(k-1)`.
    pub base_delay: Duration,
    /// Lifetime for credentials that come without an expiration.
    pub default_lifetime: Duration,
    /// Treat cached credentials as expired this much early.
    pub refresh_skew: Duration,
    /// When true, adds random jitter of [0, base_delay/2) to every delay.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            default_lifetime: DEFAULT_CREDENTIAL_LIFETIME,
            refresh_skew: Duration::ZERO,
            jitter: false,
        }
    }
}

impl RetryPolicy {
    /// Exponential component of the delay before `attempt` (0-indexed).
    pub fn exponential_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        // 2^(attempt-1) with a checked shift so large attempts saturate.
        let multiplier = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
        scale(self.base_delay, multiplier)
    }

    /// Delay before `attempt` given the class of the previous attempt's failure.
    ///
    /// - `Generic`: `base * 2^(k-1)`
    /// - `TransientSession`: `base * 2^(k-1) + base * 2`
    /// - `RateLimited`: `base * 2^(k-1) + base * 5 * k`
    pub fn delay_before_attempt(&self, attempt: u32, previous: FailureClass) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let penalty = match previous {
            FailureClass::Generic | FailureClass::Fatal => Duration::ZERO,
            FailureClass::TransientSession => scale(self.base_delay, 2),
            FailureClass::RateLimited => scale(self.base_delay, 5u32.saturating_mul(attempt)),
        };
        let delay = self.exponential_delay(attempt).saturating_add(penalty);

        if !self.jitter {
            return delay;
        }

        let jitter_range_ms = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX) / 2;
        if jitter_range_ms == 0 {
            return delay;
        }
        let jitter_ms = rand::rng().random_range(0..jitter_range_ms);
        delay.saturating_add(Duration::from_millis(jitter_ms))
    }

    pub(crate) fn default_lifetime_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.default_lifetime).unwrap_or(chrono::Duration::hours(1))
    }

    pub(crate) fn refresh_skew_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.refresh_skew).unwrap_or(chrono::Duration::zero())
    }
}

fn scale(base: Duration, factor: u32) -> Duration {
    base.checked_mul(factor).unwrap_or(Duration::MAX)
}
