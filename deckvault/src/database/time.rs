//! Timestamp helpers for the database layer.
//!
//! Records carry `createdAt` / `updatedAt` as RFC 3339 UTC strings with
//! millisecond precision.

use chrono::{DateTime, SecondsFormat, Utc};

/// Current time as an RFC 3339 string.
#[inline]
pub fn now_rfc3339() -> String {
    to_rfc3339(Utc::now())
}

/// Format a timestamp the way records store it.
#[inline]
pub fn to_rfc3339(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}
