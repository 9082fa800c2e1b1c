//! Per-user request window accounting.
//!
//! The persistent half lives in [`crate::entities::RateLimitStore`]; this
//! module holds the policy and the record shape shared by every backend.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Default accounting window.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Default ceiling of accepted requests per window.
pub const DEFAULT_MAX_REQUESTS: u32 = 20;

/// Window length and ceiling applied to every user.
///
/// A request is allowed when the user has no record, when the record's window
/// is at least `window` old (the count restarts at 1), or when the count is
/// still below `max_requests` (the count is incremented). Anything else is
/// denied and leaves the record untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub window: Duration,
    pub max_requests: u32,
}

impl RateLimitPolicy {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
        }
    }

    pub fn window_ms(&self) -> i64 {
        i64::try_from(self.window.as_millis()).unwrap_or(i64::MAX)
    }
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW, DEFAULT_MAX_REQUESTS)
    }
}

/// One user's current window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitRecord {
    pub window_start: DateTime<Utc>,
    pub count: u32,
}
