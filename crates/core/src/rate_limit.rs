use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::{self, BoxFuture, FutureExt};

use crate::error::RateLimitError;
use crate::ports::RateLimiter;

pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(5000);

/// Above this many tracked keys, keys whose window has already passed are
/// dropped on the next acceptance.
pub const DEFAULT_SOFT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Accepted,
    Rejected { retry_after: u64 },
}

/// Whole seconds to wait for `remaining_ms`, rounded up.
pub fn retry_after_secs(remaining_ms: i64) -> u64 {
    if remaining_ms <= 0 {
        return 0;
    }
    let remaining_ms = remaining_ms as u64;
    remaining_ms.div_ceil(1000)
}

pub fn interval_millis(interval: Duration) -> i64 {
    i64::try_from(interval.as_millis()).unwrap_or(i64::MAX)
}

#[derive(Debug, Clone, Copy)]
struct Window {
    last_accepted: DateTime<Utc>,
    interval_ms: i64,
}

#[derive(Debug)]
pub struct MemoryRateLimiter {
    windows: Mutex<HashMap<String, Window>>,
    soft_capacity: usize,
}

impl Default for MemoryRateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_SOFT_CAPACITY)
    }
}

impl MemoryRateLimiter {
    pub fn new(soft_capacity: usize) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            soft_capacity,
        }
    }

    pub fn check(&self, key: &str, now: DateTime<Utc>, min_interval: Duration) -> RateDecision {
        let interval_ms = interval_millis(min_interval);
        let mut windows = match self.windows.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(window) = windows.get(key) {
            let elapsed = (now - window.last_accepted).num_milliseconds();
            if elapsed < interval_ms {
                return RateDecision::Rejected {
                    retry_after: retry_after_secs((interval_ms - elapsed).min(interval_ms)),
                };
            }
        }

        windows.insert(
            key.to_string(),
            Window {
                last_accepted: now,
                interval_ms,
            },
        );

        if windows.len() > self.soft_capacity {
            windows.retain(|_, window| {
                (now - window.last_accepted).num_milliseconds() < window.interval_ms
            });
        }

        RateDecision::Accepted
    }

    pub fn tracked_keys(&self) -> usize {
        match self.windows.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

impl RateLimiter for MemoryRateLimiter {
    fn try_acquire<'a>(
        &'a self,
        key: &'a str,
        now: DateTime<Utc>,
        min_interval: Duration,
    ) -> BoxFuture<'a, Result<RateDecision, RateLimitError>> {
        future::ready(Ok(self.check(key, now, min_interval))).boxed()
    }
}
