use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use redis::Client as RedisClient;
use tracing::debug;
use vigil_core::error::RateLimitError;
use vigil_core::ports::RateLimiter;
use vigil_core::rate_limit::{interval_millis, retry_after_secs, RateDecision};

const KEY_PREFIX: &str = "vigil:rl:";

// Returns the milliseconds left in the window, or 0 after recording `now`.
const ACQUIRE_SCRIPT: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local interval = tonumber(ARGV[2])

local last = redis.call('GET', key)
if last then
  local elapsed = now - tonumber(last)
  if elapsed < interval then
    return math.min(interval, interval - elapsed)
  end
end

redis.call('SET', key, now, 'PX', interval)
return 0
"#;

/// Send-interval limiter shared by every api replica pointing at one redis.
#[derive(Clone)]
pub struct RedisRateLimiter {
    client: RedisClient,
    script: redis::Script,
}

impl RedisRateLimiter {
    pub fn new(client: RedisClient) -> Self {
        Self {
            client,
            script: redis::Script::new(ACQUIRE_SCRIPT),
        }
    }

    async fn acquire(&self, key: &str, now_ms: i64, interval_ms: i64) -> redis::RedisResult<i64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        self.script
            .key(format!("{}{}", KEY_PREFIX, key))
            .arg(now_ms)
            .arg(interval_ms)
            .invoke_async(&mut conn)
            .await
    }
}

fn decision(remaining_ms: i64) -> RateDecision {
    if remaining_ms > 0 {
        RateDecision::Rejected {
            retry_after: retry_after_secs(remaining_ms),
        }
    } else {
        RateDecision::Accepted
    }
}

impl RateLimiter for RedisRateLimiter {
    fn try_acquire<'a>(
        &'a self,
        key: &'a str,
        now: DateTime<Utc>,
        min_interval: Duration,
    ) -> BoxFuture<'a, Result<RateDecision, RateLimitError>> {
        Box::pin(async move {
            let interval_ms = interval_millis(min_interval);
            if interval_ms <= 0 {
                return Ok(RateDecision::Accepted);
            }
            let remaining = self
                .acquire(key, now.timestamp_millis(), interval_ms)
                .await
                .map_err(|err| RateLimitError(err.to_string()))?;
            debug!(key, remaining, "redis rate limit checked");
            Ok(decision(remaining))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_remaining_accepts() {
        assert_eq!(decision(0), RateDecision::Accepted);
    }

    #[test]
    fn test_remaining_rounds_up_to_seconds() {
        assert_eq!(decision(3500), RateDecision::Rejected { retry_after: 4 });
        assert_eq!(decision(1), RateDecision::Rejected { retry_after: 1 });
        assert_eq!(decision(5000), RateDecision::Rejected { retry_after: 5 });
    }

    #[test]
    fn test_zero_interval_never_touches_redis() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        // nothing listens on this port; the call must not connect
        let client = RedisClient::open("redis://127.0.0.1:1/").unwrap();
        let limiter = RedisRateLimiter::new(client);

        let decision = rt
            .block_on(limiter.try_acquire("all", Utc::now(), Duration::ZERO))
            .unwrap();
        assert_eq!(decision, RateDecision::Accepted);
    }
}
