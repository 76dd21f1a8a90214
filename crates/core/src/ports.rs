use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;

use crate::error::{RateLimitError, StoreError, TransportError};
use crate::rate_limit::RateDecision;
use crate::types::{StoreStats, SubscriptionDescriptor, SubscriptionRecord};

pub trait RecordStore: Send + Sync {
    fn query_all(&self) -> BoxFuture<'_, Result<Vec<SubscriptionRecord>, StoreError>>;

    fn query_by_user_ids<'a>(
        &'a self,
        user_ids: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<SubscriptionRecord>, StoreError>>;

    fn query_by_role<'a>(
        &'a self,
        role: &'a str,
    ) -> BoxFuture<'a, Result<Vec<SubscriptionRecord>, StoreError>>;

    fn delete<'a>(&'a self, record_id: &'a str) -> BoxFuture<'a, Result<(), StoreError>>;

    fn query_active_user_ids(&self) -> BoxFuture<'_, Result<HashSet<String>, StoreError>>;

    /// Inserts or replaces the record with the same id.
    fn save<'a>(&'a self, record: &'a SubscriptionRecord) -> BoxFuture<'a, Result<(), StoreError>>;

    /// Returns the number of records removed.
    fn delete_by_user<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<u64, StoreError>>;

    fn stats(&self) -> BoxFuture<'_, Result<StoreStats, StoreError>>;
}

pub trait PushTransport: Send + Sync {
    fn send<'a>(
        &'a self,
        descriptor: &'a SubscriptionDescriptor,
        payload: &'a str,
    ) -> BoxFuture<'a, Result<(), TransportError>>;
}

pub trait RateLimiter: Send + Sync {
    /// Accepts and records `now` for `key` in one step, or rejects.
    fn try_acquire<'a>(
        &'a self,
        key: &'a str,
        now: DateTime<Utc>,
        min_interval: Duration,
    ) -> BoxFuture<'a, Result<RateDecision, RateLimitError>>;
}
