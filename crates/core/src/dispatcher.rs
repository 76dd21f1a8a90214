use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::error::{DispatchError, StoreError};
use crate::normalize::normalize;
use crate::payload::{PushPayload, DEFAULT_ICON};
use crate::ports::{PushTransport, RateLimiter, RecordStore};
use crate::rate_limit::{RateDecision, DEFAULT_MIN_INTERVAL};
use crate::types::{
    DispatchFailure, DispatchRequest, DispatchResult, DispatchScope, FailureReason,
    SubscriptionRecord,
};

pub const DEFAULT_MAX_CONCURRENCY: usize = 16;

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub min_interval: Duration,
    pub max_concurrency: usize,
    /// Skip records whose owner is missing from the active user set.
    pub skip_inactive_users: bool,
    pub icon: String,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            min_interval: DEFAULT_MIN_INTERVAL,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            skip_inactive_users: false,
            icon: DEFAULT_ICON.to_string(),
        }
    }
}

/// Fans one message out to every subscription in a scope.
///
/// Each call is rate limited per target key before the store is touched.
/// Past that point only a failing store query aborts the call; every
/// per-record problem ends up in [`DispatchResult::failures`]. Subscriptions
/// whose endpoint the push service reports as gone are deleted on the way.
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<dyn RecordStore>,
    transport: Arc<dyn PushTransport>,
    limiter: Arc<dyn RateLimiter>,
    settings: DispatchSettings,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn RecordStore>,
        transport: Arc<dyn PushTransport>,
        limiter: Arc<dyn RateLimiter>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            store,
            transport,
            limiter,
            settings,
        }
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    pub async fn dispatch(
        &self,
        request: &DispatchRequest,
        now: DateTime<Utc>,
    ) -> Result<DispatchResult, DispatchError> {
        let target_key = request.target_key();
        let decision = self
            .limiter
            .try_acquire(&target_key, now, self.settings.min_interval)
            .await?;
        if let RateDecision::Rejected { retry_after } = decision {
            info!(%target_key, retry_after, "dispatch rate limited");
            return Err(DispatchError::RateLimited { retry_after });
        }

        let records = self.candidates(&request.scope).await?;
        if records.is_empty() {
            info!(%target_key, "no subscriptions in scope");
            return Ok(DispatchResult::default());
        }

        let active_users = if self.settings.skip_inactive_users && !request.include_inactive {
            let active = self.store.query_active_user_ids().await?;
            // an empty user table means there is no user data to filter on
            if active.is_empty() {
                debug!(%target_key, "no active users recorded, owner gate skipped");
                None
            } else {
                Some(active)
            }
        } else {
            None
        };

        let payload = PushPayload::render(&request.message, &self.settings.icon, now).to_json()?;

        info!(
            %target_key,
            tag = request.message.tag.as_str(),
            candidates = records.len(),
            "dispatching push"
        );

        let payload = payload.as_str();
        let active_users = active_users.as_ref();
        // futures are built up front so the awaited stream holds no closure
        let deliveries: Vec<_> = records
            .iter()
            .enumerate()
            .map(|(index, record)| async move {
                (index, self.deliver(record, payload, active_users).await)
            })
            .collect();
        let mut outcomes: Vec<(usize, Result<(), FailureReason>)> = stream::iter(deliveries)
            .buffer_unordered(self.settings.max_concurrency.max(1))
            .collect()
            .await;
        outcomes.sort_by_key(|(index, _)| *index);

        let mut result = DispatchResult::default();
        for (index, outcome) in outcomes {
            match outcome {
                Ok(()) => result.success_count += 1,
                Err(reason) => result.failures.push(DispatchFailure {
                    record_id: records[index].id.clone(),
                    reason,
                }),
            }
        }

        info!(
            %target_key,
            sent = result.success_count,
            failed = result.error_count(),
            "dispatch finished"
        );

        Ok(result)
    }

    async fn candidates(
        &self,
        scope: &DispatchScope,
    ) -> Result<Vec<SubscriptionRecord>, StoreError> {
        match scope {
            DispatchScope::All => self.store.query_all().await,
            DispatchScope::Users(user_ids) if user_ids.is_empty() => Ok(Vec::new()),
            DispatchScope::Users(user_ids) => self.store.query_by_user_ids(user_ids).await,
            DispatchScope::Role(role) => self.store.query_by_role(role).await,
        }
    }

    async fn deliver(
        &self,
        record: &SubscriptionRecord,
        payload: &str,
        active_users: Option<&HashSet<String>>,
    ) -> Result<(), FailureReason> {
        if let (Some(active_users), Some(user_id)) = (active_users, record.user_id.as_deref()) {
            if !active_users.contains(user_id) {
                warn!(record_id = %record.id, user_id, "skipping subscription of inactive user");
                return Err(FailureReason::InactiveUser);
            }
        }

        let descriptor = normalize(record).map_err(|err| {
            warn!(record_id = %record.id, error = %err, "malformed subscription record");
            FailureReason::Normalization(err)
        })?;

        match self.transport.send(&descriptor, payload).await {
            Ok(()) => {
                debug!(record_id = %record.id, "push delivered");
                Ok(())
            }
            Err(err) => {
                warn!(record_id = %record.id, error = %err, gone = err.is_gone(), "push delivery failed");
                if err.is_gone() {
                    self.prune(&record.id).await;
                }
                Err(FailureReason::Transport(err))
            }
        }
    }

    async fn prune(&self, record_id: &str) {
        match self.store.delete(record_id).await {
            Ok(()) => info!(%record_id, "pruned gone subscription"),
            Err(err) => warn!(%record_id, error = %err, "failed to prune gone subscription"),
        }
    }
}
