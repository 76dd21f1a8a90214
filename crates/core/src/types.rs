use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

use crate::error::{NormalizationError, TransportError};

pub const SECURE_SCHEME: &str = "https://";

/// A stored push subscription as the record store hands it out.
///
/// `document` is the raw stored body. Depending on when the record was
/// written it holds the endpoint and keys either at the top level or under a
/// nested `subscription` object; the normalizer resolves that.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubscriptionRecord {
    pub id: String,
    pub user_id: Option<String>,
    pub user_role: Option<String>,
    pub document: JsonValue,
    pub persistent: bool,
    pub restored: bool,
    pub created_at: DateTime<Utc>,
}

impl SubscriptionRecord {
    /// Builds a record in the nested shape, the only shape new writes use.
    pub fn nested(
        user_id: &str,
        user_role: Option<&str>,
        descriptor: &SubscriptionDescriptor,
        created_at: DateTime<Utc>,
    ) -> Self {
        let document = json!({
            "userId": user_id,
            "subscription": descriptor,
            "createdAt": created_at,
            "persistent": true,
        });
        Self {
            id: user_id.to_string(),
            user_id: Some(user_id.to_string()),
            user_role: user_role.map(str::to_string),
            document,
            persistent: true,
            restored: false,
            created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubscriptionKeys {
    pub p256dh: String,
    pub auth: String,
}

/// Canonical delivery target for one push subscription.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubscriptionDescriptor {
    pub endpoint: String,
    pub keys: SubscriptionKeys,
}

impl SubscriptionDescriptor {
    pub fn new(endpoint: &str, p256dh: &str, auth: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            keys: SubscriptionKeys {
                p256dh: p256dh.to_string(),
                auth: auth.to_string(),
            },
        }
    }

    pub fn is_secure(&self) -> bool {
        self.endpoint.starts_with(SECURE_SCHEME)
    }

    pub fn is_valid(&self) -> bool {
        !self.endpoint.trim().is_empty()
            && self.is_secure()
            && !self.keys.p256dh.trim().is_empty()
            && !self.keys.auth.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchScope {
    All,
    Users(Vec<String>),
    Role(String),
}

impl DispatchScope {
    pub fn target_key(&self) -> String {
        match self {
            DispatchScope::All => "all".to_string(),
            DispatchScope::Users(_) => "users".to_string(),
            DispatchScope::Role(role) => format!("role:{}", role),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryTag {
    Alarm,
    ForceLogout,
    Test,
}

impl DeliveryTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryTag::Alarm => "alarm",
            DeliveryTag::ForceLogout => "force_logout",
            DeliveryTag::Test => "test",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushMessage {
    pub tag: DeliveryTag,
    pub title: Option<String>,
    pub body: Option<String>,
    pub object_id: Option<String>,
    pub object_name: Option<String>,
    pub user_id: Option<String>,
}

impl PushMessage {
    pub fn new(tag: DeliveryTag) -> Self {
        Self {
            tag,
            title: None,
            body: None,
            object_id: None,
            object_name: None,
            user_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchRequest {
    pub scope: DispatchScope,
    pub message: PushMessage,
    /// Overrides the rate-limit key derived from the scope.
    pub target: Option<String>,
    /// Deliver to records whose owner is no longer an active user.
    pub include_inactive: bool,
}

impl DispatchRequest {
    pub fn new(scope: DispatchScope, message: PushMessage) -> Self {
        Self {
            scope,
            message,
            target: None,
            include_inactive: false,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn including_inactive(mut self) -> Self {
        self.include_inactive = true;
        self
    }

    pub fn target_key(&self) -> String {
        match &self.target {
            Some(target) => target.clone(),
            None => self.scope.target_key(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FailureReason {
    Normalization(NormalizationError),
    InactiveUser,
    Transport(TransportError),
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::Normalization(err) => write!(f, "{}", err),
            FailureReason::InactiveUser => f.write_str("owner is not an active user"),
            FailureReason::Transport(err) => write!(f, "{}", err),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchFailure {
    pub record_id: String,
    pub reason: FailureReason,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchResult {
    pub success_count: usize,
    pub failures: Vec<DispatchFailure>,
}

impl DispatchResult {
    pub fn error_count(&self) -> usize {
        self.failures.len()
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct StoreStats {
    pub subscriptions: u64,
    pub users: u64,
}
