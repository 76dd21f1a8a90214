//! Resolves the two stored subscription shapes into a canonical descriptor.
//!
//! Records written by the current registration flow nest the browser's
//! subscription object under `subscription`; older records stored it flat.
//! Nothing downstream of [`normalize`] ever looks at the raw document.

use serde_json::Value as JsonValue;

use crate::error::NormalizationError;
use crate::types::{SubscriptionDescriptor, SubscriptionKeys, SubscriptionRecord};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RecordShape<'a> {
    Nested(&'a JsonValue),
    Flat(&'a JsonValue),
}

impl<'a> RecordShape<'a> {
    pub fn of(document: &'a JsonValue) -> Self {
        match document.get("subscription") {
            Some(inner) if inner.is_object() => RecordShape::Nested(inner),
            _ => RecordShape::Flat(document),
        }
    }

    pub fn source(&self) -> &'a JsonValue {
        match self {
            RecordShape::Nested(source) | RecordShape::Flat(source) => source,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RecordShape::Nested(_) => "nested",
            RecordShape::Flat(_) => "flat",
        }
    }
}

pub fn normalize(record: &SubscriptionRecord) -> Result<SubscriptionDescriptor, NormalizationError> {
    normalize_document(&record.document)
}

pub fn normalize_document(
    document: &JsonValue,
) -> Result<SubscriptionDescriptor, NormalizationError> {
    let source = RecordShape::of(document).source();

    let endpoint = present(source.get("endpoint")).ok_or(NormalizationError::MissingEndpoint)?;
    let keys = source
        .get("keys")
        .filter(|keys| keys.is_object())
        .ok_or(NormalizationError::MissingKeys)?;
    let p256dh = present(keys.get("p256dh")).ok_or(NormalizationError::MissingKeys)?;
    let auth = present(keys.get("auth")).ok_or(NormalizationError::MissingKeys)?;

    Ok(SubscriptionDescriptor {
        endpoint: endpoint.to_string(),
        keys: SubscriptionKeys {
            p256dh: p256dh.to_string(),
            auth: auth.to_string(),
        },
    })
}

fn present(value: Option<&JsonValue>) -> Option<&str> {
    value
        .and_then(JsonValue::as_str)
        .filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn record(document: JsonValue) -> SubscriptionRecord {
        SubscriptionRecord {
            id: "r1".to_string(),
            user_id: None,
            user_role: None,
            document,
            persistent: false,
            restored: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_nested_shape() {
        let record = record(json!({
            "userId": "u1",
            "subscription": {
                "endpoint": "https://push.example/abc",
                "keys": { "p256dh": "k1", "auth": "a1" }
            }
        }));

        let descriptor = normalize(&record).unwrap();
        assert_eq!(
            descriptor,
            SubscriptionDescriptor::new("https://push.example/abc", "k1", "a1")
        );
        assert_eq!(RecordShape::of(&record.document).label(), "nested");
    }

    #[test]
    fn test_flat_shape() {
        let record = record(json!({
            "endpoint": "https://push.example/flat",
            "keys": { "p256dh": "k2", "auth": "a2" }
        }));

        let descriptor = normalize(&record).unwrap();
        assert_eq!(descriptor.endpoint, "https://push.example/flat");
        assert_eq!(descriptor.keys.auth, "a2");
        assert_eq!(RecordShape::of(&record.document).label(), "flat");
    }

    #[test]
    fn test_missing_endpoint() {
        let empty = record(json!({ "endpoint": "", "keys": {} }));
        assert_eq!(normalize(&empty), Err(NormalizationError::MissingEndpoint));

        let nested = record(json!({ "subscription": { "keys": {} } }));
        assert_eq!(normalize(&nested), Err(NormalizationError::MissingEndpoint));
    }

    #[test]
    fn test_missing_keys() {
        let no_keys = record(json!({ "endpoint": "https://push.example/1" }));
        assert_eq!(normalize(&no_keys), Err(NormalizationError::MissingKeys));

        let no_auth = record(json!({
            "endpoint": "https://push.example/1",
            "keys": { "p256dh": "k1" }
        }));
        assert_eq!(normalize(&no_auth), Err(NormalizationError::MissingKeys));

        let empty_p256dh = record(json!({
            "subscription": {
                "endpoint": "https://push.example/1",
                "keys": { "p256dh": "", "auth": "a1" }
            }
        }));
        assert_eq!(normalize(&empty_p256dh), Err(NormalizationError::MissingKeys));
    }

    #[test]
    fn test_endpoint_scheme_not_checked() {
        let record = record(json!({
            "endpoint": "http://insecure.example/1",
            "keys": { "p256dh": "k1", "auth": "a1" }
        }));
        let descriptor = normalize(&record).unwrap();
        assert!(!descriptor.is_valid());
    }

    #[test]
    fn test_normalization_is_deterministic() {
        let good = record(json!({
            "subscription": {
                "endpoint": "https://push.example/1",
                "keys": { "p256dh": "k1", "auth": "a1" }
            }
        }));
        let bad = record(json!({ "keys": { "p256dh": "k1", "auth": "a1" } }));

        assert_eq!(normalize(&good), normalize(&good));
        assert_eq!(normalize(&bad), normalize(&bad));
    }

    #[test]
    fn test_null_subscription_falls_back_to_flat() {
        let record = record(json!({
            "subscription": null,
            "endpoint": "https://push.example/legacy",
            "keys": { "p256dh": "k1", "auth": "a1" }
        }));
        assert_eq!(
            normalize(&record).unwrap().endpoint,
            "https://push.example/legacy"
        );
    }
}
