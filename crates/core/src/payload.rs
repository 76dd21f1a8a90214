use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::{DeliveryTag, PushMessage};

pub const DEFAULT_ICON: &str = "/icons/icon-192x192.png";

/// Notification body as the service worker on the receiving client reads it.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PushPayload {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub tag: DeliveryTag,
    pub require_interaction: bool,
    pub data: PayloadData,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<PayloadAction>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PayloadData {
    #[serde(rename = "type")]
    pub kind: DeliveryTag,
    pub timestamp: i64,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PayloadAction {
    pub action: String,
    pub title: String,
}

impl PushPayload {
    pub fn render(message: &PushMessage, icon: &str, now: DateTime<Utc>) -> Self {
        let (default_title, default_body) = default_text(message.tag);
        let title = non_blank(message.title.as_deref()).unwrap_or(default_title);
        let body = non_blank(message.body.as_deref()).unwrap_or(default_body);

        Self {
            title: title.to_string(),
            body: body.to_string(),
            icon: icon.to_string(),
            badge: icon.to_string(),
            tag: message.tag,
            require_interaction: true,
            data: PayloadData {
                kind: message.tag,
                timestamp: now.timestamp_millis(),
                url: target_url(message),
                object_id: message.object_id.clone(),
                object_name: message.object_name.clone(),
                user_id: message.user_id.clone(),
            },
            actions: actions_for(message.tag),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

fn default_text(tag: DeliveryTag) -> (&'static str, &'static str) {
    match tag {
        DeliveryTag::Alarm => (
            "Alarm",
            "A security alarm was raised and needs immediate attention.",
        ),
        DeliveryTag::ForceLogout => (
            "Signed out",
            "Your session was ended by an administrator.",
        ),
        DeliveryTag::Test => ("Test notification", "Push delivery is working."),
    }
}

fn target_url(message: &PushMessage) -> String {
    match message.tag {
        DeliveryTag::Alarm => match message.object_id.as_deref() {
            Some(object_id) => format!("/alarm/{}", object_id),
            None => "/alarm".to_string(),
        },
        DeliveryTag::ForceLogout => "/login".to_string(),
        DeliveryTag::Test => "/".to_string(),
    }
}

fn actions_for(tag: DeliveryTag) -> Vec<PayloadAction> {
    let (action, title) = match tag {
        DeliveryTag::Alarm => ("view", "View"),
        DeliveryTag::ForceLogout => ("logout", "Sign out"),
        DeliveryTag::Test => return Vec::new(),
    };
    vec![PayloadAction {
        action: action.to_string(),
        title: title.to_string(),
    }]
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_750_000_000_123).unwrap()
    }

    #[test]
    fn test_alarm_payload_shape() {
        let mut message = PushMessage::new(DeliveryTag::Alarm);
        message.title = Some("Intrusion".to_string());
        message.body = Some("Door sensor tripped".to_string());
        message.object_id = Some("obj_7".to_string());
        message.object_name = Some("Warehouse".to_string());

        let payload = PushPayload::render(&message, DEFAULT_ICON, now());
        let value = serde_json::to_value(&payload).unwrap();

        assert_eq!(value["title"], "Intrusion");
        assert_eq!(value["body"], "Door sensor tripped");
        assert_eq!(value["tag"], "alarm");
        assert_eq!(value["requireInteraction"], true);
        assert_eq!(value["icon"], DEFAULT_ICON);
        assert_eq!(value["badge"], DEFAULT_ICON);
        assert_eq!(value["data"]["type"], "alarm");
        assert_eq!(value["data"]["timestamp"], 1_750_000_000_123i64);
        assert_eq!(value["data"]["url"], "/alarm/obj_7");
        assert_eq!(value["data"]["objectId"], "obj_7");
        assert_eq!(value["data"]["objectName"], "Warehouse");
        assert!(value["data"].get("userId").is_none());
        assert_eq!(value["actions"][0]["action"], "view");
    }

    #[test]
    fn test_defaults_fill_blank_text() {
        let mut message = PushMessage::new(DeliveryTag::Alarm);
        message.title = Some("   ".to_string());

        let payload = PushPayload::render(&message, DEFAULT_ICON, now());
        assert_eq!(payload.title, "Alarm");
        assert!(!payload.body.is_empty());
        assert_eq!(payload.data.url, "/alarm");
    }

    #[test]
    fn test_force_logout_payload() {
        let mut message = PushMessage::new(DeliveryTag::ForceLogout);
        message.body = Some("Account disabled".to_string());
        message.user_id = Some("u1".to_string());

        let payload = PushPayload::render(&message, "/logo192.png", now());
        let value = serde_json::to_value(&payload).unwrap();

        assert_eq!(value["tag"], "force_logout");
        assert_eq!(value["body"], "Account disabled");
        assert_eq!(value["data"]["userId"], "u1");
        assert_eq!(value["data"]["url"], "/login");
        assert_eq!(value["actions"][0]["action"], "logout");
    }

    #[test]
    fn test_test_payload_has_no_actions() {
        let payload = PushPayload::render(&PushMessage::new(DeliveryTag::Test), DEFAULT_ICON, now());
        let json = payload.to_json().unwrap();
        assert!(!json.contains("actions"));
        assert!(json.contains("\"tag\":\"test\""));
    }
}
