use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use vigil_core::SubscriptionRecord;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SubscriptionRow {
    pub id: String,
    pub user_id: Option<String>,
    pub user_role: Option<String>,
    pub document: serde_json::Value,
    pub persistent: bool,
    pub restored: bool,
    pub created_at: DateTime<Utc>,
}

impl From<SubscriptionRow> for SubscriptionRecord {
    fn from(row: SubscriptionRow) -> Self {
        // rows imported from the document store only carry the owner inside the body
        let user_id = row.user_id.or_else(|| {
            row.document
                .get("userId")
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
        });
        let user_role = row.user_role.or_else(|| {
            row.document
                .get("userRole")
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
        });

        SubscriptionRecord {
            id: row.id,
            user_id,
            user_role,
            document: row.document,
            persistent: row.persistent,
            restored: row.restored,
            created_at: row.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(user_id: Option<&str>, document: serde_json::Value) -> SubscriptionRow {
        SubscriptionRow {
            id: "sub_1".to_string(),
            user_id: user_id.map(str::to_string),
            user_role: None,
            document,
            persistent: true,
            restored: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_row_into_record_keeps_columns() {
        let record: SubscriptionRecord = row(Some("u1"), json!({ "userId": "other" })).into();
        assert_eq!(record.id, "sub_1");
        assert_eq!(record.user_id.as_deref(), Some("u1"));
        assert!(record.persistent);
    }

    #[test]
    fn test_row_owner_falls_back_to_document() {
        let record: SubscriptionRecord =
            row(None, json!({ "userId": "u9", "userRole": "admin" })).into();
        assert_eq!(record.user_id.as_deref(), Some("u9"));
        assert_eq!(record.user_role.as_deref(), Some("admin"));
    }

    #[test]
    fn test_row_without_owner() {
        let record: SubscriptionRecord = row(None, json!({ "endpoint": "https://x" })).into();
        assert!(record.user_id.is_none());
        assert!(record.user_role.is_none());
    }
}
