use std::collections::HashSet;

use futures_util::future::BoxFuture;
use sqlx::PgPool;
use tracing::debug;
use vigil_core::ports::RecordStore;
use vigil_core::types::StoreStats;
use vigil_core::{StoreError, SubscriptionRecord};

pub mod models;
pub mod queries;

use models::SubscriptionRow;

pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// Postgres-backed record store.
#[derive(Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn unavailable(err: sqlx::Error) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

fn into_records(rows: Vec<SubscriptionRow>) -> Vec<SubscriptionRecord> {
    rows.into_iter().map(SubscriptionRecord::from).collect()
}

fn to_row(record: &SubscriptionRecord) -> SubscriptionRow {
    SubscriptionRow {
        id: record.id.clone(),
        user_id: record.user_id.clone(),
        user_role: record.user_role.clone(),
        document: record.document.clone(),
        persistent: record.persistent,
        restored: record.restored,
        created_at: record.created_at,
    }
}

impl RecordStore for PgRecordStore {
    fn query_all(&self) -> BoxFuture<'_, Result<Vec<SubscriptionRecord>, StoreError>> {
        Box::pin(async move {
            let rows = queries::subscriptions::list_all(&self.pool)
                .await
                .map_err(unavailable)?;
            Ok(into_records(rows))
        })
    }

    fn query_by_user_ids<'a>(
        &'a self,
        user_ids: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<SubscriptionRecord>, StoreError>> {
        Box::pin(async move {
            let rows = queries::subscriptions::list_by_user_ids(&self.pool, user_ids)
                .await
                .map_err(unavailable)?;
            Ok(into_records(rows))
        })
    }

    fn query_by_role<'a>(
        &'a self,
        role: &'a str,
    ) -> BoxFuture<'a, Result<Vec<SubscriptionRecord>, StoreError>> {
        Box::pin(async move {
            let rows = queries::subscriptions::list_by_role(&self.pool, role)
                .await
                .map_err(unavailable)?;
            Ok(into_records(rows))
        })
    }

    fn delete<'a>(&'a self, record_id: &'a str) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let removed = queries::subscriptions::delete(&self.pool, record_id)
                .await
                .map_err(unavailable)?;
            if removed == 0 {
                return Err(StoreError::NotFound(record_id.to_string()));
            }
            debug!(record_id, "subscription deleted");
            Ok(())
        })
    }

    fn query_active_user_ids(&self) -> BoxFuture<'_, Result<HashSet<String>, StoreError>> {
        Box::pin(async move {
            let ids = queries::users::list_ids(&self.pool)
                .await
                .map_err(unavailable)?;
            Ok(ids.into_iter().collect())
        })
    }

    fn save<'a>(&'a self, record: &'a SubscriptionRecord) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            queries::subscriptions::upsert(&self.pool, &to_row(record))
                .await
                .map_err(unavailable)
        })
    }

    fn delete_by_user<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<u64, StoreError>> {
        Box::pin(async move {
            queries::subscriptions::delete_by_user(&self.pool, user_id)
                .await
                .map_err(unavailable)
        })
    }

    fn stats(&self) -> BoxFuture<'_, Result<StoreStats, StoreError>> {
        Box::pin(async move {
            let subscriptions = queries::subscriptions::count(&self.pool)
                .await
                .map_err(unavailable)?;
            let users = queries::users::count(&self.pool)
                .await
                .map_err(unavailable)?;
            Ok(StoreStats {
                subscriptions: subscriptions.max(0) as u64,
                users: users.max(0) as u64,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use vigil_core::types::SubscriptionDescriptor;

    #[test]
    fn test_record_to_row_keeps_document() {
        let descriptor = SubscriptionDescriptor::new("https://push.example/abc", "p", "a");
        let record = SubscriptionRecord::nested("u1", Some("admin"), &descriptor, Utc::now());

        let row = to_row(&record);
        assert_eq!(row.id, "u1");
        assert_eq!(row.user_role.as_deref(), Some("admin"));
        assert_eq!(
            row.document["subscription"]["endpoint"],
            json!("https://push.example/abc")
        );

        let back = SubscriptionRecord::from(row);
        assert_eq!(back.document, record.document);
        assert_eq!(back.persistent, record.persistent);
    }

    #[test]
    fn test_sqlx_errors_map_to_unavailable() {
        let err = unavailable(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, StoreError::Unavailable(_)));
    }
}
