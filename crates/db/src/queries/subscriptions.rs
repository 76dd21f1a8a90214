use crate::models::SubscriptionRow;
use sqlx::PgPool;

pub async fn list_all(pool: &PgPool) -> Result<Vec<SubscriptionRow>, sqlx::Error> {
    sqlx::query_as::<_, SubscriptionRow>(
        r#"
        SELECT id, user_id, user_role, document, persistent, restored, created_at
        FROM push_subscriptions
        ORDER BY created_at, id
        "#,
    )
    .fetch_all(pool)
    .await
}

pub async fn list_by_user_ids(
    pool: &PgPool,
    user_ids: &[String],
) -> Result<Vec<SubscriptionRow>, sqlx::Error> {
    sqlx::query_as::<_, SubscriptionRow>(
        r#"
        SELECT id, user_id, user_role, document, persistent, restored, created_at
        FROM push_subscriptions
        WHERE COALESCE(user_id, document->>'userId') = ANY($1)
        ORDER BY created_at, id
        "#,
    )
    .bind(user_ids)
    .fetch_all(pool)
    .await
}

pub async fn list_by_role(pool: &PgPool, role: &str) -> Result<Vec<SubscriptionRow>, sqlx::Error> {
    sqlx::query_as::<_, SubscriptionRow>(
        r#"
        SELECT id, user_id, user_role, document, persistent, restored, created_at
        FROM push_subscriptions
        WHERE COALESCE(user_role, document->>'userRole') = $1
        ORDER BY created_at, id
        "#,
    )
    .bind(role)
    .fetch_all(pool)
    .await
}

pub async fn upsert(pool: &PgPool, row: &SubscriptionRow) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO push_subscriptions
            (id, user_id, user_role, document, persistent, restored, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (id) DO UPDATE
        SET user_id = EXCLUDED.user_id,
            user_role = EXCLUDED.user_role,
            document = EXCLUDED.document,
            persistent = EXCLUDED.persistent,
            restored = EXCLUDED.restored,
            created_at = EXCLUDED.created_at
        "#,
    )
    .bind(&row.id)
    .bind(&row.user_id)
    .bind(&row.user_role)
    .bind(&row.document)
    .bind(row.persistent)
    .bind(row.restored)
    .bind(row.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Returns the number of rows removed.
pub async fn delete(pool: &PgPool, id: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        DELETE FROM push_subscriptions
        WHERE id = $1
        "#,
    )
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn delete_by_user(pool: &PgPool, user_id: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        DELETE FROM push_subscriptions
        WHERE COALESCE(user_id, document->>'userId') = $1
        "#,
    )
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM push_subscriptions")
        .fetch_one(pool)
        .await
}
