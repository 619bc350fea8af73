use serde::Serialize;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

/// One activity-log row joined with the acting user's name.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ActivityEntry {
    pub action: String,
    pub username: String,
    pub details: Option<String>,
    pub created_at: OffsetDateTime,
}

/// Record a notable event. Callers treat this as best-effort: a failed
/// insert is logged, not propagated into the request outcome.
pub async fn record(
    db: &PgPool,
    user_id: Uuid,
    action: &str,
    details: Option<&str>,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO activity_log (user_id, action, details)
        VALUES ($1, $2, $3)
        "#,
    )
    .bind(user_id)
    .bind(action)
    .bind(details)
    .execute(db)
    .await?;
    Ok(())
}

/// Most recent activity entries, newest first.
pub async fn recent(db: &PgPool, limit: i64) -> anyhow::Result<Vec<ActivityEntry>> {
    let rows = sqlx::query_as::<_, ActivityEntry>(
        r#"
        SELECT al.action, u.username, al.details, al.created_at
        FROM activity_log al
        JOIN users u ON u.id = al.user_id
        ORDER BY al.created_at DESC
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(db)
    .await?;
    Ok(rows)
}
