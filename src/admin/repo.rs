use anyhow::Context;
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

/// A scan joined with its owner, for admin dashboards and reports.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct RecentScan {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub predicted_label: String,
    pub confidence: f64,
    pub created_at: OffsetDateTime,
}

/// A patient with their scan count.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PatientSummary {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub created_at: OffsetDateTime,
    pub scan_count: i64,
}

/// Count of scans per predicted label.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct LabelCount {
    pub predicted_label: String,
    pub count: i64,
}

pub async fn count_patients(db: &PgPool) -> anyhow::Result<i64> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE role = 'patient'")
        .fetch_one(db)
        .await?;
    Ok(count)
}

pub async fn count_scans(db: &PgPool) -> anyhow::Result<i64> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM scans")
        .fetch_one(db)
        .await?;
    Ok(count)
}

/// Patients with at least one scan in the last 30 days.
pub async fn count_active_patients(db: &PgPool) -> anyhow::Result<i64> {
    let count = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(DISTINCT user_id)
        FROM scans
        WHERE created_at >= now() - interval '30 days'
        "#,
    )
    .fetch_one(db)
    .await?;
    Ok(count)
}

pub async fn recent_scans(db: &PgPool, limit: i64) -> anyhow::Result<Vec<RecentScan>> {
    let rows = sqlx::query_as::<_, RecentScan>(
        r#"
        SELECT s.id, u.username, u.email, s.predicted_label, s.confidence, s.created_at
        FROM scans s
        JOIN users u ON u.id = s.user_id
        ORDER BY s.created_at DESC, s.seq DESC
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn patients_with_scan_counts(db: &PgPool) -> anyhow::Result<Vec<PatientSummary>> {
    let rows = sqlx::query_as::<_, PatientSummary>(
        r#"
        SELECT u.id, u.username, u.email, u.created_at, COUNT(s.id) AS scan_count
        FROM users u
        LEFT JOIN scans s ON s.user_id = u.id
        WHERE u.role = 'patient'
        GROUP BY u.id
        ORDER BY u.created_at DESC
        "#,
    )
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn diagnosis_distribution(db: &PgPool) -> anyhow::Result<Vec<LabelCount>> {
    let rows = sqlx::query_as::<_, LabelCount>(
        r#"
        SELECT predicted_label, COUNT(*) AS count
        FROM scans
        GROUP BY predicted_label
        ORDER BY count DESC
        "#,
    )
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// Delete a patient together with their scans and activity rows, in one
/// transaction. Returns false when the id is unknown or not a patient.
/// The cascade lives here, not in the schema: user deletion is the only
/// path that removes scan records.
pub async fn delete_patient(db: &PgPool, user_id: Uuid) -> anyhow::Result<bool> {
    let mut tx = db.begin().await.context("begin delete transaction")?;

    let exists = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM users WHERE id = $1 AND role = 'patient'",
    )
    .bind(user_id)
    .fetch_one(&mut *tx)
    .await?;
    if exists == 0 {
        return Ok(false);
    }

    sqlx::query("DELETE FROM activity_log WHERE user_id = $1")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM scans WHERE user_id = $1")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await.context("commit delete transaction")?;
    Ok(true)
}
