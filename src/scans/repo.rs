use anyhow::Context;
use axum::async_trait;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::classifier::ScanLabel;
use crate::scans::repo_types::{NewScan, ScanRecord};

/// Append-only store of classification events.
///
/// `history` and `latest` order strictly by creation timestamp descending;
/// same-timestamp ties resolve to the most-recently-inserted record so
/// ordering stays deterministic under bursts. There is no per-record update
/// or delete — records disappear only when an admin deletes the owning
/// patient.
#[async_trait]
pub trait ScanStore: Send + Sync {
    async fn append(&self, scan: NewScan) -> anyhow::Result<ScanRecord>;
    async fn history(&self, user_id: Uuid) -> anyhow::Result<Vec<ScanRecord>>;
    async fn latest(&self, user_id: Uuid) -> anyhow::Result<Option<ScanRecord>>;
}

#[derive(Debug, FromRow)]
struct PgScanRow {
    id: Uuid,
    user_id: Uuid,
    image_path: String,
    predicted_label: String,
    confidence: f64,
    probabilities: Json<Vec<f64>>,
    created_at: OffsetDateTime,
}

impl TryFrom<PgScanRow> for ScanRecord {
    type Error = anyhow::Error;

    fn try_from(row: PgScanRow) -> Result<Self, Self::Error> {
        let predicted_label = ScanLabel::parse(&row.predicted_label)
            .with_context(|| format!("unknown label in scan row: {}", row.predicted_label))?;
        Ok(ScanRecord {
            id: row.id,
            user_id: row.user_id,
            image_path: row.image_path,
            predicted_label,
            confidence: row.confidence,
            probabilities: row.probabilities.0,
            created_at: row.created_at,
        })
    }
}

#[derive(Clone)]
pub struct PgScanStore {
    db: PgPool,
}

impl PgScanStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ScanStore for PgScanStore {
    async fn append(&self, scan: NewScan) -> anyhow::Result<ScanRecord> {
        let row = sqlx::query_as::<_, PgScanRow>(
            r#"
            INSERT INTO scans (user_id, image_path, predicted_label, confidence, probabilities)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_id, image_path, predicted_label, confidence, probabilities, created_at
            "#,
        )
        .bind(scan.user_id)
        .bind(&scan.image_path)
        .bind(scan.predicted_label.as_str())
        .bind(scan.confidence)
        .bind(Json(&scan.probabilities))
        .fetch_one(&self.db)
        .await
        .context("insert scan")?;
        row.try_into()
    }

    async fn history(&self, user_id: Uuid) -> anyhow::Result<Vec<ScanRecord>> {
        let rows = sqlx::query_as::<_, PgScanRow>(
            r#"
            SELECT id, user_id, image_path, predicted_label, confidence, probabilities, created_at
            FROM scans
            WHERE user_id = $1
            ORDER BY created_at DESC, seq DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;
        rows.into_iter().map(ScanRecord::try_from).collect()
    }

    async fn latest(&self, user_id: Uuid) -> anyhow::Result<Option<ScanRecord>> {
        let row = sqlx::query_as::<_, PgScanRow>(
            r#"
            SELECT id, user_id, image_path, predicted_label, confidence, probabilities, created_at
            FROM scans
            WHERE user_id = $1
            ORDER BY created_at DESC, seq DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;
        row.map(ScanRecord::try_from).transpose()
    }
}

#[cfg(test)]
pub(crate) use memory::MemoryScanStore;


#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn scan_for(user_id: Uuid, confidence: f64) -> NewScan {
        NewScan {
            user_id,
            image_path: format!("uploads/20240101_120000_scan_{confidence}.png"),
            predicted_label: ScanLabel::NonDemented,
            confidence,
            probabilities: vec![confidence, 0.1, 0.1, 0.1],
        }
    }

    #[tokio::test]
    async fn append_then_read_back_reproduces_every_field() {
        let store = MemoryScanStore::new();
        let user_id = Uuid::new_v4();

        let written = store.append(scan_for(user_id, 0.7)).await.expect("append");
        let latest = store
            .latest(user_id)
            .await
            .expect("latest")
            .expect("present");

        assert_eq!(latest, written);
        assert_eq!(latest.predicted_label, ScanLabel::NonDemented);
        assert_eq!(latest.confidence, 0.7);
        assert_eq!(latest.probabilities, vec![0.7, 0.1, 0.1, 0.1]);

        let history = store.history(user_id).await.expect("history");
        assert_eq!(history, vec![written]);
    }

    #[tokio::test]
    async fn history_is_newest_first() {
        let store = MemoryScanStore::new();
        let user_id = Uuid::new_v4();

        let first = store.append(scan_for(user_id, 0.5)).await.expect("append");
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = store.append(scan_for(user_id, 0.6)).await.expect("append");

        let history = store.history(user_id).await.expect("history");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, second.id);
        assert_eq!(history[1].id, first.id);
        assert!(history[0].created_at >= history[1].created_at);
    }

    #[tokio::test]
    async fn same_instant_records_order_most_recently_inserted_first() {
        let store = MemoryScanStore::with_fixed_clock(datetime!(2024-01-01 12:00:00 UTC));
        let user_id = Uuid::new_v4();

        let first = store.append(scan_for(user_id, 0.5)).await.expect("append");
        let second = store.append(scan_for(user_id, 0.6)).await.expect("append");
        let third = store.append(scan_for(user_id, 0.7)).await.expect("append");

        let history = store.history(user_id).await.expect("history");
        let ids: Vec<_> = history.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![third.id, second.id, first.id]);

        let latest = store.latest(user_id).await.expect("latest").expect("some");
        assert_eq!(latest.id, third.id);
    }

    #[tokio::test]
    async fn history_is_scoped_to_the_user() {
        let store = MemoryScanStore::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        store.append(scan_for(alice, 0.5)).await.expect("append");
        store.append(scan_for(bob, 0.6)).await.expect("append");

        assert_eq!(store.history(alice).await.expect("history").len(), 1);
        assert_eq!(store.history(bob).await.expect("history").len(), 1);
        assert!(store
            .latest(Uuid::new_v4())
            .await
            .expect("latest")
            .is_none());
    }
}
