use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::classifier::ScanLabel;
use crate::scans::repo_types::ScanRecord;

/// One classification event as returned to the client.
#[derive(Debug, Serialize)]
pub struct ScanResponse {
    pub id: Uuid,
    pub predicted_label: ScanLabel,
    pub confidence: f64,
    pub probabilities: Vec<f64>,
    pub image_path: String,
    pub created_at: OffsetDateTime,
}

impl From<ScanRecord> for ScanResponse {
    fn from(r: ScanRecord) -> Self {
        Self {
            id: r.id,
            predicted_label: r.predicted_label,
            confidence: r.confidence,
            probabilities: r.probabilities,
            image_path: r.image_path,
            created_at: r.created_at,
        }
    }
}
