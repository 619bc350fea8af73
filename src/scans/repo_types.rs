use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::classifier::ScanLabel;

/// An immutable record of one classification event tied to one patient.
///
/// `confidence` always equals the maximum entry of `probabilities`, and
/// `predicted_label` is the label at the first arg-max index; both are
/// computed once by the prediction pipeline and never updated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub image_path: String,
    pub predicted_label: ScanLabel,
    pub confidence: f64,
    pub probabilities: Vec<f64>,
    pub created_at: OffsetDateTime,
}

/// Fields supplied by the prediction pipeline when appending a record. The
/// store assigns the id and creation timestamp.
#[derive(Debug, Clone)]
pub struct NewScan {
    pub user_id: Uuid,
    pub image_path: String,
    pub predicted_label: ScanLabel,
    pub confidence: f64,
    pub probabilities: Vec<f64>,
}
