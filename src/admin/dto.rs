use serde::{Deserialize, Serialize};

use crate::activity::repo::ActivityEntry;
use crate::admin::repo::{LabelCount, RecentScan};

/// GET /admin/stats response.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub total_patients: i64,
    pub total_scans: i64,
    pub active_patients: i64,
    pub recent_scans: Vec<RecentScan>,
    pub recent_activity: Vec<ActivityEntry>,
}

/// Request body for admin patient provisioning.
#[derive(Debug, Deserialize)]
pub struct AddPatientRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// GET /admin/report response.
#[derive(Debug, Serialize)]
pub struct ReportResponse {
    pub total_patients: i64,
    pub total_scans: i64,
    pub diagnosis_distribution: Vec<LabelCount>,
    pub recent_scans: Vec<RecentScan>,
}
