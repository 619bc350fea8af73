use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    activity,
    admin::{
        dto::{AddPatientRequest, ReportResponse, StatsResponse},
        repo,
    },
    auth::{
        dto::PublicUser,
        repo_types::{Role, User},
        services::{hash_password, is_valid_email, AdminUser},
    },
    error::{AppError, AppResult},
    state::AppState,
};

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/stats", get(stats))
        .route("/admin/patients", get(list_patients))
        .route("/admin/patients", post(add_patient))
        .route("/admin/patients/:id", delete(delete_patient))
        .route("/admin/report", get(report))
}

#[instrument(skip(state))]
pub async fn stats(
    State(state): State<AppState>,
    AdminUser(_admin_id): AdminUser,
) -> AppResult<Json<StatsResponse>> {
    let total_patients = repo::count_patients(&state.db).await?;
    let total_scans = repo::count_scans(&state.db).await?;
    let active_patients = repo::count_active_patients(&state.db).await?;
    let recent_scans = repo::recent_scans(&state.db, 5).await?;
    let recent_activity = activity::repo::recent(&state.db, 10).await?;

    Ok(Json(StatsResponse {
        total_patients,
        total_scans,
        active_patients,
        recent_scans,
        recent_activity,
    }))
}

#[instrument(skip(state))]
pub async fn list_patients(
    State(state): State<AppState>,
    AdminUser(_admin_id): AdminUser,
) -> AppResult<Json<Vec<repo::PatientSummary>>> {
    let patients = repo::patients_with_scan_counts(&state.db).await?;
    Ok(Json(patients))
}

#[instrument(skip(state, payload))]
pub async fn add_patient(
    State(state): State<AppState>,
    AdminUser(admin_id): AdminUser,
    Json(mut payload): Json<AddPatientRequest>,
) -> AppResult<(StatusCode, Json<PublicUser>)> {
    payload.username = payload.username.trim().to_string();
    payload.email = payload.email.trim().to_lowercase();

    if payload.username.is_empty() {
        return Err(AppError::Validation("username is required".into()));
    }
    if !is_valid_email(&payload.email) {
        return Err(AppError::Validation("invalid email".into()));
    }
    if payload.password.len() < 8 {
        return Err(AppError::Validation("password too short".into()));
    }

    let hash = hash_password(&payload.password)?;
    let user = User::create(
        &state.db,
        &payload.username,
        &payload.email,
        &hash,
        Role::Patient,
    )
    .await?;

    if let Err(e) = activity::repo::record(
        &state.db,
        admin_id,
        "patient_provisioned",
        Some(&format!("patient {} ({})", user.username, user.id)),
    )
    .await
    {
        warn!(error = %e, "activity log write failed");
    }

    info!(admin_id = %admin_id, user_id = %user.id, "patient provisioned");
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[instrument(skip(state))]
pub async fn delete_patient(
    State(state): State<AppState>,
    AdminUser(admin_id): AdminUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    if !repo::delete_patient(&state.db, id).await? {
        return Err(AppError::NotFound("patient"));
    }

    if let Err(e) = activity::repo::record(
        &state.db,
        admin_id,
        "patient_deleted",
        Some(&format!("patient {id}")),
    )
    .await
    {
        warn!(error = %e, "activity log write failed");
    }

    info!(admin_id = %admin_id, user_id = %id, "patient deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn report(
    State(state): State<AppState>,
    AdminUser(_admin_id): AdminUser,
) -> AppResult<Json<ReportResponse>> {
    let total_patients = repo::count_patients(&state.db).await?;
    let total_scans = repo::count_scans(&state.db).await?;
    let diagnosis_distribution = repo::diagnosis_distribution(&state.db).await?;
    let recent_scans = repo::recent_scans(&state.db, 10).await?;

    Ok(Json(ReportResponse {
        total_patients,
        total_scans,
        diagnosis_distribution,
        recent_scans,
    }))
}
