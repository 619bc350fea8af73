use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use tracing::{instrument, warn};

use crate::{
    activity,
    auth::services::AuthUser,
    error::{AppError, AppResult},
    scans::dto::ScanResponse,
    state::AppState,
};

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/scans", get(list_scans))
        .route("/scans/latest", get(latest_scan))
}

pub fn write_routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/scans", post(create_scan))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}

/// POST /scans (multipart): field `file` holds the image to classify.
#[instrument(skip(state, mp))]
pub async fn create_scan(
    State(state): State<AppState>,
    auth: AuthUser,
    mut mp: Multipart,
) -> AppResult<(StatusCode, Json<ScanResponse>)> {
    let mut upload: Option<(String, Bytes)> = None;
    while let Ok(Some(field)) = mp.next_field().await {
        if field.name() == Some("file") {
            let filename = field.file_name().unwrap_or("scan").to_string();
            let data = field
                .bytes()
                .await
                .map_err(|e| AppError::Validation(format!("could not read upload: {e}")))?;
            upload = Some((filename, data));
            break;
        }
    }

    let (filename, data) = upload.ok_or(AppError::Validation("file field is required".into()))?;
    if data.is_empty() {
        return Err(AppError::Validation("uploaded file is empty".into()));
    }

    let record = state
        .predictor
        .classify(auth.id, auth.role, &filename, data)
        .await?;

    if let Err(e) = activity::repo::record(
        &state.db,
        auth.id,
        "scan_completed",
        Some(&format!(
            "scan {} classified as {}",
            record.id, record.predicted_label
        )),
    )
    .await
    {
        warn!(error = %e, scan_id = %record.id, "activity log write failed");
    }

    Ok((StatusCode::CREATED, Json(record.into())))
}

/// GET /scans: the caller's scan history, newest first.
#[instrument(skip(state))]
pub async fn list_scans(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<Vec<ScanResponse>>> {
    let records = state
        .scans
        .history(auth.id)
        .await
        .map_err(AppError::Storage)?;
    Ok(Json(records.into_iter().map(Into::into).collect()))
}

/// GET /scans/latest: the caller's most recent scan.
#[instrument(skip(state))]
pub async fn latest_scan(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<ScanResponse>> {
    let record = state
        .scans
        .latest(auth.id)
        .await
        .map_err(AppError::Storage)?
        .ok_or(AppError::NotFound("scan"))?;
    Ok(Json(record.into()))
}
