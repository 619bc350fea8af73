use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Application error taxonomy.
///
/// Every failure a request can end in maps to exactly one variant, and every
/// variant carries a stable machine-readable `kind` in the JSON body so
/// clients (and tests) can branch on the failure kind rather than on message
/// text.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// The upload could not be decoded as a raster image.
    #[error("uploaded file could not be decoded as an image")]
    ImageDecode(#[source] image::ImageError),

    /// The inference backend failed to load or errored during prediction.
    #[error("classifier backend unavailable")]
    ClassifierUnavailable(#[source] anyhow::Error),

    /// The inference call exceeded the configured deadline.
    #[error("classification timed out after {0:?}")]
    ClassifierTimeout(Duration),

    /// Persistence failed after a classification was already computed.
    #[error("failed to record scan result")]
    Storage(#[source] anyhow::Error),

    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    /// A database error outside the prediction-persistence path.
    #[error("database error")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Stable identifier for the failure kind, independent of message text.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::ImageDecode(_) => "image_decode",
            AppError::ClassifierUnavailable(_) => "classifier_unavailable",
            AppError::ClassifierTimeout(_) => "classifier_timeout",
            AppError::Storage(_) => "storage",
            AppError::Unauthenticated(_) => "unauthenticated",
            AppError::Forbidden(_) => "forbidden",
            AppError::Validation(_) => "validation",
            AppError::Conflict(_) => "conflict",
            AppError::NotFound(_) => "not_found",
            AppError::Database(_) => "database",
            AppError::Internal(_) => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::ImageDecode(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::ClassifierUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::ClassifierTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Storage(_) | AppError::Database(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Unique-constraint violations surface as conflicts (e.g. duplicate
        // username/email at registration).
        if let AppError::Database(sqlx::Error::Database(ref db_err)) = self {
            if db_err.code().as_deref() == Some("23505") {
                let constraint = db_err.constraint().unwrap_or("unknown");
                if constraint.starts_with("uq_") {
                    return conflict_response(constraint);
                }
            }
        }

        let status = self.status();
        let message = match &self {
            // Internal detail stays in the logs, not in the response body.
            AppError::Storage(e) => {
                tracing::error!(error = %e, "scan persistence failed");
                self.to_string()
            }
            AppError::Database(e) => {
                tracing::error!(error = %e, "database error");
                "an internal error occurred".to_string()
            }
            AppError::Internal(e) => {
                tracing::error!(error = %e, "internal error");
                "an internal error occurred".to_string()
            }
            AppError::ClassifierUnavailable(e) => {
                tracing::error!(error = %e, "classifier unavailable");
                self.to_string()
            }
            other => other.to_string(),
        };

        let body = json!({
            "error": message,
            "kind": self.kind(),
        });
        (status, axum::Json(body)).into_response()
    }
}

fn conflict_response(constraint: &str) -> Response {
    let field = match constraint {
        "uq_users_username" => "username",
        "uq_users_email" => "email",
        other => other,
    };
    let body = json!({
        "error": format!("{field} already taken"),
        "kind": "conflict",
    });
    (StatusCode::CONFLICT, axum::Json(body)).into_response()
}
