use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thrift_core::error::CoreError;
use thrift_core::store::StoreError;
use thrift_pipeline::{LockError, UploadError};

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and [`UploadError`] for the image
/// pipeline, and adds HTTP-specific variants. Implements [`IntoResponse`] to
/// produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `thrift_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// An upload, delete or lock error from `thrift_pipeline`.
    #[error(transparent)]
    Upload(#[from] UploadError),

    /// A store backend error.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

type Classified = (StatusCode, &'static str, String);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Core(core) => classify_core_error(core),
            AppError::Upload(upload) => classify_upload_error(upload),
            AppError::Store(store) => classify_store_error(store),

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                internal()
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

fn internal() -> Classified {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

fn classify_core_error(err: &CoreError) -> Classified {
    match err {
        CoreError::NotFound { entity, id } => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} with id {id} not found"),
        ),
        CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
        CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
        CoreError::Internal(msg) => {
            tracing::error!(error = %msg, "Internal core error");
            internal()
        }
    }
}

/// Classify a store error.
///
/// Unique constraint violations (constraint name starting with `uq_`) map to
/// 409; everything else maps to 500 with a sanitized message.
fn classify_store_error(err: &StoreError) -> Classified {
    match err {
        StoreError::Duplicate(constraint) if constraint.starts_with("uq_") => (
            StatusCode::CONFLICT,
            "CONFLICT",
            format!("Duplicate value violates unique constraint: {constraint}"),
        ),
        other => {
            tracing::error!(error = %other, "Store error");
            internal()
        }
    }
}

fn classify_upload_error(err: &UploadError) -> Classified {
    match err {
        UploadError::Lock(LockError::Timeout { key, attempts }) => {
            tracing::warn!(lock_key = %key, attempts, "Lock acquisition timed out");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "LOCK_TIMEOUT",
                "The draft is busy, try again shortly".to_string(),
            )
        }
        UploadError::Lock(LockError::Contention { .. }) => (
            StatusCode::SERVICE_UNAVAILABLE,
            "LOCK_CONTENTION",
            "The draft is busy, try again shortly".to_string(),
        ),
        UploadError::Lock(LockError::Store(store)) => classify_store_error(store),
        UploadError::Core(core) => classify_core_error(core),
        UploadError::ItemNotFound { item_id } => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("Draft with id {item_id} not found"),
        ),
        UploadError::ItemGone { .. } => (StatusCode::CONFLICT, "ITEM_GONE", err.to_string()),
        UploadError::ImageNotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string()),
        UploadError::UnsupportedImage { .. } => (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "UNSUPPORTED_IMAGE",
            err.to_string(),
        ),
        UploadError::Filesystem {
            item_id,
            stage,
            path,
            source,
        } => {
            tracing::error!(
                item_id,
                stage = %stage,
                path = %path.display(),
                error = %source,
                "Filesystem error during upload",
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "FILESYSTEM_ERROR",
                format!("Failed to store image for draft {item_id} at stage {stage}"),
            )
        }
        UploadError::Cleanup {
            item_id,
            path,
            source,
        } => {
            tracing::error!(
                item_id,
                path = %path.display(),
                error = %source,
                "Filesystem error during cleanup",
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "FILESYSTEM_ERROR",
                format!("Failed to remove files of draft {item_id}"),
            )
        }
        UploadError::Persist {
            item_id,
            filename,
            source,
        } => match source {
            StoreError::Duplicate(_) => classify_store_error(source),
            StoreError::Backend(e) => {
                tracing::error!(item_id, filename, error = %e, "Failed to record uploaded image");
                internal()
            }
        },
        UploadError::Interrupted { item_id, message } => {
            tracing::error!(item_id, error = %message, "Draft operation task failed");
            internal()
        }
        UploadError::Store(store) => classify_store_error(store),
    }
}
