//! Handlers for the `/drafts` resource.
//!
//! Reads go straight to the store. Writes run through the upload
//! coordinator so they serialize with uploads on the draft's lock.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use thrift_core::draft::DraftItem;
use thrift_core::error::CoreError;
use thrift_core::types::validate_item_id;
use thrift_pipeline::ReconcileReport;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/drafts/{item_id}
///
/// Returns the draft with its images and, while one is held, its lock.
pub async fn get_by_id(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
) -> AppResult<Json<DataResponse<DraftItem>>> {
    validate_item_id(&item_id)?;
    let draft = state
        .store
        .find_draft(&item_id)
        .await?
        .ok_or_else(|| CoreError::NotFound {
            entity: "Draft",
            id: item_id.clone(),
        })?;
    Ok(Json(DataResponse { data: draft }))
}

/// PUT /api/v1/drafts/{item_id}
///
/// Creates or replaces the draft's payload. The body must be a JSON object.
/// All images of the draft count as saved afterwards.
pub async fn save(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
    Json(payload): Json<serde_json::Value>,
) -> AppResult<Json<DataResponse<DraftItem>>> {
    if !payload.is_object() {
        return Err(AppError::BadRequest(
            "Draft payload must be a JSON object".into(),
        ));
    }
    let draft = state.coordinator.save_draft(&item_id, &payload).await?;
    Ok(Json(DataResponse { data: draft }))
}

/// DELETE /api/v1/drafts/{item_id}
///
/// Removes the draft, its image records and its image directory.
pub async fn delete(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
) -> AppResult<StatusCode> {
    if state.coordinator.delete_draft(&item_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::Core(CoreError::NotFound {
            entity: "Draft",
            id: item_id,
        }))
    }
}

/// POST /api/v1/drafts/{item_id}/reconcile
pub async fn reconcile(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
) -> AppResult<Json<DataResponse<ReconcileReport>>> {
    let report = state.coordinator.reconcile(&item_id).await?;
    Ok(Json(DataResponse { data: report }))
}
