//! Handlers for draft images: `/drafts/{item_id}/images[/...]`.

use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use thrift_core::draft::{AppendMode, ImageRecord};
use thrift_core::error::CoreError;
use thrift_core::types::validate_item_id;
use thrift_pipeline::StagedFile;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Query parameters for [`upload`].
#[derive(Debug, Default, Deserialize)]
pub struct UploadQuery {
    /// Fail with 404 instead of creating the draft when it does not exist.
    #[serde(default)]
    pub require_existing: bool,
}

impl UploadQuery {
    fn mode(&self) -> AppendMode {
        if self.require_existing {
            AppendMode::RequireExisting
        } else {
            AppendMode::CreateIfMissing
        }
    }
}

#[derive(Debug, Serialize)]
pub struct NextSequence {
    pub next_sequence_number: u32,
}

/// GET /api/v1/drafts/{item_id}/images
pub async fn list(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
) -> AppResult<Json<DataResponse<Vec<ImageRecord>>>> {
    validate_item_id(&item_id)?;
    let images = state
        .store
        .find_images(&item_id)
        .await?
        .ok_or_else(|| CoreError::NotFound {
            entity: "Draft",
            id: item_id.clone(),
        })?;
    Ok(Json(DataResponse { data: images }))
}

/// POST /api/v1/drafts/{item_id}/images[?require_existing=true]
///
/// Accepts a multipart form where every field carrying a filename is an
/// image. Each one is written to the staging area as it is read; the staged
/// files are then numbered and stored one after another in request order.
pub async fn upload(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
    Query(query): Query<UploadQuery>,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<DataResponse<Vec<ImageRecord>>>)> {
    validate_item_id(&item_id)?;

    let staged = stage_fields(&state, multipart).await?;
    if staged.is_empty() {
        return Err(AppError::BadRequest(
            "Request contains no image files".into(),
        ));
    }
    tracing::debug!(item_id, files = staged.len(), "Staged upload batch");

    let images = state
        .coordinator
        .upload_image_batch(&item_id, staged, query.mode())
        .await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: images })))
}

/// Stage every file field of the form. On a malformed form, files staged so
/// far are discarded.
async fn stage_fields(state: &AppState, mut multipart: Multipart) -> AppResult<Vec<StagedFile>> {
    let storage = state.coordinator.storage();
    let mut staged = Vec::new();

    let result: AppResult<()> = async {
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::BadRequest(e.to_string()))?
        {
            let Some(filename) = field.file_name().map(str::to_string) else {
                continue; // not a file field
            };
            let data = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(e.to_string()))?;
            let file = storage
                .stage(&filename, &data)
                .await
                .map_err(|e| AppError::InternalError(format!("Failed to stage upload: {e}")))?;
            staged.push(file);
        }
        Ok(())
    }
    .await;

    if let Err(e) = result {
        for file in &staged {
            storage.discard(file).await;
        }
        return Err(e);
    }
    Ok(staged)
}

/// DELETE /api/v1/drafts/{item_id}/images/{filename}
///
/// Returns the images that remain.
pub async fn delete(
    State(state): State<AppState>,
    Path((item_id, filename)): Path<(String, String)>,
) -> AppResult<Json<DataResponse<Vec<ImageRecord>>>> {
    let images = state.coordinator.delete_image(&item_id, &filename).await?;
    Ok(Json(DataResponse { data: images }))
}

/// GET /api/v1/drafts/{item_id}/images/next-sequence
pub async fn next_sequence(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
) -> AppResult<Json<DataResponse<NextSequence>>> {
    let next_sequence_number = state
        .coordinator
        .peek_next_sequence_number(&item_id)
        .await?;
    Ok(Json(DataResponse {
        data: NextSequence {
            next_sequence_number,
        },
    }))
}
