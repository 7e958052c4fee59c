pub mod drafts;
pub mod health;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /drafts/{item_id}                                get, save (PUT), delete
/// /drafts/{item_id}/reconcile                      repair records and files (POST)
/// /drafts/{item_id}/images                         list, upload (multipart POST)
/// /drafts/{item_id}/images/next-sequence           peek next sequence number
/// /drafts/{item_id}/images/{filename}              delete
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/drafts", drafts::router())
}
