//! Route definitions for drafts and their images.

use axum::routing::{delete, get, post};
use axum::Router;

use crate::handlers::drafts;
use crate::handlers::images;
use crate::state::AppState;

/// Routes mounted at `/drafts`.
///
/// ```text
/// GET    /{item_id}                          get_by_id
/// PUT    /{item_id}                          save
/// DELETE /{item_id}                          delete
/// POST   /{item_id}/reconcile                reconcile
///
/// GET    /{item_id}/images                   list
/// POST   /{item_id}/images                   upload (multipart)
/// GET    /{item_id}/images/next-sequence     next_sequence
/// DELETE /{item_id}/images/{filename}        delete
/// ```
pub fn router() -> Router<AppState> {
    let image_routes = Router::new()
        .route("/", get(images::list).post(images::upload))
        .route("/next-sequence", get(images::next_sequence))
        .route("/{filename}", delete(images::delete));

    Router::new()
        .route(
            "/{item_id}",
            get(drafts::get_by_id)
                .put(drafts::save)
                .delete(drafts::delete),
        )
        .route("/{item_id}/reconcile", post(drafts::reconcile))
        .nest("/{item_id}/images", image_routes)
}
