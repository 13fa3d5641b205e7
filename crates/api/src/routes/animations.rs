//! Route definitions for the `/animations` resource.

use axum::routing::get;
use axum::Router;

use crate::handlers::animations;
use crate::state::AppState;

/// Routes mounted at `/animations`.
///
/// ```text
/// GET    /                -> list_animations
/// POST   /                -> submit_animation
/// GET    /{id}            -> get_animation
/// DELETE /{id}            -> delete_animation
/// GET    /{id}/download   -> download_animation
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(animations::list_animations).post(animations::submit_animation),
        )
        .route(
            "/{id}",
            get(animations::get_animation).delete(animations::delete_animation),
        )
        .route("/{id}/download", get(animations::download_animation))
}
