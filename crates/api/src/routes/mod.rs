pub mod animations;
pub mod health;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /animations                      submit (POST), list (GET)
/// /animations/{id}                 status (GET), delete (DELETE)
/// /animations/{id}/download        one-shot artifact download (GET)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/animations", animations::router())
}
