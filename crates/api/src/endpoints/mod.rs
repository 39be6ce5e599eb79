//! API endpoints.

mod admin;
mod auth;
mod reports;

use axum::Router;

use crate::middleware::AppState;
use crate::sse;

/// Create the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(auth::router())
        .merge(reports::router())
        .merge(admin::router())
        .merge(sse::router())
}
