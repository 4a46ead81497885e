//! HTTP route handlers.
//!
//! Everything outside `/api/*` falls through to [`shell::shell`], which owns
//! the routing prefix and answers 404 for anything else.

pub mod health;
pub mod shell;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::AppState;

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health::health))
        .fallback(shell::shell)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
