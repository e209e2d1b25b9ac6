pub mod error;
pub mod routes;
pub mod state;

use axum::{extract::DefaultBodyLimit, routing::post, Router};
use std::path::Path;
use std::time::Duration;
use tower_http::services::ServeDir;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::adapters::http::state::HttpState;

/// `POST /predict` plus the static front-end (`GET /` serves `index.html`).
pub fn router(
    state: HttpState,
    static_dir: impl AsRef<Path>,
    body_limit: usize,
    request_timeout: Duration,
) -> Router {
    Router::new()
        .route("/predict", post(routes::predict))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
        .fallback_service(ServeDir::new(static_dir.as_ref()))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
}
