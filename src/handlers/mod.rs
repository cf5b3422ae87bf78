//! HTTP handlers

pub mod health;
pub mod status;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::logic::SharedStatus;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub status: SharedStatus,
}

/// Status router: liveness and the last run report.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::check))
        .route("/status", get(status::get))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
