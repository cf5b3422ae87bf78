//! Run status handler

use axum::{extract::State, Json};

use super::AppState;
use crate::logic::RunStatus;

/// GET /status
pub async fn get(State(state): State<AppState>) -> Json<RunStatus> {
    Json(state.status.read().clone())
}
