use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use crate::AppState;

/// 503 only when a critical dependency is down.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let response = state.health.check().await;
    let status_code = if response.is_unhealthy() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (status_code, Json(response))
}
