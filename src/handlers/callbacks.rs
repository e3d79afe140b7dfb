use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::HeaderMap,
    Json,
};

use super::data_format;
use crate::error::AppError;
use crate::outcome::Outcome;
use crate::schemas::CallbackRequest;
use crate::AppState;

fn decode(
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<CallbackRequest>, JsonRejection>,
) -> Result<(i64, CallbackRequest), AppError> {
    let Path(transaction_id) =
        path.map_err(|_| AppError::Validation("transaction_id must be an integer".to_string()))?;
    let Json(request) = payload.map_err(|e| AppError::Validation(e.body_text()))?;
    Ok((transaction_id, request))
}

pub async fn deposit_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<CallbackRequest>, JsonRejection>,
) -> Result<Outcome, AppError> {
    let (transaction_id, request) = decode(path, payload)?;
    state
        .payments
        .handle_deposit_callback(transaction_id, request, data_format(&headers))
        .await
}

pub async fn withdrawal_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<CallbackRequest>, JsonRejection>,
) -> Result<Outcome, AppError> {
    let (transaction_id, request) = decode(path, payload)?;
    state
        .payments
        .handle_withdrawal_callback(transaction_id, request, data_format(&headers))
        .await
}
