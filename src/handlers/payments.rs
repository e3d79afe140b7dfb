use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    Json,
};

use super::data_format;
use crate::error::AppError;
use crate::outcome::Outcome;
use crate::schemas::{DepositRequest, WithdrawalRequest};
use crate::AppState;

pub async fn deposit(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<DepositRequest>, JsonRejection>,
) -> Result<Outcome, AppError> {
    let Json(request) = payload.map_err(|e| AppError::Validation(e.body_text()))?;
    state
        .payments
        .handle_deposit(request, data_format(&headers))
        .await
}

pub async fn withdrawal(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<WithdrawalRequest>, JsonRejection>,
) -> Result<Outcome, AppError> {
    let Json(request) = payload.map_err(|e| AppError::Validation(e.body_text()))?;
    state
        .payments
        .handle_withdrawal(request, data_format(&headers))
        .await
}
