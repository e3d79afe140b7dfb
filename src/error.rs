use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::gateways::GatewayError;
use crate::outcome::{Outcome, StatusClass};
use crate::ports::{RepositoryError, StoreError};
use crate::services::cache::CacheError;
use crate::services::lock::LockError;
use crate::services::publisher::PublishError;
use crate::validation::ValidationError;

const INTERNAL_MESSAGE: &str =
    "Server encountered an error and is unable to process your request. Please try again.";

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Unprocessable: {0}")]
    Unprocessable(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(String),

    /// Status was persisted but the balance was not reconciled.
    #[error("Inconsistent state for transaction {transaction_id}: {reason}")]
    Inconsistent { transaction_id: i64, reason: String },
}

impl AppError {
    pub fn status_class(&self) -> StatusClass {
        match self {
            AppError::Validation(_) => StatusClass::BadRequest,
            AppError::Unauthorized(_) => StatusClass::Unauthorized,
            AppError::NotFound(_) => StatusClass::NotFound,
            AppError::Conflict(_) => StatusClass::Conflict,
            AppError::RateLimited(_) => StatusClass::TooManyRequests,
            AppError::Unprocessable(_) => StatusClass::Unprocessable,
            AppError::UpstreamUnavailable(_) => StatusClass::Unavailable,
            AppError::Database(_) | AppError::Internal(_) | AppError::Inconsistent { .. } => {
                StatusClass::Internal
            }
        }
    }

    pub fn status_code(&self) -> StatusCode {
        self.status_class().status_code()
    }

    /// Message safe to hand back to a caller.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Validation(msg)
            | AppError::Unauthorized(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg)
            | AppError::RateLimited(msg)
            | AppError::Unprocessable(msg)
            | AppError::UpstreamUnavailable(msg) => msg.clone(),
            AppError::Database(_) | AppError::Internal(_) | AppError::Inconsistent { .. } => {
                INTERNAL_MESSAGE.to_string()
            }
        }
    }

    pub fn into_outcome(self) -> Outcome {
        Outcome::new(self.status_class(), self.public_message())
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(what) => AppError::NotFound(what),
            RepositoryError::InsufficientBalance(_) => {
                AppError::Validation("You do not have sufficient balance".to_string())
            }
            RepositoryError::Database(e) => AppError::Database(e),
            RepositoryError::Corrupt(msg) => AppError::Internal(msg),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<CacheError> for AppError {
    fn from(err: CacheError) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<LockError> for AppError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::AlreadyInProgress => {
                AppError::Conflict("Transaction already being processed".to_string())
            }
            LockError::Store(e) => {
                tracing::error!(error = %e, "lock store unavailable");
                AppError::UpstreamUnavailable("Transaction coordination unavailable".to_string())
            }
        }
    }
}

impl From<PublishError> for AppError {
    fn from(err: PublishError) -> Self {
        match err {
            PublishError::Masking(e) => AppError::Internal(e.to_string()),
            PublishError::CircuitOpen | PublishError::Exhausted { .. } => {
                AppError::UpstreamUnavailable("Event broker unavailable".to_string())
            }
        }
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Unknown(name) => {
                AppError::Unprocessable(format!("Unknown payment gateway: {}", name))
            }
            GatewayError::NoneAvailable => {
                AppError::UpstreamUnavailable("No payment gateway available".to_string())
            }
            GatewayError::NotResponding { .. } | GatewayError::Rejected { .. } => {
                AppError::UpstreamUnavailable(err.to_string())
            }
            GatewayError::Priorities(e) => AppError::from(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if matches!(self, AppError::Database(_) | AppError::Internal(_)) {
            tracing::error!(error = %self, "request failed");
        }
        self.into_outcome().into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_status_code() {
        let error = AppError::Validation("Invalid input".to_string());
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_conflict_error_status_code() {
        let error = AppError::Conflict("Transaction already being processed".to_string());
        assert_eq!(error.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_rate_limited_status_code() {
        let error = AppError::RateLimited("Too Many Requests".to_string());
        assert_eq!(error.status_code(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn test_no_gateway_is_server_side() {
        let error = AppError::from(GatewayError::NoneAvailable);
        assert_eq!(error.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_database_error_status_code() {
        let error = AppError::Database(sqlx::Error::RowNotFound);
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_internal_details_are_not_exposed() {
        let error = AppError::Inconsistent {
            transaction_id: 4,
            reason: "balance update failed: connection reset".to_string(),
        };
        assert_eq!(error.public_message(), INTERNAL_MESSAGE);
    }

    #[test]
    fn test_insufficient_balance_is_validation() {
        let error = AppError::from(RepositoryError::InsufficientBalance(1));
        assert!(matches!(error, AppError::Validation(_)));
    }

    #[test]
    fn test_lock_conflict_maps_to_conflict() {
        let error = AppError::from(LockError::AlreadyInProgress);
        assert_eq!(error.status_code(), StatusCode::CONFLICT);
        assert_eq!(error.public_message(), "Transaction already being processed");
    }

    #[tokio::test]
    async fn test_not_found_error_response() {
        let error = AppError::NotFound("Transaction not found".to_string());
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
