use axum::{
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::AppError;
use crate::AppState;

pub const USER_ID_HEADER: &str = "x-user-id";

/// Identifies the caller from `x-user-id` and enforces the fixed-window quota.
pub async fn rate_limit_middleware<B>(
    State(state): State<AppState>,
    req: Request<B>,
    next: Next<B>,
) -> Response {
    let caller = match req
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        Some(caller) => caller.to_string(),
        None => {
            return AppError::Unauthorized("Missing user identity".to_string()).into_response()
        }
    };

    match state.rate_limiter.allow(&caller).await {
        Ok(true) => next.run(req).await,
        Ok(false) => {
            tracing::warn!(user_id = %caller, "rate limit exceeded");
            AppError::RateLimited("Too Many Requests".to_string()).into_response()
        }
        Err(e) => {
            tracing::error!(user_id = %caller, error = %e, "rate limiter unavailable");
            AppError::Internal(e.to_string()).into_response()
        }
    }
}
