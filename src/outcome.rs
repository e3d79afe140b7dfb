//! The (status-class, message, optional payload) triple returned by every
//! orchestration entry point. The axum layer turns it into a response.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Ok,
    BadRequest,
    Unauthorized,
    NotFound,
    Conflict,
    Unprocessable,
    TooManyRequests,
    Internal,
    Unavailable,
}

impl StatusClass {
    pub fn status_code(&self) -> StatusCode {
        match self {
            StatusClass::Ok => StatusCode::OK,
            StatusClass::BadRequest => StatusCode::BAD_REQUEST,
            StatusClass::Unauthorized => StatusCode::UNAUTHORIZED,
            StatusClass::NotFound => StatusCode::NOT_FOUND,
            StatusClass::Conflict => StatusCode::CONFLICT,
            StatusClass::Unprocessable => StatusCode::UNPROCESSABLE_ENTITY,
            StatusClass::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            StatusClass::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            StatusClass::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub status: StatusClass,
    pub message: String,
    pub data: Option<Value>,
}

impl Outcome {
    pub fn new(status: StatusClass, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            data: None,
        }
    }

    pub fn ok(message: impl Into<String>) -> Self {
        Self::new(StatusClass::Ok, message)
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

#[derive(Serialize)]
struct ApiResponse<'a> {
    status_code: u16,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a Value>,
}

impl IntoResponse for Outcome {
    fn into_response(self) -> Response {
        let status = self.status.status_code();
        let body = Json(ApiResponse {
            status_code: status.as_u16(),
            message: &self.message,
            data: self.data.as_ref(),
        });

        (status, body).into_response()
    }
}
