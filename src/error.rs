use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::inquiry::InquiryError;
use crate::llm::LlmError;

// Errors as the HTTP client sees them.
//
// Token and login failures all become `Unauthorized` so the body never says
// which check failed.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Rate limit exceeded. Try again later.")]
    RateLimited { retry_after_secs: u64 },
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Auth service unavailable")]
    AuthUnavailable,
    #[error("{0}")]
    BadRequest(String),
    #[error("Inquiry not found")]
    NotFound,
    #[error("{0}")]
    Conflict(String),
    #[error("API not configured")]
    LlmUnconfigured,
    #[error("AI service error")]
    Upstream,
    #[error("Inquiry store is full")]
    StoreFull,
    #[error("Internal server error")]
    Internal,
}

pub const RATE_LIMIT_REMAINING_HEADER: &str = "x-ratelimit-remaining";

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::AuthUnavailable | Self::StoreFull => StatusCode::SERVICE_UNAVAILABLE,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::LlmUnconfigured | Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Upstream => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.to_string(),
        };
        let mut response = (self.status(), Json(body)).into_response();
        if let Self::RateLimited { retry_after_secs } = self {
            let headers = response.headers_mut();
            headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
            headers.insert(RATE_LIMIT_REMAINING_HEADER, HeaderValue::from(0u32));
        }
        response
    }
}

impl From<LlmError> for ApiError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::MissingApiKey => Self::LlmUnconfigured,
            _ => Self::Upstream,
        }
    }
}

impl From<InquiryError> for ApiError {
    fn from(err: InquiryError) -> Self {
        match err {
            InquiryError::NotFound(_) => Self::NotFound,
            InquiryError::DuplicateSession(_) => Self::Conflict(err.to_string()),
            InquiryError::Invalid(msg) => Self::BadRequest(msg.to_string()),
            InquiryError::NoFieldsToUpdate
            | InquiryError::TooLong { .. }
            | InquiryError::TooManyMessages(_) => Self::BadRequest(err.to_string()),
            InquiryError::StoreFull => Self::StoreFull,
        }
    }
}
