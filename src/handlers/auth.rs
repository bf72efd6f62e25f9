use axum::{Extension, Json, extract::State};
use std::sync::Arc;

use crate::auth::{LoginError, Session};
use crate::client_id::ClientId;
use crate::error::ApiError;
use crate::models::{LoginRequest, LoginResponse, VerifyResponse, format_ttl};
use crate::state::AppState;

pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    client: ClientId,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let auth = state.auth.as_ref().ok_or(ApiError::AuthUnavailable)?;

    match auth.login(&req.subject, &req.password).await {
        Ok(issued) => Ok(Json(LoginResponse {
            success: true,
            token: issued.token,
            subject: issued.subject,
            expires_at: issued.expires_at,
            expires_in: format_ttl(auth.token_ttl_ms()),
        })),
        Err(LoginError::InvalidCredentials) => {
            tracing::warn!(client = client.as_str(), "admin login failed");
            Err(ApiError::Unauthorized)
        }
        Err(LoginError::Token(e)) => {
            tracing::error!(error = %e, "could not issue admin session");
            Err(ApiError::Internal)
        }
    }
}

// Reaching this handler means require_session accepted the token
pub async fn verify_handler(Extension(session): Extension<Session>) -> Json<VerifyResponse> {
    Json(VerifyResponse {
        valid: true,
        subject: session.subject,
    })
}
