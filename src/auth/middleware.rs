use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::client_id::ClientId;
use crate::error::ApiError;
use crate::metrics::TOKEN_REJECTIONS;
use crate::state::AppState;

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

// Guard for admin routes: verify the bearer token, then hand the Session to the handler
pub async fn require_session(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth = state.auth.as_ref().ok_or(ApiError::AuthUnavailable)?;
    let token = bearer_token(request.headers()).ok_or(ApiError::Unauthorized)?;

    match auth.verify(token) {
        Ok(session) => {
            request.extensions_mut().insert(session);
            Ok(next.run(request).await)
        }
        Err(e) => {
            let client = ClientId::from_request(
                request.headers(),
                request.extensions(),
                state.trust_proxy_headers,
            );
            TOKEN_REJECTIONS.with_label_values(&[e.kind()]).inc();
            tracing::warn!(reason = e.kind(), client = client.as_str(), "admin token rejected");
            Err(ApiError::Unauthorized)
        }
    }
}
