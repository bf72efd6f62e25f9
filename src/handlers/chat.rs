use axum::{
    Json,
    extract::State,
    http::HeaderValue,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use super::admit;
use crate::client_id::ClientId;
use crate::error::{ApiError, RATE_LIMIT_REMAINING_HEADER};
use crate::language::Language;
use crate::metrics::CHAT_REQUESTS;
use crate::models::{ChatRequest, ChatResponse};
use crate::state::AppState;

fn new_session_id() -> String {
    format!("session_{}", uuid::Uuid::new_v4().simple())
}

pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    client: ClientId,
    Json(payload): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    CHAT_REQUESTS.inc();

    let admission = admit(&state.admission, &client, "chat")?;

    if payload.messages.is_empty() {
        return Err(ApiError::BadRequest("Messages array required".to_string()));
    }

    let language = Language::of_conversation(&payload.messages);
    let message = state
        .llm
        .complete(&state.system_prompt, &payload.messages)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, client = client.as_str(), "chat completion failed");
            ApiError::from(e)
        })?;

    let session_id = payload
        .session_id
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(new_session_id);

    let mut response = Json(ChatResponse {
        message,
        language,
        session_id,
    })
    .into_response();
    response.headers_mut().insert(
        RATE_LIMIT_REMAINING_HEADER,
        HeaderValue::from(admission.remaining),
    );
    Ok(response)
}
