use axum::{Json, extract::State};
use std::sync::Arc;

use super::admit;
use crate::client_id::ClientId;
use crate::error::ApiError;
use crate::language::Language;
use crate::metrics::SUMMARY_REQUESTS;
use crate::state::AppState;
use crate::summary::{SummaryRequest, SummaryResponse, summary_prompt, summary_turn};

// Costs one LLM call, so it shares the chat limiter
pub async fn summary_handler(
    State(state): State<Arc<AppState>>,
    client: ClientId,
    Json(req): Json<SummaryRequest>,
) -> Result<Json<SummaryResponse>, ApiError> {
    SUMMARY_REQUESTS.inc();

    admit(&state.admission, &client, "summary")?;

    if req.messages.is_empty() {
        return Err(ApiError::BadRequest("Messages array required".to_string()));
    }

    let language = Language::from_code(req.language.as_deref());
    let turn = summary_turn(&req.messages, req.lead_data.as_ref());
    let summary = state
        .llm
        .complete(summary_prompt(language), std::slice::from_ref(&turn))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, client = client.as_str(), "summary generation failed");
            ApiError::from(e)
        })?;

    tracing::info!(language = language.code(), "summary generated");
    Ok(Json(SummaryResponse {
        success: true,
        summary,
    }))
}
