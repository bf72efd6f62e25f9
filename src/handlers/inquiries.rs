use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Serialize;
use std::sync::Arc;

use super::admit;
use crate::auth::Session;
use crate::client_id::ClientId;
use crate::error::ApiError;
use crate::inquiry::{Inquiry, InquiryPage, InquiryUpdate, ListQuery, NewInquiry};
use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedInquiry {
    pub success: bool,
    pub inquiry_id: u64,
}

#[derive(Serialize)]
pub struct InquiryEnvelope {
    pub success: bool,
    pub inquiry: Inquiry,
}

#[derive(Serialize)]
pub struct InquiryListEnvelope {
    pub success: bool,
    #[serde(flatten)]
    pub page: InquiryPage,
}

pub async fn create_inquiry_handler(
    State(state): State<Arc<AppState>>,
    client: ClientId,
    Json(new): Json<NewInquiry>,
) -> Result<(StatusCode, Json<CreatedInquiry>), ApiError> {
    admit(&state.inquiry_admission, &client, "inquiries")?;

    let inquiry = state.inquiries.insert(new, chrono::Utc::now()).map_err(|e| {
        tracing::warn!(error = %e, client = client.as_str(), "inquiry rejected");
        ApiError::from(e)
    })?;
    tracing::info!(
        inquiry_id = inquiry.id,
        session_id = %inquiry.session_id,
        "inquiry saved"
    );
    Ok((
        StatusCode::CREATED,
        Json(CreatedInquiry {
            success: true,
            inquiry_id: inquiry.id,
        }),
    ))
}

pub async fn list_inquiries_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Json<InquiryListEnvelope> {
    Json(InquiryListEnvelope {
        success: true,
        page: state.inquiries.list(&query),
    })
}

pub async fn get_inquiry_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<InquiryEnvelope>, ApiError> {
    let inquiry = state.inquiries.get(id).ok_or(ApiError::NotFound)?;
    Ok(Json(InquiryEnvelope {
        success: true,
        inquiry,
    }))
}

pub async fn update_inquiry_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(id): Path<u64>,
    Json(update): Json<InquiryUpdate>,
) -> Result<Json<InquiryEnvelope>, ApiError> {
    let inquiry = state.inquiries.update(id, update, chrono::Utc::now())?;
    tracing::info!(
        inquiry_id = id,
        status = %inquiry.status,
        by = %session.subject,
        "inquiry updated"
    );
    Ok(Json(InquiryEnvelope {
        success: true,
        inquiry,
    }))
}
