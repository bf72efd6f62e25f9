// Lead-capture chat gateway.
//
// Forwards chat widget conversations to an LLM behind a per-client
// `AdmissionController`, stores completed inquiries, and guards
// the admin surface with stateless `SessionAuthenticator` tokens.

pub mod auth;
pub mod client_id;
pub mod clock;
pub mod config;
pub mod error;
pub mod handlers;
pub mod inquiry;
pub mod language;
pub mod llm;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod rate_limit;
pub mod state;
pub mod summary;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
};
use std::sync::Arc;

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    let admin = Router::new()
        .route("/api/auth/verify", post(handlers::verify_handler))
        .route("/api/admin/inquiries", get(handlers::list_inquiries_handler))
        .route(
            "/api/admin/inquiries/{id}",
            get(handlers::get_inquiry_handler).patch(handlers::update_inquiry_handler),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_session,
        ));

    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .route("/api/chat", post(handlers::chat_handler))
        .route("/api/generate-summary", post(handlers::summary_handler))
        .route("/api/auth/login", post(handlers::login_handler))
        .route("/api/inquiries", post(handlers::create_inquiry_handler))
        .merge(admin)
        .layer(DefaultBodyLimit::max(state.max_body_bytes))
        .with_state(state)
}
