use std::sync::Arc;

use crate::auth::SessionAuthenticator;
use crate::inquiry::InquiryStore;
use crate::llm::ChatBackend;
use crate::rate_limit::AdmissionController;

// app's shared state
pub struct AppState {
    pub admission: AdmissionController,         // chat and summary, the LLM-backed routes
    pub inquiry_admission: AdmissionController, // public inquiry submission
    pub auth: Option<SessionAuthenticator>,     // None when no session secret is configured
    pub llm: Arc<dyn ChatBackend>,
    pub system_prompt: String,
    pub inquiries: InquiryStore,
    pub trust_proxy_headers: bool,
    pub max_body_bytes: usize,
}
