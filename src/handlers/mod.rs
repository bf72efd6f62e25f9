mod auth;
mod chat;
mod health;
mod inquiries;
mod metrics;
mod summary;

pub use auth::{login_handler, verify_handler};
pub use chat::chat_handler;
pub use health::health_handler;
pub use inquiries::{create_inquiry_handler, get_inquiry_handler, list_inquiries_handler, update_inquiry_handler};
pub use metrics::metrics_handler;
pub use summary::summary_handler;

use crate::client_id::ClientId;
use crate::error::ApiError;
use crate::metrics::RATE_LIMITED;
use crate::rate_limit::{Admission, AdmissionController};

// Runs before any other work on a rate-limited route
fn admit(limiter: &AdmissionController, client: &ClientId, route: &str) -> Result<Admission, ApiError> {
    let admission = limiter.check_and_record(client.as_str());
    if admission.allowed {
        return Ok(admission);
    }
    RATE_LIMITED.with_label_values(&[route]).inc();
    tracing::warn!(client = client.as_str(), route, "rate limit exceeded");
    let retry_after_ms = limiter.retry_after_ms(client.as_str());
    Err(ApiError::RateLimited {
        retry_after_secs: retry_after_ms.div_ceil(1000).max(1),
    })
}
