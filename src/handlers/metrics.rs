use crate::error::ApiError;

pub async fn metrics_handler() -> Result<String, ApiError> {
    crate::metrics::render().map_err(|e| {
        tracing::error!(error = %e, "failed to encode metrics");
        ApiError::Internal
    })
}
