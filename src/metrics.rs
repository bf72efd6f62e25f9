use lazy_static::lazy_static;
use prometheus::{
    Counter, GaugeVec, Histogram, IntCounterVec, register_counter, register_gauge_vec,
    register_histogram, register_int_counter_vec,
};

lazy_static! {
    pub static ref CHAT_REQUESTS: Counter =
        register_counter!("lead_gateway_chat_requests_total", "Total chat requests").unwrap();
    pub static ref SUMMARY_REQUESTS: Counter =
        register_counter!("lead_gateway_summary_requests_total", "Total summary requests").unwrap();
    pub static ref RATE_LIMITED: IntCounterVec = register_int_counter_vec!(
        "lead_gateway_rate_limited_total",
        "Requests rejected by a rate limiter",
        &["route"]
    )
    .unwrap();
    pub static ref RATE_LIMIT_ENTRIES: GaugeVec = register_gauge_vec!(
        "lead_gateway_rate_limit_entries",
        "Clients currently tracked by each rate limiter",
        &["limiter"]
    )
    .unwrap();
    pub static ref LLM_LATENCY: Histogram = register_histogram!(
        "lead_gateway_llm_latency_seconds",
        "LLM call latency in seconds"
    )
    .unwrap();
    pub static ref LOGIN_FAILURES: Counter =
        register_counter!("lead_gateway_login_failures_total", "Failed admin logins").unwrap();
    pub static ref TOKEN_REJECTIONS: IntCounterVec = register_int_counter_vec!(
        "lead_gateway_token_rejections_total",
        "Rejected admin session tokens by reason",
        &["reason"]
    )
    .unwrap();
}

// Prometheus text exposition of everything registered above
pub fn render() -> Result<String, prometheus::Error> {
    use prometheus::{Encoder, TextEncoder};

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
