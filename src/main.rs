use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use lead_gateway::auth::SessionAuthenticator;
use lead_gateway::config::{Args, Secrets};
use lead_gateway::inquiry::InquiryStore;
use lead_gateway::llm::{AnthropicBackend, DEFAULT_SYSTEM_PROMPT};
use lead_gateway::logging::init_logging;
use lead_gateway::rate_limit::AdmissionController;
use lead_gateway::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // parse cli arguments
    let args = Args::parse();
    init_logging(&args.log_level, args.log_json);

    let secrets = Secrets::from_env();
    let rate_config = args.rate_limit_config()?;
    let inquiry_rate_config = args.inquiry_rate_limit_config()?;
    let auth_config = args.auth_config(&secrets)?;

    // no secret means no sessions at all, never a default key
    let auth = match SessionAuthenticator::new(
        secrets.session_secret.clone().unwrap_or_default(),
        auth_config,
    ) {
        Ok(auth) => {
            if auth.credentials().is_empty() {
                tracing::warn!("no admin credentials configured, every login will fail");
            } else {
                let mut subjects: Vec<&str> = auth.credentials().subjects().collect();
                subjects.sort_unstable();
                tracing::info!(?subjects, "admin subjects loaded");
            }
            Some(auth)
        }
        Err(e) => {
            tracing::error!(error = %e, "SESSION_SECRET missing, admin endpoints disabled");
            None
        }
    };

    let system_prompt = match &args.system_prompt_file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading system prompt {}", path.display()))?,
        None => DEFAULT_SYSTEM_PROMPT.to_string(),
    };

    let backend = AnthropicBackend::new(
        &args.llm_url,
        secrets.llm_api_key.clone(),
        args.llm_model.clone(),
        args.llm_max_tokens,
        Duration::from_secs(args.llm_timeout),
    )?;
    if !backend.has_api_key() {
        tracing::warn!("LLM_API_KEY not configured, chat requests will fail");
    }

    // creating shared state
    let state = Arc::new(AppState {
        admission: AdmissionController::new(rate_config),
        inquiry_admission: AdmissionController::new(inquiry_rate_config).named("inquiries"),
        auth,
        llm: Arc::new(backend),
        system_prompt,
        inquiries: InquiryStore::with_limits(args.inquiry_limits()),
        trust_proxy_headers: args.trust_proxy_headers,
        max_body_bytes: args.max_body_bytes,
    });

    let app = lead_gateway::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    tracing::info!(%addr, "lead gateway listening");
    tracing::info!(llm_url = %args.llm_url, model = %args.llm_model, "forwarding chat");
    tracing::info!(
        max_requests = rate_config.max_requests,
        window_ms = rate_config.window_ms,
        gc_threshold = rate_config.gc_threshold,
        "rate limit"
    );
    tracing::info!(
        trust_proxy_headers = args.trust_proxy_headers,
        max_body_bytes = args.max_body_bytes,
        max_inquiries = args.max_inquiries,
        inquiry_max_requests = args.inquiry_max_requests,
        "request limits"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
