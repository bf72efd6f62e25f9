use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

use lead_gateway::auth::{SessionAuthenticator, issue_at};
use lead_gateway::clock::ManualClock;
use lead_gateway::config::{AuthConfig, RateLimitConfig};
use lead_gateway::inquiry::{InquiryLimits, InquiryStore};
use lead_gateway::llm::{ChatBackend, ChatMessage, LlmError};
use lead_gateway::rate_limit::AdmissionController;
use lead_gateway::state::AppState;

const SECRET: &str = "integration-secret";
const T0: u64 = 1_700_000_000_000;

// Records calls so tests can prove rejected requests never reach the LLM
#[derive(Default)]
struct StubBackend {
    calls: AtomicUsize,
    fail: bool,
    missing_key: bool,
    last_system: Mutex<Option<String>>,
    last_messages: Mutex<Vec<ChatMessage>>,
}

#[async_trait]
impl ChatBackend for StubBackend {
    async fn complete(&self, system: &str, messages: &[ChatMessage]) -> Result<String, LlmError> {
        if self.missing_key {
            return Err(LlmError::MissingApiKey);
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_system.lock().unwrap() = Some(system.to_string());
        *self.last_messages.lock().unwrap() = messages.to_vec();
        if self.fail {
            return Err(LlmError::Status {
                status: 529,
                body: "overloaded".into(),
            });
        }
        Ok(format!("echo {} messages", messages.len()))
    }
}

struct Harness {
    app: Router,
    clock: Arc<ManualClock>,
    backend: Arc<StubBackend>,
}

struct Options {
    backend: StubBackend,
    with_auth: bool,
    trust_proxy_headers: bool,
    max_records: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            backend: StubBackend::default(),
            with_auth: true,
            trust_proxy_headers: false,
            max_records: 100,
        }
    }
}

const MAX_BODY_BYTES: usize = 64 * 1024;

fn build(options: Options) -> Harness {
    let clock = Arc::new(ManualClock::new(T0));
    let backend = Arc::new(options.backend);

    let auth_config = AuthConfig {
        token_ttl_ms: 60_000,
        failure_delay: Duration::from_millis(1000),
        credentials: HashMap::from([
            ("admin".to_string(), "hunter2".to_string()),
            ("sales".to_string(), "quota".to_string()),
        ]),
    };
    let auth = options
        .with_auth
        .then(|| SessionAuthenticator::with_clock(SECRET, auth_config, clock.clone()).unwrap());

    let limits = |max_requests| RateLimitConfig {
        window_ms: 60_000,
        max_requests,
        gc_threshold: 1000,
    };

    let state = Arc::new(AppState {
        admission: AdmissionController::with_clock(limits(3), clock.clone()),
        inquiry_admission: AdmissionController::with_clock(limits(3), clock.clone())
            .named("inquiries"),
        auth,
        llm: backend.clone(),
        system_prompt: "test prompt".to_string(),
        inquiries: InquiryStore::with_limits(InquiryLimits {
            max_records: options.max_records,
            ..InquiryLimits::default()
        }),
        trust_proxy_headers: options.trust_proxy_headers,
        max_body_bytes: MAX_BODY_BYTES,
    });

    Harness {
        app: lead_gateway::router(state),
        clock,
        backend,
    }
}

fn harness_with(backend: StubBackend, with_auth: bool) -> Harness {
    build(Options {
        backend,
        with_auth,
        ..Options::default()
    })
}

fn harness() -> Harness {
    build(Options::default())
}

// what axum's connect-info service attaches for a real socket
fn from_peer(mut request: Request<Body>, ip: &str) -> Request<Body> {
    let addr: SocketAddr = format!("{ip}:40000").parse().unwrap();
    request.extensions_mut().insert(ConnectInfo(addr));
    request
}

fn chat_body() -> Body {
    Body::from(json!({"messages": [{"role": "user", "content": "Need a gearbox"}]}).to_string())
}

fn chat_request(ip: &str) -> Request<Body> {
    let request = Request::post("/api/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .body(chat_body())
        .unwrap();
    from_peer(request, ip)
}

fn chat_request_forwarded(peer: &str, forwarded_for: &str) -> Request<Body> {
    let request = Request::post("/api/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", forwarded_for)
        .body(chat_body())
        .unwrap();
    from_peer(request, peer)
}

fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::get(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

async fn body_bytes(response: Response) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()
}

async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

async fn login(app: &Router, subject: &str, password: &str) -> Response {
    send(
        app,
        json_request(
            "POST",
            "/api/auth/login",
            None,
            json!({"subject": subject, "password": password}),
        ),
    )
    .await
}

async fn admin_token(app: &Router) -> String {
    let response = login(app, "admin", "hunter2").await;
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn chat_enforces_ceiling_before_calling_llm() {
    let h = harness();

    for expected_remaining in ["2", "1", "0"] {
        let response = send(&h.app, chat_request("203.0.113.1")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-ratelimit-remaining"], expected_remaining);
        let body = body_json(response).await;
        assert_eq!(body["message"], "echo 1 messages");
        assert_eq!(body["language"], "en");
        assert!(body["sessionId"].as_str().unwrap().starts_with("session_"));
    }

    h.clock.advance(15_000);
    let response = send(&h.app, chat_request("203.0.113.1")).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()[header::RETRY_AFTER], "45");
    assert_eq!(response.headers()["x-ratelimit-remaining"], "0");
    assert_eq!(h.backend.calls.load(Ordering::SeqCst), 3);

    // a different client keeps its own quota
    let response = send(&h.app, chat_request("203.0.113.2")).await;
    assert_eq!(response.status(), StatusCode::OK);

    // and the first one recovers once the window has passed
    h.clock.advance(45_001);
    let response = send(&h.app, chat_request("203.0.113.1")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-ratelimit-remaining"], "2");
}

#[tokio::test]
async fn rotating_forwarded_for_does_not_reset_quota() {
    let h = harness();

    let mut admitted = 0;
    for i in 0..50 {
        let forged = format!("10.0.0.{i}");
        let response = send(&h.app, chat_request_forwarded("192.0.2.1", &forged)).await;
        if response.status() == StatusCode::OK {
            admitted += 1;
        } else {
            assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        }
    }
    assert_eq!(admitted, 3);
    assert_eq!(h.backend.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn trusted_proxy_limits_by_last_forwarded_hop() {
    let h = build(Options {
        trust_proxy_headers: true,
        ..Options::default()
    });

    // the client controls everything left of the hop the proxy appended
    for i in 0..3 {
        let chain = format!("10.0.0.{i}, 203.0.113.9");
        let response = send(&h.app, chat_request_forwarded("10.1.1.1", &chain)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
    let response = send(&h.app, chat_request_forwarded("10.1.1.1", "10.0.0.99, 203.0.113.9")).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    // another client behind the same proxy has its own quota
    let response = send(&h.app, chat_request_forwarded("10.1.1.1", "203.0.113.10")).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn chat_reports_detected_language() {
    let h = harness();
    let request = json_request(
        "POST",
        "/api/chat",
        None,
        json!({"messages": [{"role": "user", "content": "Bonjour, nous avons besoin d'un réducteur"}]}),
    );
    let body = body_json(send(&h.app, request).await).await;
    assert_eq!(body["language"], "fr");

    let request = json_request(
        "POST",
        "/api/chat",
        None,
        json!({"messages": [{"role": "user", "content": "200 Nm bei 1400 U/min"}]}),
    );
    let body = body_json(send(&h.app, request).await).await;
    assert_eq!(body["language"], "de");
}

#[tokio::test]
async fn chat_keeps_given_session_id() {
    let h = harness();
    let request = json_request(
        "POST",
        "/api/chat",
        None,
        json!({"messages": [{"role": "user", "content": "Hallo"}], "sessionId": "session_abc"}),
    );
    let body = body_json(send(&h.app, request).await).await;
    assert_eq!(body["sessionId"], "session_abc");
}

#[tokio::test]
async fn chat_requires_messages() {
    let h = harness();
    let response = send(
        &h.app,
        json_request("POST", "/api/chat", None, json!({"messages": []})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "Messages array required");
    assert_eq!(h.backend.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn upstream_failure_is_generic_502() {
    let h = harness_with(
        StubBackend {
            fail: true,
            ..StubBackend::default()
        },
        true,
    );
    let response = send(&h.app, chat_request("198.51.100.1")).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = body_bytes(response).await;
    assert_eq!(body, br#"{"error":"AI service error"}"#);
}

#[tokio::test]
async fn login_then_verify() {
    let h = harness();
    let response = login(&h.app, "sales", "quota").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["subject"], "sales");
    assert_eq!(body["expiresIn"], "1m");
    assert_eq!(body["expiresAt"], T0 + 60_000);
    let token = body["token"].as_str().unwrap();

    let response = send(&h.app, json_request("POST", "/api/auth/verify", Some(token), json!({}))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({"valid": true, "subject": "sales"})
    );
}

#[tokio::test(start_paused = true)]
async fn failed_logins_are_slow_and_indistinguishable() {
    let h = harness();

    let start = tokio::time::Instant::now();
    let wrong_password = login(&h.app, "admin", "letmein").await;
    assert!(start.elapsed() >= Duration::from_millis(900));

    let start = tokio::time::Instant::now();
    let unknown_subject = login(&h.app, "ceo", "hunter2").await;
    assert!(start.elapsed() >= Duration::from_millis(900));

    assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_subject.status(), StatusCode::UNAUTHORIZED);
    let a = body_bytes(wrong_password).await;
    let b = body_bytes(unknown_subject).await;
    assert_eq!(a, b);
    assert_eq!(a, br#"{"error":"Unauthorized"}"#);
}

#[tokio::test]
async fn admin_routes_reject_all_bad_tokens_identically() {
    let h = harness();
    let valid = admin_token(&h.app).await;

    let mut tampered = valid.clone().into_bytes();
    tampered[10] = if tampered[10] == b'A' { b'B' } else { b'A' };
    let tampered = String::from_utf8(tampered).unwrap();

    let foreign = issue_at("admin", "some-other-secret", 60_000, T0).unwrap().token;

    let mut bodies = Vec::new();
    for token in [None, Some("garbage"), Some(tampered.as_str()), Some(foreign.as_str())] {
        let response = send(&h.app, get_request("/api/admin/inquiries", token)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{token:?}");
        bodies.push(body_bytes(response).await);
    }

    // the valid token expires as the clock moves past its ttl
    h.clock.advance(60_001);
    let response = send(&h.app, get_request("/api/admin/inquiries", Some(&valid))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    bodies.push(body_bytes(response).await);

    assert!(bodies.windows(2).all(|w| w[0] == w[1]));
}

#[tokio::test]
async fn missing_secret_disables_admin_surface() {
    let h = harness_with(StubBackend::default(), false);

    let response = login(&h.app, "admin", "hunter2").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let token = issue_at("admin", SECRET, 60_000, T0).unwrap().token;
    let response = send(&h.app, get_request("/api/admin/inquiries", Some(&token))).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    // the public chat path is unaffected
    let response = send(&h.app, chat_request("192.0.2.1")).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn inquiry_lifecycle() {
    let h = harness();

    let new_inquiry = json!({
        "sessionId": "session_42",
        "leadData": {"name": "Anna Muster", "email": "anna@example.ch", "company": "Muster AG"},
        "messages": [
            {"role": "user", "content": "200 Nm, 1400 rpm, ratio 40:1"},
            {"role": "assistant", "content": "Thanks, here is a summary."}
        ],
        "summary": "Worm gearbox 200 Nm",
        "technicalData": {"torque_nm": 200}
    });
    let response = send(&h.app, json_request("POST", "/api/inquiries", None, new_inquiry.clone())).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let id = body_json(response).await["inquiryId"].as_u64().unwrap();

    let response = send(&h.app, json_request("POST", "/api/inquiries", None, new_inquiry)).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let token = admin_token(&h.app).await;

    let response = send(&h.app, get_request("/api/admin/inquiries?status=new&limit=10", Some(&token))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["pagination"]["total"], 1);
    assert_eq!(body["pagination"]["limit"], 10);
    assert_eq!(body["inquiries"][0]["customer_company"], "Muster AG");
    assert!(body["inquiries"][0].get("messages").is_none());

    let response = send(&h.app, get_request(&format!("/api/admin/inquiries/{id}"), Some(&token))).await;
    let body = body_json(response).await;
    assert_eq!(body["inquiry"]["messages"].as_array().unwrap().len(), 2);
    assert_eq!(body["inquiry"]["language"], "de");

    let response = send(
        &h.app,
        json_request(
            "PATCH",
            &format!("/api/admin/inquiries/{id}"),
            Some(&token),
            json!({"status": "quoted", "assigned_to": "sales"}),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["inquiry"]["status"], "quoted");
    assert_eq!(body["inquiry"]["assigned_to"], "sales");

    let response = send(
        &h.app,
        json_request("PATCH", &format!("/api/admin/inquiries/{id}"), Some(&token), json!({})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = send(&h.app, get_request("/api/admin/inquiries/999", Some(&token))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

fn summary_request(ip: &str, body: Value) -> Request<Body> {
    from_peer(json_request("POST", "/api/generate-summary", None, body), ip)
}

fn summary_body() -> Value {
    json!({
        "messages": [
            {"role": "user", "content": "We need 200 Nm at 1400 rpm"},
            {"role": "assistant", "content": "A worm gearbox with ratio 40:1 fits."}
        ],
        "leadData": {"name": "Anna Muster", "company": "Muster AG"},
        "language": "en"
    })
}

#[tokio::test]
async fn summary_uses_language_prompt_and_lead_data() {
    let h = harness();
    let response = send(&h.app, summary_request("198.51.100.7", summary_body())).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({"success": true, "summary": "echo 1 messages"})
    );

    let system = h.backend.last_system.lock().unwrap().clone().unwrap();
    assert!(system.starts_with("Create a brief, structured summary"));
    let turn = h.backend.last_messages.lock().unwrap().clone();
    assert_eq!(turn.len(), 1);
    assert!(turn[0].content.contains("- Name: Anna Muster"));
    assert!(turn[0].content.contains("- Email: not given"));
    assert!(turn[0].content.contains("Customer: We need 200 Nm at 1400 rpm"));
}

#[tokio::test]
async fn summary_errors() {
    let h = harness();
    let response = send(&h.app, summary_request("198.51.100.7", json!({"messages": []}))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "Messages array required");

    let h = harness_with(
        StubBackend {
            fail: true,
            ..StubBackend::default()
        },
        true,
    );
    let response = send(&h.app, summary_request("198.51.100.7", summary_body())).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let h = harness_with(
        StubBackend {
            missing_key: true,
            ..StubBackend::default()
        },
        true,
    );
    let response = send(&h.app, summary_request("198.51.100.7", summary_body())).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["error"], "API not configured");
}

#[tokio::test]
async fn summary_shares_the_chat_quota() {
    let h = harness();
    for _ in 0..3 {
        let response = send(&h.app, chat_request("198.51.100.8")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
    let response = send(&h.app, summary_request("198.51.100.8", summary_body())).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(h.backend.calls.load(Ordering::SeqCst), 3);
}

fn inquiry_request(ip: &str, session: &str) -> Request<Body> {
    let body = json!({
        "sessionId": session,
        "messages": [{"role": "user", "content": "200 Nm"}]
    });
    from_peer(json_request("POST", "/api/inquiries", None, body), ip)
}

#[tokio::test]
async fn inquiry_submissions_are_rate_limited() {
    let h = harness();
    for i in 0..3 {
        let response = send(&h.app, inquiry_request("192.0.2.30", &format!("s-{i}"))).await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }
    let response = send(&h.app, inquiry_request("192.0.2.30", "s-3")).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key(header::RETRY_AFTER));

    // the inquiry limiter is separate from the chat one
    let response = send(&h.app, chat_request("192.0.2.30")).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn inquiry_store_refuses_past_capacity() {
    let h = build(Options {
        max_records: 2,
        ..Options::default()
    });
    let first = send(&h.app, inquiry_request("192.0.2.41", "s-1")).await;
    assert_eq!(first.status(), StatusCode::CREATED);
    let second = send(&h.app, inquiry_request("192.0.2.42", "s-2")).await;
    assert_eq!(second.status(), StatusCode::CREATED);

    let response = send(&h.app, inquiry_request("192.0.2.43", "s-3")).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["error"], "Inquiry store is full");
}

#[tokio::test]
async fn oversized_inquiry_fields_are_rejected() {
    let h = harness();
    let long_session = "s".repeat(101);
    let response = send(&h.app, inquiry_request("192.0.2.50", &long_session)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await["error"],
        "sessionId exceeds 100 characters"
    );
}

#[tokio::test]
async fn bodies_over_the_limit_are_refused() {
    let h = harness();
    let body = json!({
        "sessionId": "s-big",
        "messages": [{"role": "user", "content": "x".repeat(MAX_BODY_BYTES)}]
    });
    let response = send(
        &h.app,
        from_peer(json_request("POST", "/api/inquiries", None, body), "192.0.2.60"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

    let big_chat = json!({"messages": [{"role": "user", "content": "x".repeat(MAX_BODY_BYTES)}]});
    let response = send(&h.app, json_request("POST", "/api/chat", None, big_chat)).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(h.backend.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn health_and_metrics_are_public() {
    let h = harness();
    let response = send(&h.app, get_request("/health", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "healthy");

    send(&h.app, chat_request("192.0.2.50")).await;
    let response = send(&h.app, get_request("/metrics", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let text = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(text.contains("lead_gateway_chat_requests_total"));
}
