use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::metrics::LLM_LATENCY;

pub const ANTHROPIC_VERSION: &str = "2023-06-01";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are the technical sales assistant of a Swiss precision \
gearbox manufacturer. Collect the customer's application requirements (torque in Nm, input speed, \
ratio, mounting, quantity) and contact details (name, company, email, country) so an engineer can \
prepare a quote. Answer in the customer's language, keep replies short, and never invent product data.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("LLM API key not configured")]
    MissingApiKey,
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("upstream returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("upstream reply had no text content")]
    EmptyReply,
}

// The one expensive call the rate limiter protects
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn complete(&self, system: &str, messages: &[ChatMessage]) -> Result<String, LlmError>;
}

// Messages API request format
#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: &'a [ChatMessage],
}

// Messages API response format, only the parts we read
#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

impl MessagesResponse {
    fn into_text(self) -> Result<String, LlmError> {
        let text: String = self
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");
        if text.trim().is_empty() {
            Err(LlmError::EmptyReply)
        } else {
            Ok(text)
        }
    }
}

pub struct AnthropicBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    max_tokens: u32,
}

impl AnthropicBackend {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        model: String,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            max_tokens,
        })
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

#[async_trait]
impl ChatBackend for AnthropicBackend {
    async fn complete(&self, system: &str, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let api_key = self.api_key.as_deref().ok_or(LlmError::MissingApiKey)?;
        let start = Instant::now();

        let res = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&MessagesRequest {
                model: &self.model,
                max_tokens: self.max_tokens,
                system,
                messages,
            })
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), "LLM API error");
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let reply = res.json::<MessagesResponse>().await?.into_text();
        LLM_LATENCY.observe(start.elapsed().as_secs_f64());
        reply
    }
}
