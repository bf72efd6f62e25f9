use serde::{Deserialize, Serialize};

use crate::config::ADMIN_SUBJECT;
use crate::language::Language;
use crate::llm::ChatMessage;

// Chat widget request format
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub message: String,
    pub language: Language,
    pub session_id: String,
}

fn default_subject() -> String {
    ADMIN_SUBJECT.to_string()
}

// subject defaults to "admin" for single-password deployments
#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default = "default_subject")]
    pub subject: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub success: bool,
    pub token: String,
    pub subject: String,
    pub expires_at: u64,
    pub expires_in: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub valid: bool,
    pub subject: String,
}

// "24h", "90m" or "45s" depending on what divides evenly
pub fn format_ttl(ttl_ms: u64) -> String {
    let secs = ttl_ms / 1000;
    if secs >= 3600 && secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs >= 60 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}
