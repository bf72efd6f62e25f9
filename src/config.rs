use clap::Parser;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::inquiry::{DEFAULT_MAX_MESSAGES, DEFAULT_MAX_RECORDS, DEFAULT_MAX_TEXT_CHARS, InquiryLimits};

pub const DEFAULT_WINDOW_MS: u64 = 60_000;
pub const DEFAULT_MAX_REQUESTS: u32 = 20;
pub const DEFAULT_GC_THRESHOLD: usize = 1000;
pub const DEFAULT_TOKEN_TTL_MS: u64 = 24 * 60 * 60 * 1000;
pub const DEFAULT_LOGIN_DELAY_MS: u64 = 1000;
pub const DEFAULT_INQUIRY_MAX_REQUESTS: u32 = 5;
pub const DEFAULT_MAX_BODY_BYTES: usize = 256 * 1024;

// Subject that `ADMIN_PASSWORD` authenticates.
pub const ADMIN_SUBJECT: &str = "admin";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("rate limit window must be at least 1 ms")]
    ZeroWindow,
    #[error("rate limit must admit at least one request per window")]
    ZeroMaxRequests,
    #[error("token ttl must be at least 1 ms")]
    ZeroTokenTtl,
    #[error("malformed AUTH_USERS entry {0:?}, expected subject:password")]
    MalformedUserEntry(String),
}

// CLI argument structure, every option also readable from the environment
#[derive(Parser, Debug, Clone)]
#[command(name = "lead-gateway")]
#[command(about = "Lead-capture chat gateway with admission control and admin sessions")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    // Rate limit window in milliseconds
    #[arg(long, env = "RATE_LIMIT_WINDOW_MS", default_value_t = DEFAULT_WINDOW_MS)]
    pub window_ms: u64,

    // Rate limit max requests per window
    #[arg(long, env = "RATE_LIMIT_MAX_REQUESTS", default_value_t = DEFAULT_MAX_REQUESTS)]
    pub max_requests: u32,

    // Tracked clients before expired windows are swept
    #[arg(long, env = "RATE_LIMIT_GC_THRESHOLD", default_value_t = DEFAULT_GC_THRESHOLD)]
    pub gc_threshold: usize,

    // Inquiry submissions per client per window
    #[arg(long, env = "INQUIRY_RATE_LIMIT_MAX_REQUESTS", default_value_t = DEFAULT_INQUIRY_MAX_REQUESTS)]
    pub inquiry_max_requests: u32,

    // Key clients on X-Forwarded-For / X-Real-IP; only behind a proxy that sets them
    #[arg(long, env = "TRUST_PROXY_HEADERS", default_value_t = false)]
    pub trust_proxy_headers: bool,

    // Largest accepted request body
    #[arg(long, env = "MAX_BODY_BYTES", default_value_t = DEFAULT_MAX_BODY_BYTES)]
    pub max_body_bytes: usize,

    // Inquiries kept in memory before submissions are refused
    #[arg(long, env = "MAX_INQUIRIES", default_value_t = DEFAULT_MAX_RECORDS)]
    pub max_inquiries: usize,

    #[arg(long, env = "INQUIRY_MAX_MESSAGES", default_value_t = DEFAULT_MAX_MESSAGES)]
    pub inquiry_max_messages: usize,

    // Per message, summary and notes
    #[arg(long, env = "INQUIRY_MAX_TEXT_CHARS", default_value_t = DEFAULT_MAX_TEXT_CHARS)]
    pub inquiry_max_text_chars: usize,

    // Admin session lifetime in milliseconds
    #[arg(long, env = "SESSION_TTL_MS", default_value_t = DEFAULT_TOKEN_TTL_MS)]
    pub token_ttl_ms: u64,

    // Pause before answering a failed login
    #[arg(long, env = "LOGIN_FAILURE_DELAY_MS", default_value_t = DEFAULT_LOGIN_DELAY_MS)]
    pub login_delay_ms: u64,

    // LLM API base url
    #[arg(long, env = "LLM_URL", default_value = "https://api.anthropic.com")]
    pub llm_url: String,

    #[arg(long, env = "LLM_MODEL", default_value = "claude-sonnet-4-20250514")]
    pub llm_model: String,

    #[arg(long, env = "LLM_MAX_TOKENS", default_value_t = 1024)]
    pub llm_max_tokens: u32,

    // Upstream request timeout in seconds
    #[arg(long, env = "LLM_TIMEOUT", default_value_t = 60)]
    pub llm_timeout: u64,

    // Product-knowledge prompt; built-in prompt when absent
    #[arg(long, env = "SYSTEM_PROMPT_FILE")]
    pub system_prompt_file: Option<PathBuf>,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[arg(long, env = "LOG_JSON", default_value_t = false)]
    pub log_json: bool,
}

impl Args {
    pub fn rate_limit_config(&self) -> Result<RateLimitConfig, ConfigError> {
        let config = RateLimitConfig {
            window_ms: self.window_ms,
            max_requests: self.max_requests,
            gc_threshold: self.gc_threshold,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn inquiry_rate_limit_config(&self) -> Result<RateLimitConfig, ConfigError> {
        let config = RateLimitConfig {
            max_requests: self.inquiry_max_requests,
            ..self.rate_limit_config()?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn inquiry_limits(&self) -> InquiryLimits {
        InquiryLimits {
            max_records: self.max_inquiries,
            max_messages: self.inquiry_max_messages,
            max_text_chars: self.inquiry_max_text_chars,
            ..InquiryLimits::default()
        }
    }

    pub fn auth_config(&self, secrets: &Secrets) -> Result<AuthConfig, ConfigError> {
        if self.token_ttl_ms == 0 {
            return Err(ConfigError::ZeroTokenTtl);
        }
        Ok(AuthConfig {
            token_ttl_ms: self.token_ttl_ms,
            failure_delay: Duration::from_millis(self.login_delay_ms),
            credentials: secrets.credentials()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub window_ms: u64,
    pub max_requests: u32,
    // Entry count above which expired windows are swept.
    pub gc_threshold: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_ms: DEFAULT_WINDOW_MS,
            max_requests: DEFAULT_MAX_REQUESTS,
            gc_threshold: DEFAULT_GC_THRESHOLD,
        }
    }
}

impl RateLimitConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_ms == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        if self.max_requests == 0 {
            return Err(ConfigError::ZeroMaxRequests);
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct AuthConfig {
    pub token_ttl_ms: u64,
    pub failure_delay: Duration,
    // subject -> expected password
    pub credentials: HashMap<String, String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_ttl_ms: DEFAULT_TOKEN_TTL_MS,
            failure_delay: Duration::from_millis(DEFAULT_LOGIN_DELAY_MS),
            credentials: HashMap::new(),
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut subjects: Vec<&str> = self.credentials.keys().map(String::as_str).collect();
        subjects.sort_unstable();
        f.debug_struct("AuthConfig")
            .field("token_ttl_ms", &self.token_ttl_ms)
            .field("failure_delay", &self.failure_delay)
            .field("subjects", &subjects)
            .finish()
    }
}

// Values that only ever come from the deployment environment
#[derive(Clone, Default)]
pub struct Secrets {
    pub session_secret: Option<String>,
    pub admin_password: Option<String>,
    pub auth_users: Option<String>,
    pub llm_api_key: Option<String>,
}

impl Secrets {
    pub fn from_env() -> Self {
        Self {
            session_secret: non_empty_env("SESSION_SECRET"),
            admin_password: non_empty_env("ADMIN_PASSWORD"),
            auth_users: non_empty_env("AUTH_USERS"),
            llm_api_key: non_empty_env("LLM_API_KEY"),
        }
    }

    // ADMIN_PASSWORD plus "subject:password,subject:password" from AUTH_USERS
    pub fn credentials(&self) -> Result<HashMap<String, String>, ConfigError> {
        let mut credentials = HashMap::new();
        if let Some(password) = &self.admin_password {
            credentials.insert(ADMIN_SUBJECT.to_string(), password.clone());
        }
        if let Some(users) = &self.auth_users {
            for raw in users.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                let (subject, password) = raw
                    .split_once(':')
                    .map(|(s, p)| (s.trim(), p))
                    .filter(|(s, p)| !s.is_empty() && !p.is_empty())
                    .ok_or_else(|| {
                        // keep the password out of the error message
                        let subject = raw.split(':').next().unwrap_or_default();
                        ConfigError::MalformedUserEntry(subject.to_string())
                    })?;
                credentials.insert(subject.to_string(), password.to_string());
            }
        }
        Ok(credentials)
    }
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn redact(v: &Option<String>) -> &'static str {
            if v.is_some() { "[REDACTED]" } else { "<unset>" }
        }
        f.debug_struct("Secrets")
            .field("session_secret", &redact(&self.session_secret))
            .field("admin_password", &redact(&self.admin_password))
            .field("auth_users", &redact(&self.auth_users))
            .field("llm_api_key", &redact(&self.llm_api_key))
            .finish()
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secrets(admin: Option<&str>, users: Option<&str>) -> Secrets {
        Secrets {
            session_secret: Some("s3cret".into()),
            admin_password: admin.map(Into::into),
            auth_users: users.map(Into::into),
            llm_api_key: None,
        }
    }

    #[test]
    fn defaults_match_documented_values() {
        let args = Args::parse_from(["lead-gateway"]);
        let rl = args.rate_limit_config().unwrap();
        assert_eq!(rl, RateLimitConfig::default());
        assert_eq!(rl.window_ms, 60_000);
        assert_eq!(rl.max_requests, 20);
        assert_eq!(rl.gc_threshold, 1000);

        let auth = args.auth_config(&Secrets::default()).unwrap();
        assert_eq!(auth.token_ttl_ms, 86_400_000);
        assert_eq!(auth.failure_delay, Duration::from_secs(1));
        assert!(auth.credentials.is_empty());

        assert!(!args.trust_proxy_headers);
        assert_eq!(args.max_body_bytes, 256 * 1024);
        assert_eq!(args.inquiry_limits(), InquiryLimits::default());
        let inquiry = args.inquiry_rate_limit_config().unwrap();
        assert_eq!(inquiry.max_requests, 5);
        assert_eq!(inquiry.window_ms, rl.window_ms);
    }

    #[test]
    fn proxy_trust_is_opt_in() {
        let args = Args::parse_from(["lead-gateway", "--trust-proxy-headers"]);
        assert!(args.trust_proxy_headers);
        let args = Args::parse_from(["lead-gateway", "--inquiry-max-requests", "0"]);
        assert_eq!(
            args.inquiry_rate_limit_config(),
            Err(ConfigError::ZeroMaxRequests)
        );
    }

    #[test]
    fn rejects_zero_limits() {
        let args = Args::parse_from(["lead-gateway", "--max-requests", "0"]);
        assert_eq!(args.rate_limit_config(), Err(ConfigError::ZeroMaxRequests));
        let args = Args::parse_from(["lead-gateway", "--window-ms", "0"]);
        assert_eq!(args.rate_limit_config(), Err(ConfigError::ZeroWindow));
        let args = Args::parse_from(["lead-gateway", "--token-ttl-ms", "0"]);
        assert!(matches!(
            args.auth_config(&Secrets::default()),
            Err(ConfigError::ZeroTokenTtl)
        ));
    }

    #[test]
    fn builds_multi_subject_credentials() {
        let creds = secrets(Some("root-pw"), Some("sales:s-pw, support:a:b"))
            .credentials()
            .unwrap();
        assert_eq!(creds.len(), 3);
        assert_eq!(creds["admin"], "root-pw");
        assert_eq!(creds["sales"], "s-pw");
        // only the first colon separates subject from password
        assert_eq!(creds["support"], "a:b");
    }

    #[test]
    fn malformed_user_entry_hides_password() {
        let err = secrets(None, Some("sales")).credentials().unwrap_err();
        assert_eq!(err, ConfigError::MalformedUserEntry("sales".into()));

        let err = secrets(None, Some(":pw-only")).credentials().unwrap_err();
        assert_eq!(err, ConfigError::MalformedUserEntry(String::new()));
        assert!(!err.to_string().contains("pw-only"));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let s = secrets(Some("hunter2"), Some("sales:pw"));
        let out = format!("{s:?}");
        assert!(!out.contains("hunter2"));
        assert!(!out.contains("s3cret"));
        assert!(out.contains("[REDACTED]"));

        let auth = AuthConfig {
            credentials: s.credentials().unwrap(),
            ..AuthConfig::default()
        };
        let out = format!("{auth:?}");
        assert!(!out.contains("hunter2"));
        assert!(out.contains("sales"));
    }
}
