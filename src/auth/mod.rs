// Admin authentication.
//
// - `token`: stateless HMAC-SHA256 session tokens
// - `login`: per-subject credential check
// - `middleware`: bearer-token guard for admin routes

pub mod login;
pub mod middleware;
pub mod token;

pub use login::{Credentials, LoginError};
pub use middleware::require_session;
pub use token::{IssuedToken, Session, TokenError, issue_at, verify_at};

use std::fmt;
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::config::AuthConfig;
use crate::metrics::LOGIN_FAILURES;

// Issues and verifies admin sessions for a fixed server secret.
//
// Construction fails on an empty secret, so a running authenticator always
// has key material. Without one the service must treat every token as invalid.
pub struct SessionAuthenticator {
    secret: String,
    credentials: Credentials,
    config: AuthConfig,
    clock: Arc<dyn Clock>,
}

impl SessionAuthenticator {
    pub fn new(secret: impl Into<String>, config: AuthConfig) -> Result<Self, TokenError> {
        Self::with_clock(secret, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        secret: impl Into<String>,
        config: AuthConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, TokenError> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(TokenError::MisconfiguredSecret);
        }
        Ok(Self {
            secret,
            credentials: Credentials::new(&config.credentials),
            config,
            clock,
        })
    }

    pub fn token_ttl_ms(&self) -> u64 {
        self.config.token_ttl_ms
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn issue(&self, subject: &str) -> Result<IssuedToken, TokenError> {
        issue_at(subject, &self.secret, self.config.token_ttl_ms, self.clock.now_ms())
    }

    pub fn verify(&self, token: &str) -> Result<Session, TokenError> {
        verify_at(token, &self.secret, self.clock.now_ms())
    }

    // Check a password for `subject` and issue a session on success.
    //
    // Every failure waits `failure_delay` before returning, whether the
    // subject exists or not.
    pub async fn login(&self, subject: &str, password: &str) -> Result<IssuedToken, LoginError> {
        if !self.credentials.check(subject, password) {
            LOGIN_FAILURES.inc();
            tokio::time::sleep(self.config.failure_delay).await;
            return Err(LoginError::InvalidCredentials);
        }
        let issued = self.issue(subject)?;
        tracing::info!(subject, expires_at = issued.expires_at, "admin session issued");
        Ok(issued)
    }
}

impl fmt::Debug for SessionAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionAuthenticator")
            .field("secret", &"[REDACTED]")
            .field("config", &self.config)
            .finish()
    }
}
