// Signed, self-describing admin session tokens.
//
// A token is base64(JSON `{sub, data, exp, sig}`) where `data` is
// `"{sub}:{exp}"` and `sig` is the lowercase hex HMAC-SHA256 of `data` under
// the server secret. Nothing is stored server side, so a token stays valid
// until `exp` or until the secret is rotated.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("token expired")]
    Expired,
    #[error("token signature mismatch")]
    BadSignature,
    #[error("session secret is not configured")]
    MisconfiguredSecret,
}

impl TokenError {
    // stable label for logs and metrics
    pub fn kind(self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::Expired => "expired",
            Self::BadSignature => "bad_signature",
            Self::MisconfiguredSecret => "misconfigured_secret",
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenPayload {
    sub: String,
    data: String,
    exp: u64,
    sig: String,
}

// A freshly issued token and what it encodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    pub subject: String,
    pub expires_at: u64,
}

// The verified content of a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub subject: String,
    pub expires_at: u64,
}

pub fn issued_data(subject: &str, expires_at: u64) -> String {
    format!("{subject}:{expires_at}")
}

fn sign(secret: &str, data: &str) -> Result<String, TokenError> {
    if secret.is_empty() {
        return Err(TokenError::MisconfiguredSecret);
    }
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| TokenError::MisconfiguredSecret)?;
    mac.update(data.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

// Issue a token for `subject` valid until `now_ms + ttl_ms`.
pub fn issue_at(
    subject: &str,
    secret: &str,
    ttl_ms: u64,
    now_ms: u64,
) -> Result<IssuedToken, TokenError> {
    let expires_at = now_ms.saturating_add(ttl_ms);
    let data = issued_data(subject, expires_at);
    let sig = sign(secret, &data)?;

    let payload = TokenPayload {
        sub: subject.to_string(),
        data,
        exp: expires_at,
        sig,
    };
    // serializing a struct of strings and integers cannot fail
    let json = serde_json::to_vec(&payload).map_err(|_| TokenError::Malformed)?;

    Ok(IssuedToken {
        token: STANDARD.encode(json),
        subject: payload.sub,
        expires_at,
    })
}

// Verify `token` against `secret` at `now_ms`.
//
// Checks run in order: decode, expiry, signature. The caller must not expose
// which one failed.
pub fn verify_at(token: &str, secret: &str, now_ms: u64) -> Result<Session, TokenError> {
    if secret.is_empty() {
        return Err(TokenError::MisconfiguredSecret);
    }

    let raw = STANDARD.decode(token).map_err(|_| TokenError::Malformed)?;
    let payload: TokenPayload = serde_json::from_slice(&raw).map_err(|_| TokenError::Malformed)?;

    // only the exact bytes we issue are accepted: no padding whitespace, escapes or reordering
    let canonical = serde_json::to_vec(&payload).map_err(|_| TokenError::Malformed)?;
    if canonical != raw {
        return Err(TokenError::Malformed);
    }

    if now_ms > payload.exp {
        return Err(TokenError::Expired);
    }

    // subject and expiry are only trusted through the signed data
    if payload.data != issued_data(&payload.sub, payload.exp) {
        return Err(TokenError::BadSignature);
    }

    let expected = sign(secret, &payload.data)?;
    if !bool::from(expected.as_bytes().ct_eq(payload.sig.as_bytes())) {
        return Err(TokenError::BadSignature);
    }

    Ok(Session {
        subject: payload.sub,
        expires_at: payload.exp,
    })
}
