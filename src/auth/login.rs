use sha2::{Digest, Sha256};
use std::collections::HashMap;
use subtle::ConstantTimeEq;

use super::token::TokenError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LoginError {
    // covers both wrong password and unknown subject
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error(transparent)]
    Token(#[from] TokenError),
}

// Per-subject expected passwords, kept only as SHA-256 digests
pub struct Credentials {
    digests: HashMap<String, [u8; 32]>,
}

fn digest(password: &str) -> [u8; 32] {
    Sha256::digest(password.as_bytes()).into()
}

impl Credentials {
    pub fn new(credentials: &HashMap<String, String>) -> Self {
        let digests = credentials
            .iter()
            .map(|(subject, password)| (subject.clone(), digest(password)))
            .collect();
        Self { digests }
    }

    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }

    pub fn subjects(&self) -> impl Iterator<Item = &str> {
        self.digests.keys().map(String::as_str)
    }

    // Constant-time check of `password` for `subject`; the password is
    // digested before the lookup so unknown subjects cost the same
    pub fn check(&self, subject: &str, password: &str) -> bool {
        let presented = digest(password);
        self.digests
            .get(subject)
            .is_some_and(|expected| bool::from(expected[..].ct_eq(&presented[..])))
    }
}
