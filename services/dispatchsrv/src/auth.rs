//! Shared-secret gate in front of every operation

use subtle::ConstantTimeEq;
use tracing::debug;

use crate::error::{DispatchError, Result};

/// Checks the caller secret and the web login password
pub struct AuthGate {
    caller_secret: String,
    web_password: String,
}

impl std::fmt::Debug for AuthGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthGate").finish_non_exhaustive()
    }
}

fn secret_eq(supplied: &str, expected: &str) -> bool {
    supplied.as_bytes().ct_eq(expected.as_bytes()).into()
}

impl AuthGate {
    pub fn new(caller_secret: impl Into<String>, web_password: impl Into<String>) -> Self {
        Self {
            caller_secret: caller_secret.into(),
            web_password: web_password.into(),
        }
    }

    /// True only for a present key equal to the configured secret
    pub fn authorize(&self, supplied_key: Option<&str>) -> bool {
        match supplied_key {
            Some(key) if !self.caller_secret.is_empty() => secret_eq(key, &self.caller_secret),
            _ => false,
        }
    }

    /// [`authorize`](Self::authorize) as a `Result` for `?` chaining
    pub fn require(&self, supplied_key: Option<&str>) -> Result<()> {
        if self.authorize(supplied_key) {
            Ok(())
        } else {
            debug!("Rejected caller key");
            Err(DispatchError::Unauthorized)
        }
    }

    /// Web login: the redirect target carrying the caller secret
    pub fn check_password(&self, password: &str) -> Option<String> {
        if !self.web_password.is_empty() && secret_eq(password, &self.web_password) {
            Some(format!("/?securitykey={}", self.caller_secret))
        } else {
            None
        }
    }
}
