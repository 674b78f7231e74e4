use anyhow::Result;
use parking_lot::RwLock;

use crate::api::TokenProvider;
use crate::identity::{self, Claims};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session: no token")]
    TokenNotFound,
}

/// Explicit session context handed to the feed model at construction.
/// Replaces the original's ambient browser-local token storage with an
/// injected read/write/clear capability.
#[derive(Default)]
pub struct Session {
    token: RwLock<Option<String>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        let session = Self::new();
        session.set_token(token);
        session
    }

    pub fn set_token(&self, token: impl Into<String>) {
        let token = token.into();
        let mut slot = self.token.write();
        if token.trim().is_empty() {
            *slot = None;
        } else {
            *slot = Some(token);
        }
    }

    pub fn clear(&self) {
        *self.token.write() = None;
    }

    pub fn token(&self) -> Option<String> {
        self.token.read().clone()
    }

    /// Advisory identity claim read from the stored token. Absent token or
    /// undecodable payload both read as anonymous.
    pub fn claims(&self) -> Option<Claims> {
        self.token
            .read()
            .as_deref()
            .and_then(identity::extract_claims)
    }
}

impl TokenProvider for Session {
    fn bearer_token(&self) -> Result<String> {
        self.token().ok_or_else(|| SessionError::TokenNotFound.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;

    #[test]
    fn read_write_clear() {
        let session = Session::new();
        assert!(session.token().is_none());
        assert!(session.bearer_token().is_err());

        session.set_token("abc");
        assert_eq!(session.token().as_deref(), Some("abc"));
        assert_eq!(session.bearer_token().unwrap(), "abc");

        session.clear();
        assert!(session.token().is_none());
    }

    #[test]
    fn blank_token_reads_as_absent() {
        let session = Session::with_token("   ");
        assert!(session.token().is_none());
    }

    #[test]
    fn claims_follow_the_stored_token() {
        let payload = URL_SAFE_NO_PAD.encode(r#"{"sub":"dana"}"#);
        let session = Session::with_token(format!("h.{}.s", payload));
        assert_eq!(session.claims().unwrap().sub.as_deref(), Some("dana"));

        session.set_token("not-a-jwt");
        assert!(session.claims().is_none());
    }
}
