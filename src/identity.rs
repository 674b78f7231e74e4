use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;

/// Claims pulled out of a locally held JWT. The signature is never checked
/// here; the backend is the only party that verifies tokens. Anything read
/// from this struct is advisory and must not gate authorization.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Claims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, alias = "user_id", alias = "userId")]
    pub user_id: Option<i64>,
}

impl Claims {
    /// Identifier used for the backend user lookup, matching the login
    /// flow's token contents: username when present, subject otherwise.
    pub fn lookup_identifier(&self) -> Option<&str> {
        self.username
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .or(self.sub.as_deref())
            .filter(|name| !name.trim().is_empty())
    }

    pub fn display_name(&self) -> Option<&str> {
        self.sub
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .or(self.username.as_deref())
            .filter(|name| !name.trim().is_empty())
    }
}

/// Best-effort decode of the payload segment of a signed token. Every
/// failure mode (missing token, wrong segment count, bad base64, bad JSON)
/// degrades to `None`; this function never panics and never errors.
pub fn extract_claims(token: &str) -> Option<Claims> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return None;
    }
    // Tolerate padded producers; the engine itself is no-pad.
    let payload = segments[1].trim_end_matches('=');
    let decoded = URL_SAFE_NO_PAD.decode(payload).ok()?;
    serde_json::from_slice(&decoded).ok()
}
