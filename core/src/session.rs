//! Credentials and the authentication handshake state.
//!
//! # Design
//! `SessionState` moves Unauthenticated → TokenIssued → SessionEstablished
//! and never back. The phase is derived from which fields are populated
//! rather than stored separately, so it cannot drift from the data. Expiry is
//! recorded but never enforced.

use std::fmt;

use crate::error::{ApiError, Result};
use crate::response::ApiResponse;

/// Application id and secret, fixed for the life of a client.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    api_key: String,
    secret: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            secret: secret.into(),
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Unauthenticated,
    TokenIssued,
    SessionEstablished,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    desktop: bool,
    auth_token: Option<String>,
    session_key: Option<String>,
    session_secret: Option<String>,
    user_id: Option<i64>,
    expires: Option<i64>,
}

impl SessionState {
    /// An empty session. `desktop` selects installed-application mode, where
    /// the handshake also yields a per-session signing secret.
    pub fn new(desktop: bool) -> Self {
        Self {
            desktop,
            ..Self::default()
        }
    }

    /// A session whose key was obtained outside this client.
    pub fn resume(desktop: bool, session_key: impl Into<String>) -> Self {
        Self {
            desktop,
            session_key: Some(session_key.into()),
            ..Self::default()
        }
    }

    pub fn phase(&self) -> SessionPhase {
        if self.session_key.is_some() {
            SessionPhase::SessionEstablished
        } else if self.auth_token.is_some() {
            SessionPhase::TokenIssued
        } else {
            SessionPhase::Unauthenticated
        }
    }

    pub fn is_desktop(&self) -> bool {
        self.desktop
    }

    pub fn is_established(&self) -> bool {
        self.session_key.is_some()
    }

    pub fn auth_token(&self) -> Option<&str> {
        self.auth_token.as_deref()
    }

    pub fn session_key(&self) -> Option<&str> {
        self.session_key.as_deref()
    }

    pub fn session_secret(&self) -> Option<&str> {
        self.session_secret.as_deref()
    }

    pub fn user_id(&self) -> Option<i64> {
        self.user_id
    }

    /// Expiry as a Unix timestamp; `0` means the session does not expire.
    pub fn expires(&self) -> Option<i64> {
        self.expires
    }

    pub(crate) fn record_token(&mut self, token: &str) {
        self.auth_token = Some(token.to_string());
    }

    /// Populate the session from a successful session-creation response.
    /// Nothing is written unless every required field is present.
    pub(crate) fn establish(&mut self, response: &ApiResponse) -> Result<()> {
        let session_key = required_field(response, "session_key")?;
        let user_id = required_int(response, "uid")?;
        let expires = required_int(response, "expires")?;
        let session_secret = if self.desktop {
            Some(required_field(response, "secret")?)
        } else {
            None
        };

        self.session_key = Some(session_key);
        self.user_id = Some(user_id);
        self.expires = Some(expires);
        self.session_secret = session_secret;
        Ok(())
    }
}

fn required_field(response: &ApiResponse, name: &str) -> Result<String> {
    response
        .field(name)
        .ok_or_else(|| ApiError::Parse(format!("session response is missing <{name}>")))
}

fn required_int(response: &ApiResponse, name: &str) -> Result<i64> {
    let text = required_field(response, name)?;
    text.trim()
        .parse()
        .map_err(|_| ApiError::Parse(format!("<{name}> is not an integer: {text:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::parse_response;

    const SESSION: &str = "<auth_getSession_response>\
        <session_key>5f34e11bfb97c762e439e6a5-8055</session_key>\
        <uid>8055</uid><expires>1173309298</expires>\
        <secret>a1b2c3</secret></auth_getSession_response>";

    #[test]
    fn starts_unauthenticated() {
        let state = SessionState::new(false);
        assert_eq!(state.phase(), SessionPhase::Unauthenticated);
        assert!(!state.is_established());
    }

    #[test]
    fn token_then_session() {
        let mut state = SessionState::new(false);
        state.record_token("tok");
        assert_eq!(state.phase(), SessionPhase::TokenIssued);
        assert_eq!(state.session_key(), None);

        state.establish(&parse_response(SESSION.as_bytes()).unwrap()).unwrap();
        assert_eq!(state.phase(), SessionPhase::SessionEstablished);
        assert_eq!(state.session_key(), Some("5f34e11bfb97c762e439e6a5-8055"));
        assert_eq!(state.user_id(), Some(8055));
        assert_eq!(state.expires(), Some(1173309298));
        assert_eq!(state.session_secret(), None);
    }

    #[test]
    fn desktop_mode_keeps_session_secret() {
        let mut state = SessionState::new(true);
        state.establish(&parse_response(SESSION.as_bytes()).unwrap()).unwrap();
        assert_eq!(state.session_secret(), Some("a1b2c3"));
    }

    #[test]
    fn incomplete_response_leaves_state_untouched() {
        let mut state = SessionState::new(true);
        let partial = parse_response(
            b"<auth_getSession_response><session_key>k</session_key><uid>1</uid><expires>0</expires></auth_getSession_response>",
        )
        .unwrap();
        assert!(matches!(state.establish(&partial), Err(ApiError::Parse(_))));
        assert_eq!(state, SessionState::new(true));
    }

    #[test]
    fn resumed_session_counts_as_established() {
        let state = SessionState::resume(false, "key");
        assert!(state.is_established());
        assert_eq!(state.user_id(), None);
    }

    #[test]
    fn credentials_debug_hides_secret() {
        let creds = Credentials::new("key", "hunter2");
        assert!(!format!("{creds:?}").contains("hunter2"));
    }
}
