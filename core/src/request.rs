//! Assembly of the parameter set for one call.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{ApiError, Result};
use crate::method::MethodDescriptor;
use crate::params::ParameterSet;
use crate::session::{Credentials, SessionState};
use crate::signature::{self, SIGNATURE_KEY};

/// API version sent with every call.
pub const API_VERSION: &str = "1.0";

/// Per-client source of `call_id` values: wall-clock milliseconds, bumped
/// when needed so that every value is strictly greater than the last.
#[derive(Debug, Default)]
pub struct CallIds {
    last: AtomicU64,
}

impl CallIds {
    pub fn next(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        let previous = self
            .last
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or_else(|last| last);
        now.max(previous + 1)
    }
}

/// Merge the always-present parameters, session parameters and caller pairs.
/// The result is not yet signed.
pub fn build_params<I, K, V>(
    method: &MethodDescriptor,
    caller: I,
    credentials: &Credentials,
    session: &SessionState,
    call_ids: &CallIds,
) -> Result<ParameterSet>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let mut params = ParameterSet::with_capacity(method.total_params());
    params.insert("method", method.name());
    params.insert("api_key", credentials.api_key());
    params.insert("v", API_VERSION);

    // Some methods accept a session without requiring one; only inject when
    // the method asks for it and a session is actually held.
    if method.requires_session() {
        if let Some(session_key) = session.session_key() {
            params.insert("call_id", call_ids.next().to_string());
            params.insert("session_key", session_key);
        }
    }

    for (key, value) in caller {
        let key = key.into();
        if key == SIGNATURE_KEY {
            return Err(ApiError::invalid_parameter(
                "the signature parameter is computed by the client",
            ));
        }
        params.insert(key, value);
    }
    Ok(params)
}

/// Secret used to sign `method`: the session secret for session calls of an
/// installed application, the application secret otherwise.
pub fn signing_secret<'a>(
    method: &MethodDescriptor,
    credentials: &'a Credentials,
    session: &'a SessionState,
) -> &'a str {
    if session.is_desktop() && method.requires_session() {
        if let Some(secret) = session.session_secret() {
            return secret;
        }
    }
    credentials.secret()
}

/// Sign `params` and append the signature.
pub fn sign_params(
    mut params: ParameterSet,
    method: &MethodDescriptor,
    credentials: &Credentials,
    session: &SessionState,
) -> ParameterSet {
    let sig = signature::sign(&params, signing_secret(method, credentials, session));
    params.insert(SIGNATURE_KEY, sig);
    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::methods;
    use crate::response::parse_response;

    fn creds() -> Credentials {
        Credentials::new("app-key", "app-secret")
    }

    fn no_pairs() -> Vec<(String, String)> {
        Vec::new()
    }

    #[test]
    fn always_injects_method_key_and_version() {
        let params = build_params(
            &methods::AUTH_CREATE_TOKEN,
            no_pairs(),
            &creds(),
            &SessionState::new(false),
            &CallIds::default(),
        )
        .unwrap();
        assert_eq!(params.get("method"), Some("facebook.auth.createToken"));
        assert_eq!(params.get("api_key"), Some("app-key"));
        assert_eq!(params.get("v"), Some(API_VERSION));
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn session_params_only_with_session_method_and_key() {
        let session = SessionState::resume(false, "sess");
        let ids = CallIds::default();

        let sessionless =
            build_params(&methods::AUTH_CREATE_TOKEN, no_pairs(), &creds(), &session, &ids).unwrap();
        assert!(!sessionless.contains_key("session_key"));

        let scoped = build_params(
            &methods::USERS_GET_LOGGED_IN_USER,
            no_pairs(),
            &creds(),
            &session,
            &ids,
        )
        .unwrap();
        assert_eq!(scoped.get("session_key"), Some("sess"));
        assert!(scoped.contains_key("call_id"));

        let unauthenticated = build_params(
            &methods::USERS_GET_LOGGED_IN_USER,
            no_pairs(),
            &creds(),
            &SessionState::new(false),
            &ids,
        )
        .unwrap();
        assert!(!unauthenticated.contains_key("call_id"));
    }

    #[test]
    fn caller_value_wins_on_collision() {
        let params = build_params(
            &methods::FQL_QUERY,
            [("query", "a"), ("v", "2.0"), ("query", "b")],
            &creds(),
            &SessionState::new(false),
            &CallIds::default(),
        )
        .unwrap();
        assert_eq!(params.get("query"), Some("b"));
        assert_eq!(params.get("v"), Some("2.0"));
        assert_eq!(params.iter().filter(|(k, _)| *k == "query").count(), 1);
    }

    #[test]
    fn caller_signature_is_rejected() {
        let err = build_params(
            &methods::FQL_QUERY,
            [("sig", "forged")],
            &creds(),
            &SessionState::new(false),
            &CallIds::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ApiError::InvalidParameter { code: 100, .. }));
    }

    #[test]
    fn call_ids_strictly_increase() {
        let ids = CallIds::default();
        let mut previous = ids.next();
        for _ in 0..1000 {
            let next = ids.next();
            assert!(next > previous);
            previous = next;
        }
    }

    #[test]
    fn desktop_session_calls_use_session_secret() {
        let mut session = SessionState::new(true);
        let response = parse_response(
            b"<r><session_key>k</session_key><uid>1</uid><expires>0</expires><secret>sess-secret</secret></r>",
        )
        .unwrap();
        session.establish(&response).unwrap();

        let c = creds();
        assert_eq!(signing_secret(&methods::FQL_QUERY, &c, &session), "sess-secret");
        assert_eq!(signing_secret(&methods::AUTH_GET_SESSION, &c, &session), "app-secret");

        let web = SessionState::resume(false, "k");
        assert_eq!(signing_secret(&methods::FQL_QUERY, &c, &web), "app-secret");
    }

    #[test]
    fn signature_is_appended_last() {
        let params = build_params(
            &methods::AUTH_CREATE_TOKEN,
            no_pairs(),
            &creds(),
            &SessionState::new(false),
            &CallIds::default(),
        )
        .unwrap();
        let expected = signature::sign(&params, "app-secret");
        let signed = sign_params(params, &methods::AUTH_CREATE_TOKEN, &creds(), &SessionState::new(false));
        assert_eq!(signed.iter().last(), Some((SIGNATURE_KEY, expected.as_str())));
    }
}
