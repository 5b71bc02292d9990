use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{FromRequest, Multipart, Request, State},
    http::header::CONTENT_TYPE,
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use quick_xml::escape::escape;
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

pub const API_KEY: &str = "mock-api-key";
pub const SECRET: &str = "mock-secret";
pub const ENDPOINT_PATH: &str = "/restserver.php";

/// Extended permissions every mock user has granted.
pub const GRANTED_PERMISSIONS: &[&str] = &["status_update"];

const XMLNS: &str = "http://api.facebook.com/1.0/";
const FIRST_UID: i64 = 1000;
const MAX_PREF_ID: u32 = 200;

/// A photo received through `photos.upload`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Photo {
    pub pid: u64,
    pub owner: i64,
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub caption: Option<String>,
    pub album_id: Option<String>,
}

#[derive(Debug, Clone)]
struct Session {
    uid: i64,
    secret: String,
}

/// Server-side state: one application, its tokens, sessions and user data.
#[derive(Debug)]
pub struct Store {
    api_key: String,
    secret: String,
    tokens: HashSet<String>,
    sessions: HashMap<String, Session>,
    preferences: HashMap<i64, BTreeMap<u32, String>>,
    photos: Vec<Photo>,
    next_uid: i64,
}

impl Store {
    pub fn new(api_key: &str, secret: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            secret: secret.to_string(),
            tokens: HashSet::new(),
            sessions: HashMap::new(),
            preferences: HashMap::new(),
            photos: Vec::new(),
            next_uid: FIRST_UID,
        }
    }

    pub fn photos(&self) -> &[Photo] {
        &self.photos
    }

    pub fn preferences(&self, uid: i64) -> BTreeMap<u32, String> {
        self.preferences.get(&uid).cloned().unwrap_or_default()
    }

    /// Create a session directly, bypassing the token exchange. Returns the
    /// session key and user id.
    pub fn open_session(&mut self) -> (String, i64) {
        let uid = self.next_uid;
        self.next_uid += 1;
        let key = format!("{}-{uid}", Uuid::new_v4().simple());
        self.sessions.insert(
            key.clone(),
            Session {
                uid,
                secret: Uuid::new_v4().simple().to_string(),
            },
        );
        (key, uid)
    }

    fn dispatch(&mut self, call: &Call) -> Result<String, Failure> {
        let method = call.param("method").ok_or(Failure::UNKNOWN_METHOD)?;
        if call.param("api_key") != Some(self.api_key.as_str()) {
            return Err(Failure::new(101, "Invalid API key"));
        }
        let session = match call.param("session_key") {
            Some(key) => Some(self.sessions.get(key).cloned().ok_or(Failure::BAD_SESSION)?),
            None => None,
        };
        self.check_signature(call, session.as_ref())?;

        let name = method.strip_prefix("facebook.").unwrap_or(method);
        debug!(method = name, "dispatching");
        match name {
            "auth.createToken" => {
                let token = Uuid::new_v4().simple().to_string();
                self.tokens.insert(token.clone());
                Ok(envelope(name, &token))
            }
            "auth.getSession" => {
                let token = call.require("auth_token")?;
                if !self.tokens.remove(token) {
                    return Err(Failure::invalid("auth_token is invalid or already used"));
                }
                let (key, uid) = self.open_session();
                let secret = &self.sessions[&key].secret;
                let inner = format!(
                    "\n  <session_key>{key}</session_key>\n  <uid>{uid}</uid>\n  <expires>0</expires>\n  <secret>{secret}</secret>\n"
                );
                Ok(envelope(name, &inner))
            }
            "users.getLoggedInUser" => {
                let session = require_session(session.as_ref())?;
                Ok(envelope(name, &session.uid.to_string()))
            }
            "users.isAppAdded" => {
                require_session(session.as_ref())?;
                Ok(envelope(name, "1"))
            }
            "users.hasAppPermission" => {
                require_session(session.as_ref())?;
                let permission = call.require("ext_perm")?;
                let granted = GRANTED_PERMISSIONS.contains(&permission);
                Ok(envelope(name, if granted { "1" } else { "0" }))
            }
            "fql.query" => {
                let session = require_session(session.as_ref())?;
                let query = call.require("query")?;
                if !query.trim_start().to_ascii_uppercase().starts_with("SELECT") {
                    return Err(Failure::new(601, "Parser error: expected SELECT"));
                }
                Ok(envelope(
                    name,
                    &format!("<user><uid>{}</uid></user>", session.uid),
                ))
            }
            "photos.upload" => {
                let session = require_session(session.as_ref())?;
                let file = call
                    .file
                    .as_ref()
                    .ok_or_else(|| Failure::invalid("photo data missing"))?;
                let pid = self.photos.len() as u64 + 1;
                let photo = Photo {
                    pid,
                    owner: session.uid,
                    file_name: file.file_name.clone(),
                    bytes: file.bytes.clone(),
                    caption: call.param("caption").map(str::to_string),
                    album_id: call.param("aid").map(str::to_string),
                };
                let inner = format!(
                    "<pid>{pid}</pid><aid>{}</aid><owner>{}</owner><caption>{}</caption>",
                    escape(photo.album_id.as_deref().unwrap_or("0")),
                    photo.owner,
                    escape(photo.caption.as_deref().unwrap_or_default()),
                );
                self.photos.push(photo);
                Ok(envelope(name, &inner))
            }
            "data.getUserPreference" => {
                let session = require_session(session.as_ref())?;
                let pref_id = pref_id(call.require("pref_id")?)?;
                let value = self
                    .preferences
                    .get(&session.uid)
                    .and_then(|prefs| prefs.get(&pref_id))
                    .map(|v| escape(v))
                    .unwrap_or_default();
                Ok(envelope(name, &value))
            }
            "data.getUserPreferences" => {
                let session = require_session(session.as_ref())?;
                let mut inner = String::new();
                for (id, value) in self.preferences(session.uid) {
                    inner.push_str(&format!(
                        "\n  <preference>\n    <pref_id>{id}</pref_id>\n    <value>{}</value>\n  </preference>",
                        escape(&value)
                    ));
                }
                Ok(envelope(name, &inner))
            }
            "data.setUserPreference" => {
                let session = require_session(session.as_ref())?;
                let pref_id = pref_id(call.require("pref_id")?)?;
                let value = call.require("value")?;
                self.store_preference(session.uid, pref_id, value);
                Ok(envelope(name, ""))
            }
            "data.setUserPreferences" => {
                let session = require_session(session.as_ref())?;
                let values: BTreeMap<String, String> =
                    serde_json::from_str(call.require("values")?)
                        .map_err(|_| Failure::invalid("values must be a JSON object of strings"))?;
                let mut parsed = Vec::with_capacity(values.len());
                for (id, value) in values {
                    parsed.push((pref_id(&id)?, value));
                }
                if call.param("replace") == Some("true") {
                    self.preferences.remove(&session.uid);
                }
                for (id, value) in parsed {
                    self.store_preference(session.uid, id, &value);
                }
                Ok(envelope(name, ""))
            }
            _ => Err(Failure::UNKNOWN_METHOD),
        }
    }

    fn check_signature(&self, call: &Call, session: Option<&Session>) -> Result<(), Failure> {
        let given = call.param("sig").ok_or(Failure::BAD_SIGNATURE)?;
        let accepted = std::iter::once(self.secret.as_str())
            .chain(session.map(|s| s.secret.as_str()))
            .any(|secret| sign(&call.params, secret) == given);
        if accepted {
            Ok(())
        } else {
            Err(Failure::BAD_SIGNATURE)
        }
    }

    /// `"0"` clears a preference; anything else is stored as sent.
    fn store_preference(&mut self, uid: i64, pref_id: u32, value: &str) {
        let prefs = self.preferences.entry(uid).or_default();
        if value == "0" {
            prefs.remove(&pref_id);
        } else {
            prefs.insert(pref_id, value.to_string());
        }
    }
}

pub type Db = Arc<RwLock<Store>>;

pub fn new_db() -> Db {
    Arc::new(RwLock::new(Store::new(API_KEY, SECRET)))
}

pub fn app() -> Router {
    app_with(new_db())
}

pub fn app_with(db: Db) -> Router {
    Router::new()
        .route(ENDPOINT_PATH, post(restserver))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    run_with(listener, new_db()).await
}

pub async fn run_with(listener: TcpListener, db: Db) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with(db)).await
}

async fn restserver(State(db): State<Db>, request: Request) -> Response {
    let call = match Call::from_request(request).await {
        Ok(call) => call,
        Err(failure) => return xml(failure.to_xml(&BTreeMap::new())),
    };
    let result = db.write().await.dispatch(&call);
    match result {
        Ok(body) => xml(body),
        Err(failure) => {
            warn!(code = failure.code, message = failure.message, "rejecting call");
            xml(failure.to_xml(&call.params))
        }
    }
}

fn xml(body: String) -> Response {
    ([(CONTENT_TYPE, "text/xml; charset=utf-8")], body).into_response()
}

fn envelope(method: &str, inner: &str) -> String {
    let tag = format!("{}_response", method.replace('.', "_"));
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<{tag} xmlns=\"{XMLNS}\">{inner}</{tag}>"
    )
}

fn require_session(session: Option<&Session>) -> Result<&Session, Failure> {
    session.ok_or(Failure::BAD_SESSION)
}

fn pref_id(text: &str) -> Result<u32, Failure> {
    text.parse()
        .ok()
        .filter(|id| *id <= MAX_PREF_ID)
        .ok_or_else(|| Failure::invalid("pref_id must be an integer from 0 to 200"))
}

/// Signature over every parameter except `sig`, keys sorted.
pub fn sign(params: &BTreeMap<String, String>, secret: &str) -> String {
    let mut buffer = String::new();
    for (key, value) in params.iter().filter(|(k, _)| k.as_str() != "sig") {
        buffer.push_str(key);
        buffer.push('=');
        buffer.push_str(value);
    }
    buffer.push_str(secret);
    format!("{:x}", md5::compute(buffer.as_bytes()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Failure {
    code: i32,
    message: &'static str,
}

impl Failure {
    const UNKNOWN_METHOD: Failure = Failure::new(3, "Unknown method");
    const BAD_SESSION: Failure = Failure::new(102, "Session key invalid or no longer valid");
    const BAD_SIGNATURE: Failure = Failure::new(104, "Incorrect signature");

    const fn new(code: i32, message: &'static str) -> Self {
        Self { code, message }
    }

    const fn invalid(message: &'static str) -> Self {
        Self::new(100, message)
    }

    fn to_xml(&self, params: &BTreeMap<String, String>) -> String {
        let mut args = String::new();
        for (key, value) in params {
            args.push_str(&format!(
                "\n    <arg>\n      <key>{}</key>\n      <value>{}</value>\n    </arg>",
                escape(key),
                escape(value)
            ));
        }
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<error_response xmlns=\"{XMLNS}\">\n  <error_code>{}</error_code>\n  <error_msg>{}</error_msg>\n  <request_args list=\"true\">{args}\n  </request_args>\n</error_response>",
            self.code,
            escape(self.message)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FilePart {
    file_name: String,
    bytes: Vec<u8>,
}

/// Decoded request parameters plus the uploaded file, if any.
#[derive(Debug, Default)]
struct Call {
    params: BTreeMap<String, String>,
    file: Option<FilePart>,
}

impl Call {
    /// Decode a form-encoded or multipart request.
    async fn from_request(request: Request) -> Result<Self, Failure> {
        let is_multipart = request
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("multipart/form-data"));
        if is_multipart {
            let multipart = Multipart::from_request(request, &())
                .await
                .map_err(|_| Failure::invalid("malformed multipart body"))?;
            return Self::from_multipart(multipart).await;
        }
        let body = Bytes::from_request(request, &())
            .await
            .map_err(|_| Failure::invalid("unreadable request body"))?;
        Self::from_form(&body)
    }

    fn from_form(body: &[u8]) -> Result<Self, Failure> {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(body)
            .map_err(|_| Failure::invalid("body is not form-encoded"))?;
        Ok(Self {
            params: pairs.into_iter().collect(),
            file: None,
        })
    }

    /// Named parts become parameters; the part carrying a `filename` is the
    /// upload.
    async fn from_multipart(mut multipart: Multipart) -> Result<Self, Failure> {
        let malformed = |_| Failure::invalid("malformed multipart body");
        let mut call = Call::default();
        while let Some(field) = multipart.next_field().await.map_err(malformed)? {
            let name = field.name().map(str::to_string);
            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    if call.file.is_some() {
                        return Err(Failure::invalid("only one file per request"));
                    }
                    let bytes = field.bytes().await.map_err(malformed)?;
                    call.file = Some(FilePart {
                        file_name,
                        bytes: bytes.to_vec(),
                    });
                }
                None => {
                    let name = name.ok_or(Failure::invalid("multipart part without a name"))?;
                    let value = field.text().await.map_err(malformed)?;
                    call.params.insert(name, value);
                }
            }
        }
        Ok(call)
    }

    fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    fn require(&self, key: &str) -> Result<&str, Failure> {
        self.param(key)
            .ok_or_else(|| Failure::invalid("a required parameter is missing"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn sign_matches_reference_case() {
        assert_eq!(
            sign(&params(&[("b", "2"), ("a", "1")]), "S"),
            "6e8568e2a055b40328249de76d11115e"
        );
    }

    #[test]
    fn sign_ignores_sig_entry() {
        let with_sig = params(&[("a", "1"), ("b", "2"), ("sig", "whatever")]);
        assert_eq!(sign(&with_sig, "S"), "6e8568e2a055b40328249de76d11115e");
    }

    fn request(content_type: &str, body: &'static [u8]) -> Request {
        Request::builder()
            .method("POST")
            .uri(ENDPOINT_PATH)
            .header(CONTENT_TYPE, content_type)
            .body(axum::body::Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn decodes_form_body() {
        let call = Call::from_request(request(
            "application/x-www-form-urlencoded",
            b"method=facebook.fql.query&query=SELECT+uid+FROM+user",
        ))
        .await
        .unwrap();
        assert_eq!(call.param("query"), Some("SELECT uid FROM user"));
        assert!(call.file.is_none());
    }

    #[tokio::test]
    async fn decodes_multipart_body_with_unnamed_file_part() {
        let body = b"--xyz\r\nContent-disposition: form-data; name=\"caption\"\r\n\r\nhi\r\n\
--xyz\r\nContent-disposition: form-data; filename=\"cat.jpg\"\r\nContent-Type: image/jpeg\r\n\r\n\x00\x01\r\n\x02\r\n--xyz--\r\n";
        let call = Call::from_request(request("multipart/form-data; boundary=xyz", body))
            .await
            .unwrap();
        assert_eq!(call.param("caption"), Some("hi"));
        let file = call.file.unwrap();
        assert_eq!(file.file_name, "cat.jpg");
        assert_eq!(file.bytes, b"\x00\x01\r\n\x02");
    }

    #[tokio::test]
    async fn rejects_second_file_part() {
        let body = b"--xyz\r\nContent-disposition: form-data; filename=\"a.jpg\"\r\n\r\n1\r\n\
--xyz\r\nContent-disposition: form-data; filename=\"b.jpg\"\r\n\r\n2\r\n--xyz--\r\n";
        let result = Call::from_request(request("multipart/form-data; boundary=xyz", body)).await;
        assert_eq!(result.unwrap_err().code, 100);
    }

    #[tokio::test]
    async fn rejects_truncated_multipart() {
        let body = b"--xyz\r\nContent-disposition: form-data; name=\"caption\"\r\n\r\nhi";
        let result = Call::from_request(request("multipart/form-data; boundary=xyz", body)).await;
        assert!(result.is_err());
    }

    #[test]
    fn preference_zero_clears() {
        let mut store = Store::new(API_KEY, SECRET);
        store.store_preference(1, 5, "_x");
        assert_eq!(store.preferences(1).get(&5).map(String::as_str), Some("_x"));
        store.store_preference(1, 5, "0");
        assert!(store.preferences(1).is_empty());
    }

    #[test]
    fn error_xml_lists_request_args() {
        let xml = Failure::BAD_SIGNATURE.to_xml(&params(&[
            ("method", "facebook.auth.createToken"),
            ("query", "a<b & c"),
        ]));
        assert!(xml.contains("<value>a&lt;b &amp; c</value>"));
        assert!(xml.contains("<error_code>104</error_code>"));
        assert!(xml.contains("<key>method</key>"));
    }
}
