//! The call pipeline: build, sign, send, parse.
//!
//! # Design
//! `RestClient` splits every call into `prepare` (parameters → signed
//! `HttpRequest`, no I/O) and `parse` (`HttpResponse` → `ApiResponse` or a
//! typed error), joined by a `Transport`. Each invocation returns its own
//! response value; the client keeps no per-call slots, so the only mutable
//! state is the session, and only the handshake in `ops` writes it (through
//! `&mut self`).

use std::fmt;

use tracing::{debug, instrument, warn};

use crate::config::ClientConfig;
use crate::error::{ApiError, Result};
use crate::http::{HttpRequest, HttpResponse, Upload};
use crate::method::MethodDescriptor;
use crate::request::{build_params, sign_params, CallIds};
use crate::response::{self, ApiResponse};
use crate::session::{Credentials, SessionState};
use crate::transport::{build_body, Transport, UreqTransport};

/// Blocking client for the signed REST API.
///
/// One call at a time per instance; read-only calls take `&self`, the
/// session handshake takes `&mut self`.
pub struct RestClient {
    credentials: Credentials,
    config: ClientConfig,
    pub(crate) session: SessionState,
    call_ids: CallIds,
    transport: Box<dyn Transport>,
}

impl RestClient {
    /// A client sending over HTTP with `ureq`.
    pub fn new(credentials: Credentials, config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let transport = UreqTransport::new(&config);
        Ok(Self::with_transport(credentials, config, transport))
    }

    pub fn with_transport(
        credentials: Credentials,
        config: ClientConfig,
        transport: impl Transport + 'static,
    ) -> Self {
        Self {
            session: SessionState::new(config.desktop),
            credentials,
            config,
            call_ids: CallIds::default(),
            transport: Box::new(transport),
        }
    }

    /// Continue a session whose key was obtained elsewhere.
    pub fn with_session_key(mut self, session_key: impl Into<String>) -> Self {
        self.session = SessionState::resume(self.config.desktop, session_key);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn api_key(&self) -> &str {
        self.credentials.api_key()
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn session_key(&self) -> Option<&str> {
        self.session.session_key()
    }

    pub fn user_id(&self) -> Option<i64> {
        self.session.user_id()
    }

    pub fn is_session_established(&self) -> bool {
        self.session.is_established()
    }

    /// Build the signed request for `method` without sending it.
    pub fn prepare<I, K, V>(
        &self,
        method: &MethodDescriptor,
        params: I,
        upload: Option<&Upload>,
    ) -> Result<HttpRequest>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        match (method.takes_file(), upload) {
            (true, None) => {
                return Err(ApiError::MissingUpload {
                    method: method.name(),
                })
            }
            (false, Some(_)) => {
                return Err(ApiError::invalid_parameter(format!(
                    "{} does not accept a file",
                    method.name()
                )))
            }
            _ => {}
        }

        let params = build_params(
            method,
            params,
            &self.credentials,
            &self.session,
            &self.call_ids,
        )?;
        let params = sign_params(params, method, &self.credentials, &self.session);
        if self.config.debug {
            debug!(method = method.name(), ?params, "signed parameters");
        }

        // Multipart uploads always use the standard endpoint.
        let url = if upload.is_some() {
            self.config.endpoint.clone()
        } else {
            self.config.endpoint_for(method).to_string()
        };
        Ok(HttpRequest {
            url,
            body: build_body(&params, upload),
        })
    }

    /// Turn a drained response into a result, raising the error envelope.
    pub fn parse(&self, method: &MethodDescriptor, response: HttpResponse) -> Result<ApiResponse> {
        check_status(&response)?;
        if self.config.debug {
            debug!(
                method = method.name(),
                raw = %String::from_utf8_lossy(&response.body),
                "raw response"
            );
        }
        response::parse_response(&response.body).map_err(|err| log_failure(method, err))
    }

    /// Invoke a form-encoded operation.
    #[instrument(skip_all, fields(method = method.name()))]
    pub fn invoke<I, K, V>(&self, method: &MethodDescriptor, params: I) -> Result<ApiResponse>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let response = self.send(method, params, None)?;
        self.parse(method, response)
    }

    /// Invoke a file-taking operation with `upload` as its single file.
    #[instrument(skip_all, fields(method = method.name(), file = upload.file_name()))]
    pub fn invoke_upload<I, K, V>(
        &self,
        method: &MethodDescriptor,
        params: I,
        upload: &Upload,
    ) -> Result<ApiResponse>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let response = self.send(method, params, Some(upload))?;
        self.parse(method, response)
    }

    /// Invoke an operation whose result is a single scalar and return its
    /// text, skipping tree construction for simple documents.
    #[instrument(skip_all, fields(method = method.name()))]
    pub fn invoke_scalar<I, K, V>(&self, method: &MethodDescriptor, params: I) -> Result<String>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let response = self.send(method, params, None)?;
        check_status(&response)?;
        response::parse_scalar(&response.body).map_err(|err| log_failure(method, err))
    }

    fn send<I, K, V>(
        &self,
        method: &MethodDescriptor,
        params: I,
        upload: Option<&Upload>,
    ) -> Result<HttpResponse>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let request = self.prepare(method, params, upload)?;
        debug!(url = %request.url, multipart = upload.is_some(), "calling remote method");
        self.transport.execute(&request)
    }
}

impl fmt::Debug for RestClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestClient")
            .field("credentials", &self.credentials)
            .field("config", &self.config)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

fn check_status(response: &HttpResponse) -> Result<()> {
    if response.is_success() {
        return Ok(());
    }
    Err(ApiError::HttpError {
        status: response.status,
        body: String::from_utf8_lossy(&response.body).into_owned(),
    })
}

fn log_failure(method: &MethodDescriptor, err: ApiError) -> ApiError {
    match &err {
        ApiError::Application(remote) => {
            warn!(method = method.name(), code = remote.code, message = %remote.message, "remote call failed")
        }
        other => warn!(method = method.name(), error = %other, "could not parse response"),
    }
    err
}
