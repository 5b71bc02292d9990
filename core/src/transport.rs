//! Wire encodings and the blocking HTTP transport.
//!
//! # Design
//! Encoding is pure: `encode_form` and `encode_multipart` turn a signed
//! `ParameterSet` into bytes. `Transport` is the single I/O seam; the default
//! `UreqTransport` sends one blocking POST per call with no retries.

use std::time::{SystemTime, UNIX_EPOCH};

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use tracing::debug;
use ureq::{Agent, SendBody};

use crate::config::ClientConfig;
use crate::error::Result;
use crate::http::{HttpRequest, HttpResponse, MultipartBody, RequestBody, Upload, UPLOAD_CONTENT_TYPE};
use crate::params::ParameterSet;

const CRLF: &str = "\r\n";
/// Marker placed before every boundary and after the closing one.
const BOUNDARY_MARKER: &str = "--";

/// Characters left alone by form encoding: alphanumerics and `.-*_`.
const FORM_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'.')
    .remove(b'-')
    .remove(b'*')
    .remove(b'_');

/// Percent-encode `value` for a form body; spaces become `+`.
pub fn form_encode(value: &str) -> String {
    utf8_percent_encode(value, FORM_VALUE)
        .to_string()
        .replace("%20", "+")
}

/// `key=value` pairs joined by `&`. Keys are written as-is; values are
/// encoded unless `encode` is false.
pub fn encode_form(params: &ParameterSet, encode: bool) -> String {
    let mut buffer = String::new();
    for (key, value) in params.iter() {
        if !buffer.is_empty() {
            buffer.push('&');
        }
        buffer.push_str(key);
        buffer.push('=');
        if encode {
            buffer.push_str(&form_encode(value));
        } else {
            buffer.push_str(value);
        }
    }
    buffer
}

/// Boundary derived from the current time, in lowercase hex.
pub fn new_boundary() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!("{millis:x}")
}

/// Lay out a multipart body: one part per parameter, then the file part and
/// the closing delimiter. The file content itself is streamed at send time.
pub fn encode_multipart(params: &ParameterSet, upload: &Upload, boundary: &str) -> MultipartBody {
    let mut head = String::new();
    for (key, value) in params.iter() {
        head.push_str(&format!("{BOUNDARY_MARKER}{boundary}{CRLF}"));
        head.push_str(&format!("Content-disposition: form-data; name=\"{key}\"{CRLF}{CRLF}"));
        head.push_str(value);
        head.push_str(CRLF);
    }
    head.push_str(&format!("{BOUNDARY_MARKER}{boundary}{CRLF}"));
    head.push_str(&format!(
        "Content-disposition: form-data; filename=\"{}\"{CRLF}",
        upload.file_name()
    ));
    head.push_str(&format!("Content-Type: {UPLOAD_CONTENT_TYPE}{CRLF}"));
    head.push_str(CRLF);

    let tail = format!("{CRLF}{BOUNDARY_MARKER}{boundary}{BOUNDARY_MARKER}{CRLF}");
    MultipartBody {
        boundary: boundary.to_string(),
        head: head.into_bytes(),
        upload: upload.clone(),
        tail: tail.into_bytes(),
    }
}

/// Executes a prepared request and returns the drained response.
pub trait Transport: Send + Sync {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

/// Blocking transport backed by `ureq`.
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: Agent,
}

impl UreqTransport {
    pub fn new(config: &ClientConfig) -> Self {
        // Status codes are reported as data so the pipeline can decide what
        // a non-2xx answer means.
        let agent = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_connect(config.connect_timeout())
            .build()
            .new_agent();
        Self { agent }
    }
}

impl Transport for UreqTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let content_type = request.content_type();
        let post = self.agent.post(&request.url).content_type(content_type.as_str());
        let mut response = match &request.body {
            RequestBody::Form(body) => {
                debug!(url = %request.url, bytes = body.len(), "sending form request");
                post.send(body.as_bytes())?
            }
            RequestBody::Multipart(multipart) => {
                debug!(
                    url = %request.url,
                    file = %multipart.upload.path().display(),
                    "sending multipart request"
                );
                let mut reader = multipart.reader()?;
                post.header("mime-version", "1.0")
                    .send(SendBody::from_reader(&mut reader))?
            }
        };

        let status = response.status().as_u16();
        let body = response.body_mut().read_to_vec()?;
        Ok(HttpResponse { status, body })
    }
}

/// Request encodings used by the pipeline.
pub(crate) fn build_body(params: &ParameterSet, upload: Option<&Upload>) -> RequestBody {
    match upload {
        Some(upload) => RequestBody::Multipart(encode_multipart(params, upload, &new_boundary())),
        None => RequestBody::Form(encode_form(params, true)),
    }
}
