//! Error types for the signed REST client.
//!
//! # Design
//! Each failure class gets its own variant so callers can match on the kind
//! instead of inspecting messages. `Application` is the only variant produced
//! by the remote side's error envelope; everything else is raised locally
//! (validation, configuration), by the transport, or by the response parser.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ApiError>;

/// Error code used for locally rejected arguments. Matches the remote
/// side's own "invalid parameter" code so callers can treat both alike.
pub const GEN_INVALID_PARAMETER: i32 = 100;

/// The remote side reported failure through the error envelope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("remote error {code}: {message}")]
pub struct StructuredError {
    pub code: i32,
    pub message: String,
}

impl StructuredError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Errors returned by `RestClient` and its building blocks.
#[derive(Debug, Error)]
pub enum ApiError {
    /// A caller-supplied argument failed a local precondition. Raised before
    /// any network activity.
    #[error("invalid parameter ({code}): {message}")]
    InvalidParameter { code: i32, message: String },

    /// A file-taking method was invoked without a file.
    #[error("method {method} requires a file upload but none was given")]
    MissingUpload { method: &'static str },

    /// The client configuration could not be loaded.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A configured endpoint is not a valid URL.
    #[error("invalid endpoint URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Connection failure, timeout or other low-level transport fault.
    #[error("transport failure: {0}")]
    Transport(#[from] ureq::Error),

    /// The server answered with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    /// The upload file could not be opened or read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The response body was not UTF-8, not well-formed XML, or did not have
    /// the expected shape.
    #[error("malformed response: {0}")]
    Parse(String),

    /// The remote operation failed.
    #[error(transparent)]
    Application(#[from] StructuredError),
}

impl ApiError {
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            code: GEN_INVALID_PARAMETER,
            message: message.into(),
        }
    }

    /// The remote error code, if this error came from the error envelope.
    pub fn remote_code(&self) -> Option<i32> {
        match self {
            ApiError::Application(err) => Some(err.code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_parameter_uses_shared_code() {
        let err = ApiError::invalid_parameter("pref id out of range");
        assert!(matches!(
            err,
            ApiError::InvalidParameter { code: GEN_INVALID_PARAMETER, .. }
        ));
        assert_eq!(err.remote_code(), None);
    }

    #[test]
    fn application_error_displays_code_and_message() {
        let err: ApiError = StructuredError::new(102, "Session key invalid").into();
        assert_eq!(err.to_string(), "remote error 102: Session key invalid");
        assert_eq!(err.remote_code(), Some(102));
    }
}
