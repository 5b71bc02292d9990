//! Blocking client core for a signed, procedure-style REST API.
//!
//! # Overview
//! Every remote operation goes through one pipeline: merge the caller's
//! parameters with the method metadata and session, sign the set, POST it as
//! a form or multipart upload, then parse the XML answer into an
//! `ApiResponse` or a typed `ApiError`.
//!
//! # Design
//! - `RestClient::prepare` and `RestClient::parse` are pure; only the
//!   `Transport` does I/O, so the whole pipeline is testable without a
//!   network.
//! - Every call returns its own `ApiResponse`; the client holds no
//!   last-response or staged-file slots.
//! - The session is written only by the handshake, which takes `&mut self`.
//! - Operation wrappers in `ops` are thin: they assemble named parameters and
//!   call `invoke`, `invoke_upload` or `invoke_scalar`.

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod method;
pub mod ops;
pub mod params;
pub mod preferences;
pub mod request;
pub mod response;
pub mod session;
pub mod signature;
pub mod transport;

pub use client::RestClient;
pub use config::ClientConfig;
pub use error::{ApiError, Result, StructuredError, GEN_INVALID_PARAMETER};
pub use http::{HttpRequest, HttpResponse, RequestBody, Upload};
pub use method::{methods, MethodDescriptor};
pub use ops::PhotoUpload;
pub use params::ParameterSet;
pub use response::{ApiResponse, Element, Node};
pub use session::{Credentials, SessionPhase, SessionState};
pub use transport::{Transport, UreqTransport};
