//! HTTP requests and responses as plain data.
//!
//! # Design
//! `RestClient::prepare` produces an `HttpRequest` and `RestClient::parse`
//! consumes an `HttpResponse`; only a `Transport` touches the network. A
//! multipart request refers to its file by path and the file is opened when
//! the body is streamed, so requests stay cheap to clone and inspect and no
//! descriptor outlives the send.

use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};

/// Content type of the single file part in a multipart upload.
pub const UPLOAD_CONTENT_TYPE: &str = "image/jpeg";

pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// A file to attach to an upload call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    path: PathBuf,
    file_name: String,
}

impl Upload {
    /// Stage `path` for upload. Fails if it is not a readable regular file.
    pub fn from_path(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path)?;
        if !metadata.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }
        // Surface permission problems now rather than mid-request.
        File::open(path)?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self {
            path: path.to_path_buf(),
            file_name,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }
}

/// A `multipart/form-data` body: encoded text parts, one streamed file part,
/// and the closing delimiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartBody {
    pub boundary: String,
    pub head: Vec<u8>,
    pub upload: Upload,
    pub tail: Vec<u8>,
}

impl MultipartBody {
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Stream the whole body. The file is opened here and closed when the
    /// reader is dropped.
    pub fn reader(&self) -> io::Result<impl Read + Send + Sync + 'static> {
        let file = File::open(&self.upload.path)?;
        Ok(Cursor::new(self.head.clone())
            .chain(file)
            .chain(Cursor::new(self.tail.clone())))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    /// `application/x-www-form-urlencoded` text.
    Form(String),
    Multipart(MultipartBody),
}

/// A POST to the API endpoint, described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub body: RequestBody,
}

impl HttpRequest {
    pub fn content_type(&self) -> String {
        match &self.body {
            RequestBody::Form(_) => FORM_CONTENT_TYPE.to_string(),
            RequestBody::Multipart(multipart) => multipart.content_type(),
        }
    }
}

/// A fully drained HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
