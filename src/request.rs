//! Incoming HTTP request type.

use bytes::Bytes;
use http::{Extensions, HeaderMap, Method, Uri};
use http_body_util::{BodyExt, LengthLimitError, Limited};

use crate::error::BoxError;

/// Why a request body could not be buffered.
#[derive(Debug, thiserror::Error)]
pub(crate) enum BodyError {
    #[error("request body exceeds {0} bytes")]
    TooLarge(usize),

    #[error("failed to read request body: {0}")]
    Read(BoxError),
}

/// An incoming HTTP request with its body fully buffered.
///
/// Collaborators only ever see `&Request`: the pipeline reads it, it never
/// mutates or keeps it past the call.
#[derive(Debug)]
pub struct Request {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    extensions: Extensions,
    body: Bytes,
}

impl Request {
    /// Builds a request from already-split `http` parts.
    pub fn from_parts(parts: http::request::Parts, body: Bytes) -> Self {
        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            extensions: parts.extensions,
            body,
        }
    }

    /// Buffers a hyper request body of at most `limit` bytes and wraps the
    /// result.
    pub(crate) async fn from_hyper(
        req: hyper::Request<hyper::body::Incoming>,
        limit: usize,
    ) -> Result<Self, BodyError> {
        let (parts, body) = req.into_parts();
        let body = match Limited::new(body, limit).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) if e.is::<LengthLimitError>() => return Err(BodyError::TooLarge(limit)),
            Err(e) => return Err(BodyError::Read(e)),
        };
        Ok(Self::from_parts(parts, body))
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn path(&self) -> &str { self.uri.path() }
    pub fn query(&self) -> Option<&str> { self.uri.query() }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn extensions(&self) -> &Extensions { &self.extensions }
    pub fn body(&self) -> &[u8] { &self.body }

    /// Case-insensitive header lookup. Values that are not visible ASCII read
    /// as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

impl From<http::Request<Bytes>> for Request {
    fn from(req: http::Request<Bytes>) -> Self {
        let (parts, body) = req.into_parts();
        Self::from_parts(parts, body)
    }
}
