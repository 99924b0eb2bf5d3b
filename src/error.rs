//! Unified error type.

/// A phase error as handed from a collaborator to its serializer.
///
/// The pipeline never inspects these; it only routes them.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type returned by resdk's fallible operations.
///
/// Application-level failures (401, 404, 422, etc.) are expressed as HTTP
/// [`Response`](crate::Response) values written by a serializer, not as
/// `Error`s. This type surfaces configuration and infrastructure failures:
/// an incomplete pipeline, a bad address, binding to a port.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid socket address: {0}")]
    Addr(#[from] std::net::AddrParseError),

    /// A mandatory pipeline slot was never filled.
    #[error("pipeline is missing its {0}")]
    Missing(&'static str),
}

/// Synthesized when a processor finds nothing to return.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, thiserror::Error)]
#[error("Not found")]
pub struct NotFound;
