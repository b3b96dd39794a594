//! Failures raised while dispatching and decoding a call.
//!
//! [`Error`] is what the transport, the converter and the request builder
//! produce. It is deliberately detailed: raw bodies, status codes and the
//! underlying `reqwest`/`std::io` errors are all preserved. Callers usually do
//! not match on it directly; the lifecycle hands it to
//! [`classify`](crate::classify) which reduces it to a stable
//! [`ErrorKind`](crate::ErrorKind).

use http::StatusCode;
use std::sync::Arc;

/// A failure raised by a single call.
///
/// The type is `Clone` so that the catch-all [`ErrorKind::Other`](crate::ErrorKind::Other)
/// can keep the complete original failure around for diagnostics. Foreign
/// errors that are not `Clone` themselves are held behind an `Arc`.
///
/// # Examples
///
/// ```
/// use netcall::{classify, Error, ErrorKind};
///
/// let err = Error::Timeout { detail: "30s".to_string() };
/// assert!(matches!(classify(&err), ErrorKind::Timeout(detail) if detail == "30s"));
/// ```
#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    /// An error reported by `reqwest` that was not mapped to anything more
    /// specific when it was raised.
    ///
    /// The classifier still inspects it (timeouts, DNS, connect, decode...).
    #[error("Network error: {0}")]
    Network(#[source] Arc<reqwest::Error>),

    /// An I/O error raised outside of `reqwest`, e.g. by a custom transport.
    #[error("I/O error: {0}")]
    Io(#[source] Arc<std::io::Error>),

    /// The host name could not be resolved.
    #[error("Unable to resolve host {host}")]
    UnknownHost {
        /// The host that failed to resolve
        host: String,
    },

    /// The request URL could not be built.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// A connection to the server could not be established.
    #[error("Connection failed: {0}")]
    Connect(String),

    /// The call did not finish within its deadline.
    ///
    /// `detail` describes the deadline that was exceeded, e.g. `"30s"`.
    #[error("Request timed out after {detail}")]
    Timeout {
        /// Human readable description of the exceeded deadline
        detail: String,
    },

    /// Writing a downloaded body to its destination failed.
    #[error("Download failed: {message}")]
    Download {
        /// What went wrong while writing the file
        message: String,
    },

    /// The response body could not be converted into the expected type.
    #[error("Failed to convert response (status {status}): {message}")]
    ConvertFailed {
        /// The raw response body that failed to convert
        raw_response: String,
        /// The converter or serde error message
        message: String,
        /// The HTTP status code
        status: StatusCode,
    },

    /// The server rejected the request (4xx).
    #[error("Request rejected with {status}: {raw_response}")]
    RequestParams {
        /// The HTTP status code
        status: StatusCode,
        /// The raw response body
        raw_response: String,
    },

    /// The server failed to handle the request (5xx).
    #[error("Server error {status}: {raw_response}")]
    ServerResponse {
        /// The HTTP status code
        status: StatusCode,
        /// The raw response body
        raw_response: String,
    },

    /// The response was well formed but reported a failure at the
    /// application level (typically raised by a custom converter).
    #[error("Response failed: {message}")]
    Response {
        /// The message reported by the server
        message: String,
    },

    /// The response had no body where a value was required.
    #[error("Response body was empty (status {status})")]
    NullResult {
        /// The HTTP status code
        status: StatusCode,
    },

    /// A cache-only read found nothing to return.
    #[error("No cached response available: {0}")]
    NoCache(String),

    /// The call was cancelled before it finished.
    #[error("Call was cancelled")]
    Cancelled,

    /// Invalid configuration was provided.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Failed to serialize the request body.
    #[error("Failed to serialize request: {0}")]
    SerializationFailed(String),

    /// Any other failure.
    #[error("{0}")]
    Other(Arc<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wraps an arbitrary error as [`Error::Other`].
    pub fn other<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Other(Arc::new(error))
    }

    /// Returns `true` if this failure is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Returns the HTTP status code if this error has one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::ConvertFailed { status, .. }
            | Error::RequestParams { status, .. }
            | Error::ServerResponse { status, .. }
            | Error::NullResult { status } => Some(*status),
            Error::Network(source) => source.status(),
            _ => None,
        }
    }

    /// Returns the raw response body if this error has one.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            Error::ConvertFailed { raw_response, .. }
            | Error::RequestParams { raw_response, .. }
            | Error::ServerResponse { raw_response, .. } => Some(raw_response),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        Error::Network(Arc::new(error))
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::Io(Arc::new(error))
    }
}

/// A specialized `Result` type for call dispatch.
pub type Result<T> = std::result::Result<T, Error>;
