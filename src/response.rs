//! Raw responses handed to converters, and transfer progress.
//!
//! [`RawResponse`] keeps the complete, undecoded response so that converters
//! can inspect the status and headers, and so that conversion failures can
//! report the exact body the server sent.

use http::{HeaderMap, StatusCode};
use std::time::Duration;

/// A received, not yet converted HTTP response.
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// The HTTP status code of the response.
    pub status: StatusCode,

    /// The response headers.
    pub headers: HeaderMap,

    /// The response body as text.
    pub body: String,

    /// Time from dispatch until the body was fully read.
    pub latency: Duration,
}

impl RawResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: String, latency: Duration) -> Self {
        Self {
            status,
            headers,
            body,
            latency,
        }
    }

    /// Returns a header value by name.
    ///
    /// # Examples
    ///
    /// ```
    /// # use netcall::RawResponse;
    /// # use http::{HeaderMap, HeaderValue, StatusCode};
    /// # use std::time::Duration;
    /// let mut headers = HeaderMap::new();
    /// headers.insert("content-type", HeaderValue::from_static("application/json"));
    ///
    /// let response = RawResponse::new(StatusCode::OK, headers, "{}".to_string(), Duration::ZERO);
    /// assert_eq!(response.header("content-type"), Some("application/json"));
    /// ```
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    /// Returns `true` if the body is empty or whitespace.
    pub fn is_empty(&self) -> bool {
        self.body.trim().is_empty()
    }
}

/// Bytes transferred so far for a streaming call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Bytes received so far.
    pub transferred: u64,
    /// Expected total, when the server sent a `Content-Length`.
    pub total: Option<u64>,
}

impl Progress {
    pub fn new(transferred: u64, total: Option<u64>) -> Self {
        Self { transferred, total }
    }

    /// Completed fraction in `0.0..=1.0`, if the total is known.
    pub fn fraction(&self) -> Option<f64> {
        match self.total {
            Some(0) => Some(1.0),
            Some(total) => Some((self.transferred as f64 / total as f64).min(1.0)),
            None => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.total, Some(total) if self.transferred >= total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_fraction() {
        assert_eq!(Progress::new(50, Some(200)).fraction(), Some(0.25));
        assert_eq!(Progress::new(0, Some(0)).fraction(), Some(1.0));
        assert_eq!(Progress::new(10, None).fraction(), None);
        assert!(Progress::new(200, Some(200)).is_finished());
        assert!(!Progress::new(10, None).is_finished());
    }

    #[test]
    fn test_empty_body() {
        let response = RawResponse::new(
            StatusCode::NO_CONTENT,
            HeaderMap::new(),
            "  \n".to_string(),
            Duration::ZERO,
        );
        assert!(response.is_empty());
    }
}
