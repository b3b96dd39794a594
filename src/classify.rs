//! Reduction of raised failures to a stable error taxonomy.
//!
//! [`classify`] is total and side-effect free: every [`Error`] maps to exactly
//! one [`ErrorKind`], with [`ErrorKind::Other`] as the catch-all. Failures
//! that wrap foreign errors (`reqwest`, `std::io`) are inspected by ordered
//! rule lists where the most specific rule comes first, so a DNS failure is
//! never reported as a plain connect failure even though `reqwest` flags it as
//! both.

use crate::Error;
use http::StatusCode;
use std::error::Error as StdError;
use std::io;

/// The classified category of a failed call.
///
/// This is what error handlers and UI collaborators consume. Each kind has a
/// distinct user-facing resolution message, see [`ErrorKind::message`].
#[derive(thiserror::Error, Debug, Clone)]
pub enum ErrorKind {
    /// The host name could not be resolved.
    #[error("host resolution failed")]
    HostResolution,

    /// The request URL could not be built from the host and path.
    #[error("malformed request URL")]
    UrlParse,

    /// The server was resolved but the connection was refused or dropped.
    #[error("connection failed")]
    Connect,

    /// Carries the description of the exceeded deadline.
    #[error("timed out after {0}")]
    Timeout(String),

    /// Writing a downloaded body to disk failed.
    #[error("download failed")]
    Download,

    /// The body arrived but could not be decoded into the expected type.
    #[error("response conversion failed")]
    Convert,

    /// A 4xx status.
    #[error("request rejected")]
    RequestParams,

    /// A 5xx status.
    #[error("server error {status}")]
    ServerResponse {
        /// The status code returned.
        status: StatusCode,
        /// The raw body, or the status reason when no body was read.
        message: String,
    },

    /// A successful response with a null or empty body where a value was
    /// expected.
    #[error("empty result")]
    NullResult,

    /// A cache-only request found nothing cached.
    #[error("no cached response")]
    NoCache,

    /// A well-formed response reporting an application-level failure.
    #[error("response failed: {0}")]
    Response(String),

    /// The call was cancelled. Never reported as an error to the user.
    #[error("cancelled")]
    Cancelled,

    /// Anything unrecognized. The original failure is kept intact.
    #[error("unexpected failure: {0}")]
    Other(#[source] Error),
}

impl ErrorKind {
    /// Returns `true` for [`ErrorKind::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ErrorKind::Cancelled)
    }

    /// The message shown to a user for this kind of failure.
    pub fn message(&self) -> String {
        match self {
            ErrorKind::HostResolution => {
                "The server could not be found. Check your network connection.".to_string()
            }
            ErrorKind::UrlParse => "The request address is invalid.".to_string(),
            ErrorKind::Connect => "Unable to connect to the network.".to_string(),
            ErrorKind::Timeout(detail) => format!("The request timed out ({detail})."),
            ErrorKind::Download => "The download failed.".to_string(),
            ErrorKind::Convert => "The response could not be read.".to_string(),
            ErrorKind::RequestParams => "The request was rejected.".to_string(),
            ErrorKind::ServerResponse { .. } => "The server encountered an error.".to_string(),
            ErrorKind::NullResult => "The server returned no data.".to_string(),
            ErrorKind::NoCache => "No cached data is available.".to_string(),
            ErrorKind::Response(message) => message.clone(),
            ErrorKind::Cancelled => "The request was cancelled.".to_string(),
            ErrorKind::Other(_) => "An unexpected network error occurred.".to_string(),
        }
    }
}

/// Classifies a raised failure.
///
/// # Examples
///
/// ```
/// use netcall::{classify, Error, ErrorKind};
///
/// let err = Error::UnknownHost { host: "api.example.com".to_string() };
/// assert!(matches!(classify(&err), ErrorKind::HostResolution));
///
/// let err = Error::Cancelled;
/// assert!(classify(&err).is_cancelled());
/// ```
pub fn classify(failure: &Error) -> ErrorKind {
    let kind = match failure {
        Error::Cancelled => Some(ErrorKind::Cancelled),
        Error::Timeout { detail } => Some(ErrorKind::Timeout(detail.clone())),
        Error::UnknownHost { .. } => Some(ErrorKind::HostResolution),
        Error::InvalidUrl(_) => Some(ErrorKind::UrlParse),
        Error::Connect(_) => Some(ErrorKind::Connect),
        Error::Download { .. } => Some(ErrorKind::Download),
        Error::ConvertFailed { .. } | Error::SerializationFailed(_) => Some(ErrorKind::Convert),
        Error::RequestParams { .. } => Some(ErrorKind::RequestParams),
        Error::ServerResponse {
            status,
            raw_response,
        } => Some(ErrorKind::ServerResponse {
            status: *status,
            message: raw_response.clone(),
        }),
        Error::Response { message } => Some(ErrorKind::Response(message.clone())),
        Error::NullResult { .. } => Some(ErrorKind::NullResult),
        Error::NoCache(_) => Some(ErrorKind::NoCache),
        Error::Network(source) => first_match(REQWEST_RULES, &**source),
        Error::Io(source) => first_match(IO_RULES, &**source),
        Error::ConfigurationError(_) | Error::Other(_) => None,
    };

    kind.unwrap_or_else(|| ErrorKind::Other(failure.clone()))
}

fn first_match<E>(rules: &[fn(&E) -> Option<ErrorKind>], error: &E) -> Option<ErrorKind> {
    rules.iter().find_map(|rule| rule(error))
}

// Order matters: `reqwest` flags DNS failures as connect errors too.
const REQWEST_RULES: &[fn(&reqwest::Error) -> Option<ErrorKind>] = &[
    reqwest_timeout,
    reqwest_lookup,
    reqwest_connect,
    reqwest_url,
    reqwest_status,
    reqwest_decode,
    reqwest_body,
];

const IO_RULES: &[fn(&io::Error) -> Option<ErrorKind>] =
    &[io_timeout, io_lookup, io_connect, io_invalid_data];

fn reqwest_timeout(e: &reqwest::Error) -> Option<ErrorKind> {
    e.is_timeout().then(|| ErrorKind::Timeout(e.to_string()))
}

fn reqwest_lookup(e: &reqwest::Error) -> Option<ErrorKind> {
    (e.is_connect() && mentions_lookup(e)).then_some(ErrorKind::HostResolution)
}

fn reqwest_connect(e: &reqwest::Error) -> Option<ErrorKind> {
    e.is_connect().then_some(ErrorKind::Connect)
}

fn reqwest_url(e: &reqwest::Error) -> Option<ErrorKind> {
    chain_contains::<url::ParseError>(e).then_some(ErrorKind::UrlParse)
}

fn reqwest_status(e: &reqwest::Error) -> Option<ErrorKind> {
    let status = e.status()?;
    if status.is_client_error() {
        Some(ErrorKind::RequestParams)
    } else if status.is_server_error() {
        Some(ErrorKind::ServerResponse {
            status,
            message: status.canonical_reason().unwrap_or_default().to_string(),
        })
    } else {
        None
    }
}

fn reqwest_decode(e: &reqwest::Error) -> Option<ErrorKind> {
    e.is_decode().then_some(ErrorKind::Convert)
}

fn reqwest_body(e: &reqwest::Error) -> Option<ErrorKind> {
    e.is_body().then_some(ErrorKind::Download)
}

fn io_timeout(e: &io::Error) -> Option<ErrorKind> {
    (e.kind() == io::ErrorKind::TimedOut)
        .then(|| ErrorKind::Timeout(timeout_detail(&e.to_string())))
}

fn io_lookup(e: &io::Error) -> Option<ErrorKind> {
    mentions_lookup(e).then_some(ErrorKind::HostResolution)
}

fn io_connect(e: &io::Error) -> Option<ErrorKind> {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::AddrNotAvailable
    )
    .then_some(ErrorKind::Connect)
}

fn io_invalid_data(e: &io::Error) -> Option<ErrorKind> {
    (e.kind() == io::ErrorKind::InvalidData).then_some(ErrorKind::Convert)
}

/// Extracts the deadline from messages such as `"read timed out after 30s"`.
fn timeout_detail(message: &str) -> String {
    match message.rsplit_once("after ") {
        Some((_, detail)) if !detail.trim().is_empty() => detail.trim().to_string(),
        _ => message.to_string(),
    }
}

const LOOKUP_MARKERS: &[&str] = &[
    "dns error",
    "failed to lookup address",
    "name or service not known",
    "nodename nor servname",
    "no such host",
    "host unresolved",
    "temporary failure in name resolution",
];

fn mentions_lookup(error: &(dyn StdError + 'static)) -> bool {
    source_chain(error).any(|cause| {
        let text = cause.to_string().to_lowercase();
        LOOKUP_MARKERS.iter().any(|marker| text.contains(marker))
    })
}

fn chain_contains<T: StdError + 'static>(error: &(dyn StdError + 'static)) -> bool {
    source_chain(error).any(|cause| cause.is::<T>())
}

fn source_chain<'a>(
    error: &'a (dyn StdError + 'static),
) -> impl Iterator<Item = &'a (dyn StdError + 'static)> {
    std::iter::successors(Some(error), |&cause| cause.source())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_resolution_wins_over_connect() {
        let err = Error::from(io::Error::new(
            io::ErrorKind::ConnectionRefused,
            "host unresolved: api.example.com",
        ));
        assert!(matches!(classify(&err), ErrorKind::HostResolution));

        let err = Error::UnknownHost {
            host: "api.example.com".to_string(),
        };
        assert!(matches!(classify(&err), ErrorKind::HostResolution));
    }

    #[derive(Debug)]
    struct Handshake(io::Error);

    impl std::fmt::Display for Handshake {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("handshake aborted")
        }
    }

    impl StdError for Handshake {
        fn source(&self) -> Option<&(dyn StdError + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn test_lookup_failure_found_deeper_in_source_chain() {
        let cause = io::Error::other("failed to lookup address information");
        let err = Error::from(io::Error::new(
            io::ErrorKind::ConnectionRefused,
            Handshake(cause),
        ));

        assert!(!err.to_string().contains("lookup"));
        assert!(matches!(classify(&err), ErrorKind::HostResolution));
    }

    #[test]
    fn test_read_timeout_keeps_detail() {
        let err = Error::from(io::Error::new(
            io::ErrorKind::TimedOut,
            "read timed out after 30s",
        ));
        match classify(&err) {
            ErrorKind::Timeout(detail) => assert_eq!(detail, "30s"),
            other => panic!("Expected Timeout, got {:?}", other),
        }
    }

    #[test]
    fn test_timeout_without_deadline_keeps_message() {
        let err = Error::from(io::Error::new(io::ErrorKind::TimedOut, "deadline elapsed"));
        match classify(&err) {
            ErrorKind::Timeout(detail) => assert_eq!(detail, "deadline elapsed"),
            other => panic!("Expected Timeout, got {:?}", other),
        }
    }

    #[test]
    fn test_connection_refused() {
        let err = Error::from(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
        assert!(matches!(classify(&err), ErrorKind::Connect));
    }

    #[test]
    fn test_response_variants() {
        let err = Error::ServerResponse {
            status: StatusCode::BAD_GATEWAY,
            raw_response: "upstream down".to_string(),
        };
        match classify(&err) {
            ErrorKind::ServerResponse { status, message } => {
                assert_eq!(status, StatusCode::BAD_GATEWAY);
                assert_eq!(message, "upstream down");
            }
            other => panic!("Expected ServerResponse, got {:?}", other),
        }

        let err = Error::RequestParams {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            raw_response: String::new(),
        };
        assert!(matches!(classify(&err), ErrorKind::RequestParams));

        let err = Error::Response {
            message: "quota exhausted".to_string(),
        };
        assert!(matches!(classify(&err), ErrorKind::Response(m) if m == "quota exhausted"));

        let err = Error::NullResult {
            status: StatusCode::OK,
        };
        assert!(matches!(classify(&err), ErrorKind::NullResult));
    }

    #[test]
    fn test_unrecognized_failure_keeps_cause() {
        let err = Error::from(io::Error::new(io::ErrorKind::PermissionDenied, "nope"));
        match classify(&err) {
            ErrorKind::Other(Error::Io(source)) => {
                assert_eq!(source.kind(), io::ErrorKind::PermissionDenied);
            }
            other => panic!("Expected Other(Io), got {:?}", other),
        }

        let err = Error::ConfigurationError("bad header".to_string());
        assert!(matches!(
            classify(&err),
            ErrorKind::Other(Error::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_classification_is_deterministic() {
        let failures = vec![
            Error::Cancelled,
            Error::Connect("reset".to_string()),
            Error::InvalidUrl(url::ParseError::RelativeUrlWithoutBase),
            Error::Download {
                message: "disk full".to_string(),
            },
            Error::NoCache("GET /users".to_string()),
            Error::SerializationFailed("key must be a string".to_string()),
        ];

        for failure in &failures {
            let first = classify(failure).to_string();
            let second = classify(failure).to_string();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_cancellation_is_distinct() {
        assert!(classify(&Error::Cancelled).is_cancelled());
        assert!(!classify(&Error::Connect(String::new())).is_cancelled());
    }

    #[test]
    fn test_messages_are_distinct() {
        let kinds = vec![
            ErrorKind::HostResolution,
            ErrorKind::UrlParse,
            ErrorKind::Connect,
            ErrorKind::Timeout("1s".to_string()),
            ErrorKind::Download,
            ErrorKind::Convert,
            ErrorKind::RequestParams,
            ErrorKind::ServerResponse {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: String::new(),
            },
            ErrorKind::NullResult,
            ErrorKind::NoCache,
            ErrorKind::Cancelled,
            ErrorKind::Other(Error::Cancelled),
        ];
        let mut messages: Vec<String> = kinds.iter().map(ErrorKind::message).collect();
        messages.sort();
        messages.dedup();
        assert_eq!(messages.len(), kinds.len());
    }
}
