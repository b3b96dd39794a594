//! Request description and the request interceptor hook.

use crate::call::GroupTag;
use crate::handler::ErrorHandler;
use crate::{Error, Result};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// A single HTTP request to dispatch.
///
/// `path` is either an absolute URL or a path resolved against the
/// registry's default host.
///
/// # Examples
///
/// ```
/// use netcall::Request;
/// use std::time::Duration;
///
/// let request = Request::get("/users")
///     .with_query_param("page", "2")
///     .with_group("user-list")
///     .with_timeout(Duration::from_secs(5));
///
/// assert_eq!(request.group.as_ref().map(|g| g.as_str()), Some("user-list"));
/// ```
#[derive(Clone)]
pub struct Request {
    /// The HTTP method (GET, POST, etc.).
    pub method: Method,

    /// Absolute URL, or path relative to the default host.
    pub path: String,

    /// Additional headers for this request.
    pub headers: HeaderMap,

    /// Query parameters for this request.
    pub query_params: HashMap<String, String>,

    /// JSON body, if any.
    pub body: Option<serde_json::Value>,

    /// Cancellation group. A unique group is assigned when `None`.
    pub group: Option<GroupTag>,

    /// Overrides the client's request timeout.
    pub timeout: Option<Duration>,

    /// Handles this request's errors instead of the global handler.
    pub error_handler: Option<Arc<dyn ErrorHandler>>,
}

impl Request {
    /// Creates a new `Request` with the given method and path.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            query_params: HashMap::new(),
            body: None,
            group: None,
            timeout: None,
            error_handler: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Adds a header to the request.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| Error::ConfigurationError(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| Error::ConfigurationError(format!("Invalid header value: {}", e)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Adds a query parameter to the request.
    pub fn with_query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.insert(key.into(), value.into());
        self
    }

    /// Adds multiple query parameters to the request.
    pub fn with_query_params(mut self, params: impl IntoIterator<Item = (String, String)>) -> Self {
        self.query_params.extend(params);
        self
    }

    /// Serializes `body` as the JSON request body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SerializationFailed`] if `body` cannot be represented as JSON.
    pub fn with_json<B: Serialize>(mut self, body: &B) -> Result<Self> {
        let json =
            serde_json::to_value(body).map_err(|e| Error::SerializationFailed(e.to_string()))?;
        self.body = Some(json);
        Ok(self)
    }

    pub fn with_group(mut self, group: impl Into<GroupTag>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_error_handler(mut self, handler: Arc<dyn ErrorHandler>) -> Self {
        self.error_handler = Some(handler);
        self
    }

    /// Builds the final URL, resolving relative paths against `host`.
    ///
    /// A path prefix on `host` is kept: `/users` against
    /// `https://api.example.com/v1` resolves to `https://api.example.com/v1/users`.
    pub(crate) fn resolve_url(&self, host: &str) -> Result<Url> {
        let mut url = match Url::parse(&self.path) {
            Ok(absolute) => absolute,
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let mut base = Url::parse(host)?;
                if !base.path().ends_with('/') {
                    let prefix = format!("{}/", base.path());
                    base.set_path(&prefix);
                }
                base.join(self.path.trim_start_matches('/'))?
            }
            Err(e) => return Err(e.into()),
        };

        if !self.query_params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.query_params {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("headers", &self.headers)
            .field("query_params", &self.query_params)
            .field("body", &self.body)
            .field("group", &self.group)
            .field("timeout", &self.timeout)
            .field("error_handler", &self.error_handler.is_some())
            .finish()
    }
}

/// Rewrites every outgoing request before it is sent.
///
/// Typical uses are global headers (auth tokens, client version) and global
/// query parameters.
///
/// # Examples
///
/// ```
/// use netcall::{Request, RequestInterceptor};
///
/// struct ClientVersion;
///
/// impl RequestInterceptor for ClientVersion {
///     fn intercept(&self, request: &mut Request) {
///         request
///             .query_params
///             .insert("client".to_string(), "1.4.0".to_string());
///     }
/// }
/// ```
pub trait RequestInterceptor: Send + Sync {
    fn intercept(&self, request: &mut Request);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_path_joins_host() {
        let url = Request::get("/users/7")
            .resolve_url("https://api.example.com")
            .unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/users/7");
    }

    #[test]
    fn test_host_path_prefix_is_kept() {
        let url = Request::get("/users")
            .resolve_url("http://127.0.0.1:9/v1")
            .unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:9/v1/users");

        let url = Request::get("users/7")
            .resolve_url("https://api.example.com/api/v2/")
            .unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/api/v2/users/7");
    }

    #[test]
    fn test_absolute_path_ignores_host() {
        let url = Request::get("https://other.example.com/ping")
            .resolve_url("https://api.example.com")
            .unwrap();
        assert_eq!(url.host_str(), Some("other.example.com"));
    }

    #[test]
    fn test_relative_path_without_host_is_invalid() {
        let err = Request::get("/users").resolve_url("").unwrap_err();
        assert!(matches!(err, Error::InvalidUrl(_)));
    }

    #[test]
    fn test_query_params_are_appended() {
        let url = Request::get("/search")
            .with_query_param("q", "rust lang")
            .resolve_url("https://api.example.com")
            .unwrap();
        assert_eq!(url.query(), Some("q=rust+lang"));
    }

    #[test]
    fn test_invalid_header_is_rejected() {
        let err = Request::get("/").with_header("bad header", "x").unwrap_err();
        assert!(matches!(err, Error::ConfigurationError(_)));
    }

    #[test]
    fn test_with_json() {
        #[derive(Serialize)]
        struct NewUser {
            name: &'static str,
        }

        let request = Request::post("/users")
            .with_json(&NewUser { name: "Alice" })
            .unwrap();
        assert_eq!(request.body, Some(serde_json::json!({ "name": "Alice" })));
    }
}
