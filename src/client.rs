//! The shared transport client.
//!
//! [`Client`] wraps a `reqwest::Client` together with the baseline every
//! call gets: a request deadline and default headers. Whatever
//! `reqwest::Client` the application supplies, converting it into a
//! [`Client`] re-applies that baseline, so it cannot be stripped by
//! replacing the client.

use crate::request::Request;
use crate::response::{Progress, RawResponse};
use crate::{Error, Result};
use http::header::{ACCEPT, USER_AGENT};
use http::{HeaderMap, HeaderName, HeaderValue};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use url::Url;

/// Default deadline for a whole call, body included.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default deadline for establishing a connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

const DEFAULT_USER_AGENT: &str = concat!("netcall/", env!("CARGO_PKG_VERSION"));

/// A configured transport client.
///
/// Cheap to clone; clones share the connection pool.
///
/// # Examples
///
/// ```
/// use netcall::Client;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), netcall::Error> {
/// let client = Client::builder()
///     .timeout(Duration::from_secs(10))
///     .default_header("X-Client", "mobile")?
///     .build()?;
/// assert_eq!(client.timeout(), Duration::from_secs(10));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http_client: reqwest::Client,
    default_headers: HeaderMap,
    timeout: Duration,
    /// Known only when the client was built by [`ClientBuilder`].
    connect_timeout: Option<Duration>,
}

impl Client {
    /// Creates a new `ClientBuilder` preloaded with library defaults.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    fn with_baseline(
        http_client: reqwest::Client,
        mut default_headers: HeaderMap,
        timeout: Duration,
        connect_timeout: Option<Duration>,
    ) -> Self {
        default_headers
            .entry(USER_AGENT)
            .or_insert(HeaderValue::from_static(DEFAULT_USER_AGENT));
        default_headers
            .entry(ACCEPT)
            .or_insert(HeaderValue::from_static("application/json"));

        Client {
            inner: Arc::new(ClientInner {
                http_client,
                default_headers,
                timeout,
                connect_timeout,
            }),
        }
    }

    /// Deadline applied to requests that do not set their own.
    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    /// Connection deadline, if this client was built with [`ClientBuilder`].
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.inner.connect_timeout
    }

    /// Headers sent with every request unless the request overrides them.
    pub fn default_headers(&self) -> &HeaderMap {
        &self.inner.default_headers
    }

    /// The wrapped `reqwest` client.
    pub fn http_client(&self) -> &reqwest::Client {
        &self.inner.http_client
    }

    /// Returns `true` if both handles refer to the same client.
    pub fn ptr_eq(a: &Client, b: &Client) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// Sends `request` to `url` and waits for the response head.
    pub(crate) async fn send(&self, request: &Request, url: Url) -> Result<reqwest::Response> {
        let timeout = request.timeout.unwrap_or(self.inner.timeout);

        let mut headers = self.inner.default_headers.clone();
        for (name, value) in &request.headers {
            headers.insert(name, value.clone());
        }

        tracing::debug!(
            method = %request.method,
            url = %url,
            timeout_ms = timeout.as_millis(),
            "Executing HTTP request"
        );

        let mut builder = self
            .inner
            .http_client
            .request(request.method.clone(), url)
            .headers(headers)
            .timeout(timeout);

        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        builder.send().await.map_err(|e| self.transport_error(e, timeout))
    }

    /// Reads the whole body, reporting progress after every chunk.
    pub(crate) async fn receive<F>(
        &self,
        mut response: reqwest::Response,
        request: &Request,
        started: Instant,
        mut on_progress: F,
    ) -> Result<RawResponse>
    where
        F: FnMut(Progress),
    {
        let timeout = request.timeout.unwrap_or(self.inner.timeout);
        let status = response.status();
        let headers = response.headers().clone();
        let total = response.content_length();

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| self.transport_error(e, timeout))?
        {
            body.extend_from_slice(&chunk);
            on_progress(Progress::new(body.len() as u64, total));
        }

        let latency = started.elapsed();
        tracing::info!(
            status = status.as_u16(),
            latency_ms = latency.as_millis(),
            bytes = body.len(),
            "Received HTTP response"
        );

        if status.is_client_error() {
            tracing::error!(
                status = status.as_u16(),
                raw_response = %String::from_utf8_lossy(&body),
                "Client error response"
            );
        } else if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), "Server error response");
        }

        Ok(RawResponse::new(
            status,
            headers,
            String::from_utf8_lossy(&body).into_owned(),
            latency,
        ))
    }

    /// Streams the body into `file`, reporting progress after every chunk.
    /// The returned [`RawResponse`] has an empty body.
    pub(crate) async fn receive_into<F>(
        &self,
        mut response: reqwest::Response,
        request: &Request,
        file: &mut tokio::fs::File,
        started: Instant,
        mut on_progress: F,
    ) -> Result<RawResponse>
    where
        F: FnMut(Progress),
    {
        let timeout = request.timeout.unwrap_or(self.inner.timeout);
        let status = response.status();
        let headers = response.headers().clone();
        let total = response.content_length();

        let mut transferred = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| self.transport_error(e, timeout))?
        {
            file.write_all(&chunk).await.map_err(download_error)?;
            transferred += chunk.len() as u64;
            on_progress(Progress::new(transferred, total));
        }
        file.flush().await.map_err(download_error)?;

        let latency = started.elapsed();
        tracing::info!(
            status = status.as_u16(),
            latency_ms = latency.as_millis(),
            bytes = transferred,
            "Downloaded HTTP response"
        );

        Ok(RawResponse::new(status, headers, String::new(), latency))
    }

    fn transport_error(&self, error: reqwest::Error, timeout: Duration) -> Error {
        if error.is_timeout() {
            Error::Timeout {
                detail: timeout_detail(error.is_connect(), timeout, self.inner.connect_timeout),
            }
        } else {
            Error::from(error)
        }
    }
}

impl From<reqwest::Client> for Client {
    /// Wraps an application supplied client with the library baseline.
    fn from(http_client: reqwest::Client) -> Self {
        Client::with_baseline(http_client, HeaderMap::new(), DEFAULT_TIMEOUT, None)
    }
}

impl Default for Client {
    fn default() -> Self {
        Client::from(reqwest::Client::new())
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("default_headers", &self.inner.default_headers)
            .field("timeout", &self.inner.timeout)
            .field("connect_timeout", &self.inner.connect_timeout)
            .finish_non_exhaustive()
    }
}

/// The deadline that expired: the connect timeout while connecting, the
/// request deadline otherwise.
fn timeout_detail(
    connecting: bool,
    timeout: Duration,
    connect_timeout: Option<Duration>,
) -> String {
    match connect_timeout {
        Some(connect_timeout) if connecting => format!("{:?}", connect_timeout),
        _ => format!("{:?}", timeout),
    }
}

pub(crate) fn download_error(error: std::io::Error) -> Error {
    Error::Download {
        message: error.to_string(),
    }
}

/// Builder for configuring and creating a [`Client`].
///
/// Starts from the library defaults ([`DEFAULT_TIMEOUT`],
/// [`DEFAULT_CONNECT_TIMEOUT`], a `netcall` user agent); anything not exposed
/// here can be set on the underlying `reqwest::ClientBuilder` through
/// [`ClientBuilder::configure_http`].
///
/// # Examples
///
/// ```
/// use netcall::ClientBuilder;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), netcall::Error> {
/// let client = ClientBuilder::new()
///     .connect_timeout(Duration::from_secs(5))
///     .configure_http(|http| http.pool_max_idle_per_host(4))
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    default_headers: HeaderMap,
    timeout: Duration,
    connect_timeout: Duration,
    http: Option<Box<dyn FnOnce(reqwest::ClientBuilder) -> reqwest::ClientBuilder + Send>>,
}

impl ClientBuilder {
    /// Creates a new `ClientBuilder` with default settings.
    pub fn new() -> Self {
        Self {
            default_headers: HeaderMap::new(),
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            http: None,
        }
    }

    /// Adds a default header that will be included in all requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn default_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| Error::ConfigurationError(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| Error::ConfigurationError(format!("Invalid header value: {}", e)))?;
        self.default_headers.insert(name, value);
        Ok(self)
    }

    /// Sets the deadline for a whole call.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the deadline for establishing a connection.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Applies `configure` to the underlying `reqwest::ClientBuilder`.
    ///
    /// Runs after the library defaults, so it may override them. Calling
    /// this again replaces the previous step.
    pub fn configure_http<F>(mut self, configure: F) -> Self
    where
        F: FnOnce(reqwest::ClientBuilder) -> reqwest::ClientBuilder + Send + 'static,
    {
        self.http = Some(Box::new(configure));
        self
    }

    /// Builds the configured `Client`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying `reqwest` client cannot be built
    /// (for instance if the TLS backend fails to initialize).
    pub fn build(self) -> Result<Client> {
        let mut http = reqwest::Client::builder().connect_timeout(self.connect_timeout);
        if let Some(configure) = self.http {
            http = configure(http);
        }

        let http_client = http.build().map_err(|e| {
            Error::ConfigurationError(format!("Failed to build HTTP client: {}", e))
        })?;

        Ok(Client::with_baseline(
            http_client,
            self.default_headers,
            self.timeout,
            Some(self.connect_timeout),
        ))
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("default_headers", &self.default_headers)
            .field("timeout", &self.timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("http", &self.http.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrapped_client_gets_baseline() {
        let client = Client::from(reqwest::Client::new());
        assert_eq!(client.timeout(), DEFAULT_TIMEOUT);
        assert!(client.default_headers().contains_key(USER_AGENT));
        assert_eq!(
            client.default_headers().get(ACCEPT).unwrap(),
            "application/json"
        );
    }

    #[test]
    fn test_builder_keeps_custom_user_agent() {
        let client = Client::builder()
            .default_header("User-Agent", "my-app/1.0")
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(
            client.default_headers().get(USER_AGENT).unwrap(),
            "my-app/1.0"
        );
    }

    #[test]
    fn test_timeout_detail_is_readable() {
        assert_eq!(timeout_detail(false, Duration::from_secs(30), None), "30s");
        assert_eq!(timeout_detail(false, Duration::from_millis(50), None), "50ms");
    }

    #[test]
    fn test_connect_phase_timeout_reports_connect_deadline() {
        let request = Duration::from_secs(30);
        let connect = Some(Duration::from_secs(15));

        assert_eq!(timeout_detail(true, request, connect), "15s");
        assert_eq!(timeout_detail(false, request, connect), "30s");
        // Wrapped clients do not expose their connect timeout.
        assert_eq!(timeout_detail(true, request, None), "30s");
    }

    #[test]
    fn test_builder_records_connect_timeout() {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        assert_eq!(client.connect_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(Client::default().connect_timeout(), None);
    }

    #[test]
    fn test_clones_share_identity() {
        let a = Client::default();
        let b = a.clone();
        assert!(Client::ptr_eq(&a, &b));
        assert!(!Client::ptr_eq(&a, &Client::default()));
    }
}
