//! Process-wide configuration and call dispatch.
//!
//! A [`Registry`] owns the settings every call is dispatched with (shared
//! client, default host, converter, handlers) and the [`Ledger`] of calls in
//! flight. Settings live in an immutable snapshot behind an [`ArcSwap`]:
//! readers load the current snapshot without locking, setters publish a
//! modified copy. A call keeps the snapshot it was dispatched with.
//!
//! Most applications use the process-wide instance, [`Registry::global`],
//! through the crate level functions. Separate instances are useful in tests.

use crate::call::{Call, CallId, GroupTag};
use crate::classify::ErrorKind;
use crate::client::{download_error, Client};
use crate::convert::{decode, Converter, JsonConverter};
use crate::dialog::{DialogFactory, NoopDialogFactory};
use crate::handler::{DefaultErrorHandler, ErrorHandler};
use crate::ledger::Ledger;
use crate::lifecycle::{Callback, Event, Lifecycle};
use crate::request::{Request, RequestInterceptor};
use crate::response::Progress;
use crate::{Error, Result};
use arc_swap::ArcSwap;
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::sync::oneshot;

static GLOBAL: Lazy<Registry> = Lazy::new(Registry::new);

#[derive(Clone)]
struct Settings {
    client: Client,
    host: String,
    log_enabled: bool,
    interceptor: Option<Arc<dyn RequestInterceptor>>,
    converter: Arc<dyn Converter>,
    error_handler: Arc<dyn ErrorHandler>,
    dialog_factory: Arc<dyn DialogFactory>,
}

impl Default for Settings {
    fn default() -> Self {
        let client = Client::builder().build().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Falling back to a plain HTTP client");
            Client::default()
        });

        Self {
            client,
            host: String::new(),
            log_enabled: true,
            interceptor: None,
            converter: Arc::new(JsonConverter),
            error_handler: Arc::new(DefaultErrorHandler),
            dialog_factory: Arc::new(NoopDialogFactory),
        }
    }
}

/// Shared configuration plus the ledger of running calls.
///
/// Cheap to clone; clones share state.
///
/// # Examples
///
/// ```no_run
/// use netcall::{Registry, Request};
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct User {
///     name: String,
/// }
///
/// # async fn example() -> Result<(), netcall::Error> {
/// let registry = Registry::global();
/// registry.initialize("https://api.example.com", |http| http.tcp_nodelay(true))?;
///
/// registry.enqueue::<User, _>(
///     Request::get("/users/1").with_group("profile"),
///     |user: User| println!("hello {}", user.name),
/// );
///
/// // Leaving the screen:
/// registry.cancel_group(&"profile".into());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    settings: ArcSwap<Settings>,
    ledger: Ledger,
}

impl Registry {
    /// Creates a registry holding the library defaults.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                settings: ArcSwap::from_pointee(Settings::default()),
                ledger: Ledger::new(),
            }),
        }
    }

    /// The process-wide registry.
    pub fn global() -> &'static Registry {
        &GLOBAL
    }

    /// Sets the default host and rebuilds the shared client.
    ///
    /// `configure` receives a `reqwest::ClientBuilder` already carrying the
    /// library defaults and may adjust it freely.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigurationError`] if the client cannot be built.
    /// The previous client and host stay in place.
    pub fn initialize<F>(&self, host: impl Into<String>, configure: F) -> Result<()>
    where
        F: FnOnce(reqwest::ClientBuilder) -> reqwest::ClientBuilder + Send + 'static,
    {
        let host = host.into();
        let client = Client::builder().configure_http(configure).build()?;

        tracing::info!(host = %host, "Registry initialized");
        self.update(|settings| {
            settings.host = host.clone();
            settings.client = client.clone();
        });
        Ok(())
    }

    pub fn client(&self) -> Client {
        self.inner.settings.load().client.clone()
    }

    /// Replaces the shared client. A bare `reqwest::Client` is wrapped with
    /// the library baseline first.
    pub fn set_client(&self, client: impl Into<Client>) {
        let client = client.into();
        self.update(|settings| settings.client = client.clone());
    }

    pub fn host(&self) -> String {
        self.inner.settings.load().host.clone()
    }

    pub fn set_host(&self, host: impl Into<String>) {
        let host = host.into();
        self.update(|settings| settings.host = host.clone());
    }

    /// Whether failures are logged as they are classified.
    pub fn log_enabled(&self) -> bool {
        self.inner.settings.load().log_enabled
    }

    pub fn set_log_enabled(&self, enabled: bool) {
        self.update(|settings| settings.log_enabled = enabled);
    }

    pub fn interceptor(&self) -> Option<Arc<dyn RequestInterceptor>> {
        self.inner.settings.load().interceptor.clone()
    }

    /// Installs `interceptor`, or removes the current one with `None`.
    pub fn set_interceptor(&self, interceptor: Option<Arc<dyn RequestInterceptor>>) {
        self.update(|settings| settings.interceptor = interceptor.clone());
    }

    pub fn converter(&self) -> Arc<dyn Converter> {
        Arc::clone(&self.inner.settings.load().converter)
    }

    pub fn set_converter(&self, converter: Arc<dyn Converter>) {
        self.update(|settings| settings.converter = Arc::clone(&converter));
    }

    /// The handler used by calls without a per-request override.
    pub fn error_handler(&self) -> Arc<dyn ErrorHandler> {
        Arc::clone(&self.inner.settings.load().error_handler)
    }

    pub fn set_error_handler(&self, handler: Arc<dyn ErrorHandler>) {
        self.update(|settings| settings.error_handler = Arc::clone(&handler));
    }

    pub fn dialog_factory(&self) -> Arc<dyn DialogFactory> {
        Arc::clone(&self.inner.settings.load().dialog_factory)
    }

    pub fn set_dialog_factory(&self, factory: Arc<dyn DialogFactory>) {
        self.update(|settings| settings.dialog_factory = Arc::clone(&factory));
    }

    pub fn ledger(&self) -> &Ledger {
        &self.inner.ledger
    }

    /// Cancels every live call in `group`. Returns how many were cancelled.
    pub fn cancel_group(&self, group: &GroupTag) -> usize {
        self.inner.ledger.cancel_group(group)
    }

    pub fn cancel_all(&self) -> usize {
        self.inner.ledger.cancel_all()
    }

    pub fn cancel_id(&self, id: CallId) -> bool {
        self.inner.ledger.cancel_id(id)
    }

    /// Dispatches `request` and reports the decoded response to `callback`.
    ///
    /// `on_start` runs before this returns; the remaining stages run on a
    /// Tokio worker. The returned [`Call`] can be cancelled directly or
    /// through its group.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn enqueue<T, C>(&self, request: Request, callback: C) -> Call
    where
        T: DeserializeOwned + Send + 'static,
        C: Callback<T> + 'static,
    {
        self.dispatch(request, callback, |settings, request, lifecycle| async move {
            execute(&settings, &request, |progress| {
                lifecycle.handle_event(Event::Progress(progress));
            })
            .await
        })
    }

    /// Dispatches `request` and waits for the decoded response.
    ///
    /// Runs through the same lifecycle as [`Registry::enqueue`], so the
    /// error handler still sees the failure. Dropping the returned future
    /// cancels the call.
    pub async fn fetch<T>(&self, request: Request) -> std::result::Result<T, ErrorKind>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        let call = self.enqueue(request, Reply::new(sender));
        let _guard = call.drop_guard();

        receiver.await.unwrap_or(Err(ErrorKind::Cancelled))
    }

    /// Streams the response body of `request` into the file at `path`.
    ///
    /// `callback` receives progress per chunk and the path on success.
    /// File system errors are reported as [`Error::Download`]; a cancelled
    /// download may leave a partial file behind.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn download<C>(&self, request: Request, path: impl Into<PathBuf>, callback: C) -> Call
    where
        C: Callback<PathBuf> + 'static,
    {
        let path = path.into();
        self.dispatch(request, callback, |settings, request, lifecycle| async move {
            save(&settings, &request, path, |progress| {
                lifecycle.handle_event(Event::Progress(progress));
            })
            .await
        })
    }

    fn dispatch<T, C, F, Fut>(&self, mut request: Request, callback: C, work: F) -> Call
    where
        T: Send + 'static,
        C: Callback<T> + 'static,
        F: FnOnce(Arc<Settings>, Request, Arc<Lifecycle<T, C>>) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let settings = self.inner.settings.load_full();
        if let Some(interceptor) = &settings.interceptor {
            interceptor.intercept(&mut request);
        }

        let group = request.group.clone().unwrap_or_else(GroupTag::unique);
        let call = Call::new(group);
        let lifecycle = Arc::new(
            Lifecycle::new(call.clone(), callback, self)
                .with_error_handler(request.error_handler.clone()),
        );
        lifecycle.handle_event(Event::Start);

        let work = work(settings, request, Arc::clone(&lifecycle));
        tokio::spawn(async move {
            let outcome = tokio::select! {
                biased;
                _ = lifecycle.call().cancelled() => Err(Error::Cancelled),
                outcome = work => outcome,
            };
            let event = match outcome {
                Ok(value) => Event::Success(value),
                Err(failure) => Event::Failure(failure),
            };
            lifecycle.handle_event(event);
        });

        call
    }

    fn update<F>(&self, apply: F)
    where
        F: Fn(&mut Settings),
    {
        self.inner.settings.rcu(|current| {
            let mut next = Settings::clone(current);
            apply(&mut next);
            next
        });
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let settings = self.inner.settings.load();
        f.debug_struct("Registry")
            .field("host", &settings.host)
            .field("client", &settings.client)
            .field("log_enabled", &settings.log_enabled)
            .field("interceptor", &settings.interceptor.is_some())
            .field("ledger", &self.inner.ledger)
            .finish_non_exhaustive()
    }
}

async fn execute<T, F>(settings: &Settings, request: &Request, on_progress: F) -> Result<T>
where
    T: DeserializeOwned,
    F: FnMut(Progress),
{
    let url = request.resolve_url(&settings.host)?;
    let started = Instant::now();

    let response = settings.client.send(request, url).await?;
    let raw = settings
        .client
        .receive(response, request, started, on_progress)
        .await?;

    decode(settings.converter.as_ref(), &raw)
}

async fn save<F>(
    settings: &Settings,
    request: &Request,
    path: PathBuf,
    on_progress: F,
) -> Result<PathBuf>
where
    F: FnMut(Progress),
{
    let url = request.resolve_url(&settings.host)?;
    let started = Instant::now();
    let response = settings.client.send(request, url).await?;

    if !response.status().is_success() {
        let raw = settings
            .client
            .receive(response, request, started, |_| {})
            .await?;
        settings.converter.convert(&raw)?;
        return Err(Error::Download {
            message: format!("unexpected status {}", raw.status),
        });
    }

    let mut file = tokio::fs::File::create(&path)
        .await
        .map_err(download_error)?;
    settings
        .client
        .receive_into(response, request, &mut file, started, on_progress)
        .await?;

    tracing::debug!(path = %path.display(), "Download saved");
    Ok(path)
}

/// Forwards the outcome of a call to a waiting [`Registry::fetch`] once the
/// call has completed.
struct Reply<T> {
    sender: Mutex<Option<oneshot::Sender<std::result::Result<T, ErrorKind>>>>,
    value: Mutex<Option<T>>,
}

impl<T> Reply<T> {
    fn new(sender: oneshot::Sender<std::result::Result<T, ErrorKind>>) -> Self {
        Self {
            sender: Mutex::new(Some(sender)),
            value: Mutex::new(None),
        }
    }
}

impl<T: Send> Callback<T> for Reply<T> {
    fn on_success(&self, value: T) {
        *self.value.lock().unwrap_or_else(PoisonError::into_inner) = Some(value);
    }

    fn on_complete(&self, error: Option<&ErrorKind>) {
        let value = self.value.lock().unwrap_or_else(PoisonError::into_inner).take();
        let outcome = match (error, value) {
            (Some(kind), _) => Err(kind.clone()),
            (None, Some(value)) => Ok(value),
            (None, None) => Err(ErrorKind::Cancelled),
        };

        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(sender) = sender {
            // The caller may have stopped waiting.
            let _ = sender.send(outcome);
        }
    }
}
