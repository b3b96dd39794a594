//! # netcall - call tracking and lifecycle control for HTTP clients
//!
//! netcall sits above `reqwest` and manages the calls it makes: every call is
//! tracked in a ledger under a group tag so whole groups can be cancelled at
//! once, every failure is classified into a closed [`ErrorKind`] taxonomy,
//! and every call runs through a lifecycle of callback stages that ends with
//! exactly one completion.
//!
//! ## Quick Start
//!
//! ```no_run
//! use netcall::{ErrorKind, Request};
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct User {
//!     id: u64,
//!     name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), netcall::Error> {
//!     netcall::initialize("https://api.example.com", |http| http)?;
//!
//!     let registry = netcall::Registry::global();
//!     match registry.fetch::<User>(Request::get("/users/123")).await {
//!         Ok(user) => println!("User {}: {}", user.id, user.name),
//!         Err(ErrorKind::Cancelled) => {}
//!         Err(kind) => eprintln!("{}", kind.message()),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Groups and cancellation
//!
//! Calls issued with the same group tag can be cancelled together. A call
//! without a tag gets a group of its own.
//!
//! ```no_run
//! use netcall::{Callback, Call, ErrorKind, Request};
//!
//! struct Feed;
//!
//! impl Callback<Vec<String>> for Feed {
//!     fn on_start(&self, call: &Call) {
//!         println!("loading {}", call.id());
//!     }
//!
//!     fn on_success(&self, items: Vec<String>) {
//!         println!("{} items", items.len());
//!     }
//!
//!     fn on_complete(&self, error: Option<&ErrorKind>) {
//!         println!("done: {:?}", error);
//!     }
//! }
//!
//! # async fn example() {
//! let registry = netcall::Registry::global();
//! registry.enqueue::<Vec<String>, _>(Request::get("/feed").with_group("home"), Feed);
//! registry.enqueue::<Vec<String>, _>(Request::get("/banners").with_group("home"), Feed);
//!
//! netcall::cancel_group("home");
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Failures reach the callback's `on_failure` stage, then (unless the call was
//! cancelled) the [`ErrorHandler`] installed on the registry or on the
//! request. [`classify`] is exposed for code that handles [`Error`] values
//! directly.

pub mod call;
pub mod classify;
mod client;
mod convert;
pub mod dialog;
mod error;
mod handler;
pub mod ledger;
pub mod lifecycle;
mod registry;
mod request;
mod response;
pub mod view;

pub use call::{Call, CallId, GroupTag, WeakCall};
pub use classify::{classify, ErrorKind};
pub use client::{Client, ClientBuilder, DEFAULT_CONNECT_TIMEOUT, DEFAULT_TIMEOUT};
pub use convert::{Converter, JsonConverter};
pub use dialog::{DialogCallback, DialogContext, DialogFactory, DialogHandle, NoopDialogFactory};
pub use error::{Error, Result};
pub use handler::{DefaultErrorHandler, ErrorHandler};
pub use ledger::Ledger;
pub use lifecycle::{Callback, Event, Lifecycle, State};
pub use registry::Registry;
pub use request::{Request, RequestInterceptor};
pub use response::{Progress, RawResponse};
pub use view::{AttachListener, StateCallback, StateView, Viewport};

/// Initializes the global [`Registry`]; see [`Registry::initialize`].
pub fn initialize<F>(host: impl Into<String>, configure: F) -> Result<()>
where
    F: FnOnce(reqwest::ClientBuilder) -> reqwest::ClientBuilder + Send + 'static,
{
    Registry::global().initialize(host, configure)
}

/// Cancels every live call in `group` on the global [`Registry`].
pub fn cancel_group(group: impl Into<GroupTag>) -> usize {
    Registry::global().cancel_group(&group.into())
}

/// Cancels every live call on the global [`Registry`].
pub fn cancel_all() -> usize {
    Registry::global().cancel_all()
}

/// Cancels one call on the global [`Registry`].
pub fn cancel_id(id: CallId) -> bool {
    Registry::global().cancel_id(id)
}
