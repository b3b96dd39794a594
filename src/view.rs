//! Viewport-bound callbacks.
//!
//! [`StateCallback`] ties a call to an external three-state display
//! (loading/content/error) and to that display's attach/detach signal. When
//! the viewport detaches, every call in the group is cancelled, not just the
//! one that subscribed. Rendering itself stays with the [`StateView`]
//! implementation.

use crate::call::{Call, GroupTag};
use crate::classify::ErrorKind;
use crate::handler::ErrorHandler;
use crate::ledger::Ledger;
use crate::lifecycle::Callback;
use crate::registry::Registry;
use crate::response::Progress;
use crate::Error;
use std::sync::{Arc, Mutex, PoisonError};

/// Receives attach/detach notifications from a [`Viewport`].
pub trait AttachListener: Send + Sync {
    fn on_attached(&self) {}
    fn on_detached(&self);
}

/// A UI element that can report when it is attached to or detached from the
/// screen.
///
/// Listeners are identified by pointer: `remove_attach_listener` receives the
/// same `Arc` that was added (compare with [`std::ptr::addr_eq`] on
/// [`Arc::as_ptr`]).
pub trait Viewport: Send + Sync {
    fn add_attach_listener(&self, listener: Arc<dyn AttachListener>);
    fn remove_attach_listener(&self, listener: &Arc<dyn AttachListener>);
}

/// A viewport with a loading/content/error display.
pub trait StateView: Viewport {
    fn show_loading(&self);
    fn show_content(&self);
    fn show_error(&self, kind: &ErrorKind);
}

struct CancelGroupOnDetach {
    ledger: Ledger,
    group: GroupTag,
}

impl AttachListener for CancelGroupOnDetach {
    fn on_detached(&self) {
        let cancelled = self.ledger.cancel_group(&self.group);
        tracing::debug!(group = %self.group, cancelled, "Viewport detached");
    }
}

/// Wraps a callback and mirrors its call on a [`StateView`].
///
/// - start: `show_loading`, and the view's detach cancels the call's group
/// - failure: `show_error`
/// - error stage: [`ErrorHandler::on_state_error`] with the view
/// - completion without error, or by cancellation: `show_content`
///
/// The detach listener is removed from the view again when the call
/// completes.
pub struct StateCallback<C> {
    inner: C,
    view: Arc<dyn StateView>,
    ledger: Ledger,
    listener: Mutex<Option<Arc<dyn AttachListener>>>,
}

impl<C> StateCallback<C> {
    /// `registry` must be the one the call is dispatched through, so that
    /// detaching cancels the group in the right ledger.
    pub fn new(inner: C, view: Arc<dyn StateView>, registry: &Registry) -> Self {
        Self {
            inner,
            view,
            ledger: registry.ledger().clone(),
            listener: Mutex::new(None),
        }
    }

    fn listener(&self) -> std::sync::MutexGuard<'_, Option<Arc<dyn AttachListener>>> {
        self.listener.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T, C> Callback<T> for StateCallback<C>
where
    C: Callback<T>,
{
    fn on_start(&self, call: &Call) {
        self.view.show_loading();
        let listener: Arc<dyn AttachListener> = Arc::new(CancelGroupOnDetach {
            ledger: self.ledger.clone(),
            group: call.group().clone(),
        });
        self.view.add_attach_listener(Arc::clone(&listener));
        *self.listener() = Some(listener);
        self.inner.on_start(call);
    }

    fn on_progress(&self, progress: &Progress) {
        self.inner.on_progress(progress);
    }

    fn on_success(&self, value: T) {
        self.inner.on_success(value);
    }

    fn on_failure(&self, failure: &Error, kind: &ErrorKind) {
        self.view.show_error(kind);
        self.inner.on_failure(failure, kind);
    }

    fn on_error(&self, kind: &ErrorKind, handler: &dyn ErrorHandler) {
        handler.on_state_error(kind, self.view.as_ref());
    }

    fn on_complete(&self, error: Option<&ErrorKind>) {
        let listener = self.listener().take();
        if let Some(listener) = listener {
            self.view.remove_attach_listener(&listener);
        }
        self.inner.on_complete(error);
        if error.map_or(true, ErrorKind::is_cancelled) {
            self.view.show_content();
        }
    }
}
