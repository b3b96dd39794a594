//! Blocking-dialog callbacks.
//!
//! The library never renders anything. A [`DialogFactory`] installed on the
//! registry creates the platform's loading dialog; [`DialogCallback`] shows
//! it when a call starts and dismisses it when the call completes.

use crate::call::{Call, CallId, GroupTag, WeakCall};
use crate::classify::ErrorKind;
use crate::handler::ErrorHandler;
use crate::lifecycle::Callback;
use crate::response::Progress;
use crate::Error;
use std::sync::{Arc, Mutex, PoisonError};

/// What a dialog is created for.
#[derive(Debug, Clone)]
pub struct DialogContext {
    pub call_id: CallId,
    pub group: GroupTag,
    pub message: Option<String>,
    call: WeakCall,
}

impl DialogContext {
    /// Cancels the call the dialog belongs to, e.g. when the user dismisses
    /// the dialog. Does nothing once the call has finished.
    pub fn cancel_call(&self) {
        if let Some(call) = self.call.upgrade() {
            call.cancel();
        }
    }
}

/// A dialog created by a [`DialogFactory`].
pub trait DialogHandle: Send + Sync {
    fn show(&self);
    fn dismiss(&self);
}

/// Creates loading dialogs.
pub trait DialogFactory: Send + Sync {
    fn create(&self, context: &DialogContext) -> Box<dyn DialogHandle>;
}

/// Factory used until a real one is installed; its dialogs only log.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDialogFactory;

struct NoopDialog {
    call_id: CallId,
}

impl DialogHandle for NoopDialog {
    fn show(&self) {
        tracing::trace!(call_id = %self.call_id, "Dialog shown");
    }

    fn dismiss(&self) {
        tracing::trace!(call_id = %self.call_id, "Dialog dismissed");
    }
}

impl DialogFactory for NoopDialogFactory {
    fn create(&self, context: &DialogContext) -> Box<dyn DialogHandle> {
        Box::new(NoopDialog {
            call_id: context.call_id,
        })
    }
}

/// Wraps a callback with a loading dialog that lives as long as the call.
pub struct DialogCallback<C> {
    inner: C,
    factory: Arc<dyn DialogFactory>,
    message: Option<String>,
    dialog: Mutex<Option<Box<dyn DialogHandle>>>,
}

impl<C> DialogCallback<C> {
    pub fn new(inner: C, factory: Arc<dyn DialogFactory>) -> Self {
        Self {
            inner,
            factory,
            message: None,
            dialog: Mutex::new(None),
        }
    }

    /// Text for the dialog, if the factory displays one.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl<T, C> Callback<T> for DialogCallback<C>
where
    C: Callback<T>,
{
    fn on_start(&self, call: &Call) {
        let dialog = self.factory.create(&DialogContext {
            call_id: call.id(),
            group: call.group().clone(),
            message: self.message.clone(),
            call: call.downgrade(),
        });
        dialog.show();
        *self.dialog.lock().unwrap_or_else(PoisonError::into_inner) = Some(dialog);
        self.inner.on_start(call);
    }

    fn on_progress(&self, progress: &Progress) {
        self.inner.on_progress(progress);
    }

    fn on_success(&self, value: T) {
        self.inner.on_success(value);
    }

    fn on_failure(&self, failure: &Error, kind: &ErrorKind) {
        self.inner.on_failure(failure, kind);
    }

    fn on_error(&self, kind: &ErrorKind, handler: &dyn ErrorHandler) {
        self.inner.on_error(kind, handler);
    }

    fn on_complete(&self, error: Option<&ErrorKind>) {
        let dialog = self
            .dialog
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(dialog) = dialog {
            dialog.dismiss();
        }
        self.inner.on_complete(error);
    }
}
