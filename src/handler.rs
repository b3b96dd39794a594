//! Error handling policy.
//!
//! One [`ErrorHandler`] is installed globally on the
//! [`Registry`](crate::Registry); individual requests may override it. The
//! lifecycle calls [`ErrorHandler::on_failure`] for every failure (including
//! cancellations) and then exactly one of [`ErrorHandler::on_error`] or
//! [`ErrorHandler::on_state_error`] for failures the user should hear about.

use crate::classify::ErrorKind;
use crate::view::StateView;
use crate::Error;

/// Decides how classified failures are surfaced.
///
/// # Examples
///
/// ```
/// use netcall::{ErrorHandler, ErrorKind};
/// use std::sync::Mutex;
///
/// #[derive(Default)]
/// struct Toasts(Mutex<Vec<String>>);
///
/// impl ErrorHandler for Toasts {
///     fn on_error(&self, kind: &ErrorKind) {
///         self.0.lock().unwrap().push(kind.message());
///     }
/// }
/// ```
pub trait ErrorHandler: Send + Sync {
    /// Raw failure hook, invoked once per failure before any display
    /// decision is made. Cancellations arrive here too.
    fn on_failure(&self, _failure: &Error, _kind: &ErrorKind) {}

    /// Surfaces a failure that is not tied to a state view.
    fn on_error(&self, kind: &ErrorKind);

    /// Surfaces a failure for a call bound to `view`.
    ///
    /// The view has already been switched to its error state, so by default
    /// only failures caused by the response itself are reported again; network
    /// conditions are left to the error layout.
    fn on_state_error(&self, kind: &ErrorKind, _view: &dyn StateView) {
        match kind {
            ErrorKind::Convert
            | ErrorKind::RequestParams
            | ErrorKind::Response(_)
            | ErrorKind::NullResult => self.on_error(kind),
            _ => tracing::debug!(kind = %kind, "Failure left to the state view"),
        }
    }
}

/// Reports failures through `tracing`.
///
/// Used when no handler has been installed. Cancellations are never
/// reported; everything else is logged at `warn` with its user-facing message.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultErrorHandler;

impl ErrorHandler for DefaultErrorHandler {
    fn on_error(&self, kind: &ErrorKind) {
        if kind.is_cancelled() {
            return;
        }
        match kind {
            ErrorKind::Other(cause) => {
                tracing::warn!(cause = %cause, message = %kind.message(), "Call failed")
            }
            _ => tracing::warn!(kind = %kind, message = %kind.message(), "Call failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording(Mutex<Vec<String>>);

    impl ErrorHandler for Recording {
        fn on_error(&self, kind: &ErrorKind) {
            self.0.lock().unwrap().push(kind.to_string());
        }
    }

    struct NullView;

    impl crate::view::Viewport for NullView {
        fn add_attach_listener(&self, _listener: std::sync::Arc<dyn crate::view::AttachListener>) {}

        fn remove_attach_listener(
            &self,
            _listener: &std::sync::Arc<dyn crate::view::AttachListener>,
        ) {
        }
    }

    impl StateView for NullView {
        fn show_loading(&self) {}
        fn show_content(&self) {}
        fn show_error(&self, _kind: &ErrorKind) {}
    }

    #[test]
    fn test_state_error_reports_response_failures_only() {
        let handler = Recording::default();
        handler.on_state_error(&ErrorKind::Convert, &NullView);
        handler.on_state_error(&ErrorKind::Connect, &NullView);
        handler.on_state_error(&ErrorKind::Timeout("5s".to_string()), &NullView);
        handler.on_state_error(&ErrorKind::Response("banned".to_string()), &NullView);

        let reported = handler.0.lock().unwrap();
        assert_eq!(
            *reported,
            vec![
                "response conversion failed".to_string(),
                "response failed: banned".to_string()
            ]
        );
    }
}
