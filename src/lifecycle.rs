//! The per-call lifecycle state machine.
//!
//! A [`Lifecycle`] is bound to exactly one [`Call`] and one [`Callback`]. The
//! transport feeds it [`Event`]s through [`Lifecycle::handle_event`] from any
//! thread; the machine decides which callback stages run:
//!
//! ```text
//! Idle -> Started -> Running -> Succeeded --------------------> Completed
//!                           \-> Failed -> (Erred unless cancelled) -> Completed
//! any non-terminal state ----> Cancelled ----------------------> Completed
//! ```
//!
//! `on_complete` runs exactly once and last. Terminal events arriving after
//! the first one (a cancellation racing a success, a duplicate completion)
//! are ignored.

use crate::call::Call;
use crate::classify::{classify, ErrorKind};
use crate::handler::ErrorHandler;
use crate::registry::Registry;
use crate::response::Progress;
use crate::Error;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, trace, warn};

/// Lifecycle states of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Idle,
    Started,
    Running,
    Succeeded,
    Failed,
    Erred,
    Cancelled,
    Completed,
}

impl State {
    /// `true` once the call has succeeded, failed or been cancelled.
    pub fn is_terminal(self) -> bool {
        !matches!(self, State::Idle | State::Started | State::Running)
    }
}

/// Signals delivered by the transport.
#[derive(Debug)]
pub enum Event<T> {
    Start,
    Progress(Progress),
    Success(T),
    Failure(Error),
    Cancel,
}

/// Stage hooks for one call.
///
/// Only [`Callback::on_success`] is required. Any `Fn(T)` closure is a
/// callback that ignores everything but success.
///
/// Hooks run one at a time per call, outside the state lock. They must not
/// feed events back into the same lifecycle synchronously.
pub trait Callback<T>: Send + Sync {
    fn on_start(&self, _call: &Call) {}

    fn on_progress(&self, _progress: &Progress) {}

    fn on_success(&self, value: T);

    /// Every failure, including cancellation, lands here first.
    fn on_failure(&self, _failure: &Error, _kind: &ErrorKind) {}

    /// Second stage for failures that are not cancellations.
    fn on_error(&self, kind: &ErrorKind, handler: &dyn ErrorHandler) {
        handler.on_error(kind);
    }

    /// Final stage. `error` is `None` after a success.
    fn on_complete(&self, _error: Option<&ErrorKind>) {}
}

impl<T, F> Callback<T> for F
where
    F: Fn(T) + Send + Sync,
{
    fn on_success(&self, value: T) {
        self(value)
    }
}

/// State machine driving one call through its callback stages.
///
/// Transitions are made under a short-lived state lock; hooks run after it
/// is released, so they may read [`Lifecycle::state`]. A second lock keeps
/// the events of one call in order.
pub struct Lifecycle<T, C> {
    call: Call,
    callback: C,
    registry: Registry,
    error_handler: Option<Arc<dyn ErrorHandler>>,
    state: Mutex<State>,
    dispatch: Mutex<()>,
    _marker: PhantomData<fn(T)>,
}

impl<T, C> Lifecycle<T, C>
where
    C: Callback<T>,
{
    /// Binds `callback` to `call`. The call is registered in `registry`'s
    /// ledger on [`Event::Start`].
    pub fn new(call: Call, callback: C, registry: &Registry) -> Self {
        Self {
            call,
            callback,
            registry: registry.clone(),
            error_handler: None,
            state: Mutex::new(State::Idle),
            dispatch: Mutex::new(()),
            _marker: PhantomData,
        }
    }

    /// Routes this call's errors to `handler` instead of the global one.
    pub fn with_error_handler(mut self, handler: Option<Arc<dyn ErrorHandler>>) -> Self {
        self.error_handler = handler;
        self
    }

    pub fn call(&self) -> &Call {
        &self.call
    }

    pub fn callback(&self) -> &C {
        &self.callback
    }

    /// The current state. Safe to call from inside a hook.
    pub fn state(&self) -> State {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies `event`. Returns `false` if the event was ignored because it
    /// is not valid in the current state.
    ///
    /// Hooks must not feed events back into the same lifecycle synchronously.
    pub fn handle_event(&self, event: Event<T>) -> bool {
        let _dispatch = self.dispatch.lock().unwrap_or_else(PoisonError::into_inner);

        match event {
            Event::Start => {
                if !self.transition("start", |state| {
                    (state == State::Idle).then_some(State::Started)
                }) {
                    return false;
                }
                self.registry.ledger().register(&self.call);
                self.callback.on_start(&self.call);
            }
            Event::Progress(progress) => {
                if !self.transition("progress", |state| {
                    matches!(state, State::Started | State::Running).then_some(State::Running)
                }) {
                    return false;
                }
                self.callback.on_progress(&progress);
            }
            Event::Success(value) => {
                if !self.transition("success", |state| {
                    (!state.is_terminal()).then_some(State::Succeeded)
                }) {
                    return false;
                }
                self.callback.on_success(value);
                self.complete(None);
            }
            Event::Failure(failure) => {
                if !self.transition("failure", |state| {
                    (!state.is_terminal()).then_some(State::Failed)
                }) {
                    return false;
                }
                let handler = self.handler();
                let kind = self.fail(&failure, &*handler);
                if !kind.is_cancelled() {
                    self.set_state(State::Erred);
                    self.callback.on_error(&kind, &*handler);
                }
                self.complete(Some(&kind));
            }
            Event::Cancel => {
                if !self.transition("cancel", |state| {
                    (!state.is_terminal()).then_some(State::Cancelled)
                }) {
                    return false;
                }
                self.call.cancel();
                if self.registry.log_enabled() {
                    debug!(call_id = %self.call.id(), group = %self.call.group(), "Call cancelled");
                }
                self.complete(Some(&ErrorKind::Cancelled));
            }
        }
        true
    }

    fn fail(&self, failure: &Error, handler: &dyn ErrorHandler) -> ErrorKind {
        let kind = classify(failure);

        if self.registry.log_enabled() {
            if kind.is_cancelled() {
                debug!(call_id = %self.call.id(), group = %self.call.group(), "Call cancelled");
            } else {
                warn!(
                    call_id = %self.call.id(),
                    group = %self.call.group(),
                    kind = %kind,
                    error = %failure,
                    "Call failed"
                );
            }
        }

        handler.on_failure(failure, &kind);
        self.callback.on_failure(failure, &kind);
        kind
    }

    fn complete(&self, error: Option<&ErrorKind>) {
        self.set_state(State::Completed);
        self.registry.ledger().remove(self.call.id());
        self.callback.on_complete(error);
    }

    fn handler(&self) -> Arc<dyn ErrorHandler> {
        match &self.error_handler {
            Some(handler) => Arc::clone(handler),
            None => self.registry.error_handler(),
        }
    }

    /// Moves to the state chosen by `next`, or leaves the state alone and
    /// returns `false` when `next` rejects the current one.
    fn transition<F>(&self, event: &'static str, next: F) -> bool
    where
        F: FnOnce(State) -> Option<State>,
    {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match next(*state) {
            Some(target) => {
                *state = target;
                true
            }
            None => {
                trace!(call_id = %self.call.id(), state = ?*state, event, "Ignoring event");
                false
            }
        }
    }

    fn set_state(&self, target: State) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = target;
    }
}
