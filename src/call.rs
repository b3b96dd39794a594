//! Handles to in-flight calls.
//!
//! A [`Call`] is owned by whoever drives the request (the dispatch task, a
//! dialog, the caller). The [`Ledger`](crate::Ledger) only ever holds a
//! [`WeakCall`], so a finished call is reclaimed even if nobody removes it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio_util::sync::{CancellationToken, DropGuard, WaitForCancellationFuture};

static NEXT_CALL_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallId(u64);

impl CallId {
    fn next() -> Self {
        CallId(NEXT_CALL_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw numeric id.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The tag used to cancel related calls together.
///
/// Requests without an explicit group get a [`GroupTag::unique`] tag, so
/// cancelling "their" group only ever touches that one call.
///
/// # Examples
///
/// ```
/// use netcall::GroupTag;
///
/// let list = GroupTag::from("list");
/// assert_eq!(list.as_str(), "list");
/// assert_ne!(GroupTag::unique(), GroupTag::unique());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupTag(Arc<str>);

impl GroupTag {
    /// Creates a tag from any string-like value.
    pub fn new(tag: impl AsRef<str>) -> Self {
        GroupTag(Arc::from(tag.as_ref()))
    }

    /// Creates a tag no other call shares.
    pub fn unique() -> Self {
        GroupTag::new(uuid::Uuid::new_v4().to_string())
    }

    /// The tag's text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GroupTag {
    fn from(tag: &str) -> Self {
        GroupTag::new(tag)
    }
}

impl From<String> for GroupTag {
    fn from(tag: String) -> Self {
        GroupTag(Arc::from(tag))
    }
}

#[derive(Debug)]
struct CallInner {
    id: CallId,
    group: GroupTag,
    token: CancellationToken,
}

/// A strong handle to one in-flight call.
///
/// Cloning is cheap; all clones refer to the same call. Cancellation is
/// cooperative: [`Call::cancel`] trips a token that the dispatch task races
/// against the transport.
#[derive(Debug, Clone)]
pub struct Call {
    inner: Arc<CallInner>,
}

impl Call {
    /// Creates a new call in `group`.
    pub fn new(group: GroupTag) -> Self {
        Call {
            inner: Arc::new(CallInner {
                id: CallId::next(),
                group,
                token: CancellationToken::new(),
            }),
        }
    }

    /// Identifier unique to this call within the process.
    pub fn id(&self) -> CallId {
        self.inner.id
    }

    /// The group this call is cancelled with.
    pub fn group(&self) -> &GroupTag {
        &self.inner.group
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.inner.token.cancel();
    }

    /// `true` once any clone has called [`Call::cancel`].
    pub fn is_cancelled(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Resolves once [`Call::cancel`] has been invoked on any clone.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.inner.token.cancelled()
    }

    /// Returns a guard that cancels the call when dropped unless disarmed.
    pub fn drop_guard(&self) -> DropGuard {
        self.inner.token.clone().drop_guard()
    }

    /// Returns a non-owning reference to this call.
    pub fn downgrade(&self) -> WeakCall {
        WeakCall(Arc::downgrade(&self.inner))
    }
}

/// A non-owning reference to a [`Call`].
#[derive(Debug, Clone)]
pub struct WeakCall(Weak<CallInner>);

impl WeakCall {
    /// Returns the call if it is still alive.
    pub fn upgrade(&self) -> Option<Call> {
        self.0.upgrade().map(|inner| Call { inner })
    }

    /// `true` while some strong [`Call`] handle still exists.
    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let a = Call::new(GroupTag::from("g"));
        let b = Call::new(GroupTag::from("g"));
        assert_ne!(a.id(), b.id());
        assert_eq!(a.group(), b.group());
    }

    #[test]
    fn test_cancel_is_shared_between_clones() {
        let call = Call::new(GroupTag::unique());
        let clone = call.clone();
        clone.cancel();
        assert!(call.is_cancelled());
    }

    #[test]
    fn test_weak_call_dies_with_last_handle() {
        let call = Call::new(GroupTag::unique());
        let weak = call.downgrade();
        assert!(weak.is_alive());
        assert_eq!(weak.upgrade().map(|c| c.id()), Some(call.id()));

        drop(call);
        assert!(!weak.is_alive());
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_drop_guard_cancels() {
        let call = Call::new(GroupTag::unique());
        let guard = call.drop_guard();
        drop(guard);
        assert!(call.is_cancelled());

        let call = Call::new(GroupTag::unique());
        let guard = call.drop_guard();
        let _token = guard.disarm();
        assert!(!call.is_cancelled());
    }
}
