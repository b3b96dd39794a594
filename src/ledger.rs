//! The running-call ledger.
//!
//! Every started call is registered here under its [`GroupTag`] so that a
//! whole group can be cancelled at once (all calls issued by one screen, for
//! example). Entries only hold a [`WeakCall`]; traversals prune entries whose
//! call has already been dropped, which bounds growth even when a call never
//! reaches [`Ledger::remove`].

use crate::call::{Call, CallId, GroupTag, WeakCall};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

struct Entry {
    group: GroupTag,
    call: WeakCall,
}

/// Concurrent registry of in-flight calls.
///
/// Cloning yields another handle to the same ledger. Inserts, removals and
/// group cancellation may run concurrently from any thread; the map is
/// sharded, so unrelated calls do not contend on a single lock.
///
/// # Examples
///
/// ```
/// use netcall::{Call, GroupTag, Ledger};
///
/// let ledger = Ledger::new();
/// let list = Call::new(GroupTag::from("list"));
/// let detail = Call::new(GroupTag::from("detail"));
/// ledger.register(&list);
/// ledger.register(&detail);
///
/// assert_eq!(ledger.cancel_group(&GroupTag::from("list")), 1);
/// assert!(list.is_cancelled());
/// assert!(!detail.is_cancelled());
/// ```
#[derive(Clone, Default)]
pub struct Ledger {
    entries: Arc<DashMap<CallId, Entry>>,
}

impl Ledger {
    /// Creates an empty ledger. Clones share the same entries.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `call` under its group.
    pub fn register(&self, call: &Call) {
        self.entries.insert(
            call.id(),
            Entry {
                group: call.group().clone(),
                call: call.downgrade(),
            },
        );
        debug!(call_id = %call.id(), group = %call.group(), "Registered call");
    }

    /// Forgets a call. Returns `false` if it was not (or no longer) present.
    pub fn remove(&self, id: CallId) -> bool {
        self.entries.remove(&id).is_some()
    }

    /// Cancels every live call tagged with `group` and removes it.
    ///
    /// Dead entries met along the way are pruned. Returns the number of calls
    /// that were cancelled; an empty group is a no-op.
    pub fn cancel_group(&self, group: &GroupTag) -> usize {
        let cancelled = self.cancel_where(|tag| tag == group);
        debug!(group = %group, cancelled, "Cancelled group");
        cancelled
    }

    /// Cancels every live call.
    pub fn cancel_all(&self) -> usize {
        let cancelled = self.cancel_where(|_| true);
        debug!(cancelled, "Cancelled all calls");
        cancelled
    }

    /// Cancels a single call by id. Returns `true` if a live call was cancelled.
    pub fn cancel_id(&self, id: CallId) -> bool {
        match self.entries.remove(&id).and_then(|(_, entry)| entry.call.upgrade()) {
            Some(call) => {
                call.cancel();
                true
            }
            None => false,
        }
    }

    /// Drops entries whose call no longer exists. Returns how many were pruned.
    pub fn sweep(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.call.is_alive());
        before.saturating_sub(self.entries.len())
    }

    /// Number of live calls currently tagged with `group`.
    pub fn group_len(&self, group: &GroupTag) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.group == *group && entry.call.is_alive())
            .count()
    }

    /// `true` if `id` is registered and not yet removed or swept.
    pub fn contains(&self, id: CallId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Number of entries, including dead ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn cancel_where(&self, predicate: impl Fn(&GroupTag) -> bool) -> usize {
        let mut doomed = Vec::new();
        self.entries.retain(|_, entry| match entry.call.upgrade() {
            None => false,
            Some(call) if predicate(&entry.group) => {
                doomed.push(call);
                false
            }
            Some(_) => true,
        });

        // Cancel outside the shard locks; waking a task must not contend with
        // concurrent register/remove.
        for call in &doomed {
            call.cancel();
        }
        doomed.len()
    }
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("entries", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn call(group: &str) -> Call {
        Call::new(GroupTag::from(group))
    }

    #[test]
    fn test_cancel_group_leaves_other_groups() {
        let ledger = Ledger::new();
        let a1 = call("list");
        let a2 = call("list");
        let b = call("detail");
        for c in [&a1, &a2, &b] {
            ledger.register(c);
        }

        assert_eq!(ledger.cancel_group(&GroupTag::from("list")), 2);
        assert!(a1.is_cancelled());
        assert!(a2.is_cancelled());
        assert!(!b.is_cancelled());
        assert!(!ledger.contains(a1.id()));
        assert!(ledger.contains(b.id()));
    }

    #[test]
    fn test_cancel_empty_group_is_noop() {
        let ledger = Ledger::new();
        assert_eq!(ledger.cancel_group(&GroupTag::from("nobody")), 0);
    }

    #[test]
    fn test_removed_calls_are_not_cancelled() {
        let ledger = Ledger::new();
        let done = call("list");
        ledger.register(&done);
        assert!(ledger.remove(done.id()));
        assert!(!ledger.remove(done.id()));

        assert_eq!(ledger.cancel_group(&GroupTag::from("list")), 0);
        assert!(!done.is_cancelled());
    }

    #[test]
    fn test_dead_entries_are_pruned_by_traversal() {
        let ledger = Ledger::new();
        let dropped = call("list");
        let alive = call("detail");
        ledger.register(&dropped);
        ledger.register(&alive);
        drop(dropped);

        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.group_len(&GroupTag::from("list")), 0);
        assert_eq!(ledger.cancel_group(&GroupTag::from("list")), 0);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_sweep() {
        let ledger = Ledger::new();
        for _ in 0..10 {
            ledger.register(&call("batch"));
        }
        let kept = call("batch");
        ledger.register(&kept);

        assert_eq!(ledger.sweep(), 10);
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.group_len(&GroupTag::from("batch")), 1);
    }

    #[test]
    fn test_cancel_id_and_cancel_all() {
        let ledger = Ledger::new();
        let a = call("a");
        let b = call("b");
        let c = call("c");
        for x in [&a, &b, &c] {
            ledger.register(x);
        }

        assert!(ledger.cancel_id(a.id()));
        assert!(!ledger.cancel_id(a.id()));
        assert!(a.is_cancelled());

        assert_eq!(ledger.cancel_all(), 2);
        assert!(b.is_cancelled() && c.is_cancelled());
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_concurrent_register_remove_and_cancel() {
        let ledger = Ledger::new();
        let group = GroupTag::from("hot");

        thread::scope(|scope| {
            for _ in 0..4 {
                let ledger = ledger.clone();
                scope.spawn(move || {
                    for _ in 0..500 {
                        let c = Call::new(GroupTag::from("hot"));
                        ledger.register(&c);
                        ledger.remove(c.id());
                    }
                });
            }
            for _ in 0..2 {
                let ledger = ledger.clone();
                let group = group.clone();
                scope.spawn(move || {
                    for _ in 0..500 {
                        ledger.cancel_group(&group);
                    }
                });
            }
        });

        ledger.sweep();
        assert!(ledger.is_empty());
    }
}
