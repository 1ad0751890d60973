//! Dependency Set
//!
//! A [`Dep`] is the publish point for one reactive property (or for a
//! container as a whole). It holds the watchers currently interested in the
//! property and can notify them all. A Dep never schedules anything itself;
//! deferral and batching belong to the watcher and the scheduler.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::reactive::context;
use crate::reactive::watcher::{Watcher, WeakWatcher};

/// Counter for generating unique dependency-set ids.
static DEP_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_dep_id() -> u64 {
    DEP_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// The set of watchers subscribed to one reactive property.
///
/// Subscribers are held weakly, in first-subscription order; a torn-down
/// watcher is skipped on notify and never kept alive by its deps. Callers
/// deduplicate through the watcher's working sets, so a watcher appears at
/// most once.
pub struct Dep {
    id: u64,
    subs: RwLock<Vec<(u64, WeakWatcher)>>,
}

impl Dep {
    pub fn new() -> Self {
        Dep {
            id: next_dep_id(),
            subs: RwLock::new(Vec::new()),
        }
    }

    /// Monotonically increasing id, used for dedup and stable ordering.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn add_sub(&self, watcher: &Watcher) {
        self.subs.write().push((watcher.id(), watcher.downgrade()));
    }

    pub(crate) fn remove_sub(&self, watcher_id: u64) {
        self.subs.write().retain(|(id, _)| *id != watcher_id);
    }

    /// Register this Dep with the currently active computation, if any.
    ///
    /// Two-way: the Dep gains the watcher as a subscriber and the watcher
    /// records the Dep in its working set. A no-op when nothing is
    /// evaluating.
    pub fn depend(self: &Arc<Self>) {
        if let Some(watcher) = context::current_target() {
            watcher.add_dep(self);
        }
    }

    /// Invoke `update()` on every live subscriber.
    ///
    /// The subscriber list is snapshotted before iteration so mutation
    /// during the walk (resubscription, teardown) cannot skew traversal. In
    /// debug builds the snapshot is sorted by watcher id for deterministic
    /// order.
    pub fn notify(&self) {
        let mut subs: Vec<(u64, WeakWatcher)> = self.subs.read().clone();
        if cfg!(debug_assertions) {
            subs.sort_by_key(|(id, _)| *id);
        }
        for (_, weak) in subs {
            if let Some(watcher) = weak.upgrade() {
                watcher.update();
            }
        }
    }

    /// Number of current subscribers (including entries whose watcher has
    /// been dropped but not yet removed).
    pub fn subscriber_count(&self) -> usize {
        self.subs.read().len()
    }
}

impl Default for Dep {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dep_ids_are_unique_and_increasing() {
        let a = Dep::new();
        let b = Dep::new();
        let c = Dep::new();
        assert!(a.id() < b.id());
        assert!(b.id() < c.id());
    }

    #[test]
    fn depend_without_active_target_is_a_noop() {
        let dep = Arc::new(Dep::new());
        dep.depend();
        assert_eq!(dep.subscriber_count(), 0);
    }
}
