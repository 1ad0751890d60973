//! Active-Computation Stack
//!
//! Tracks which watcher is currently evaluating so property reads can be
//! wired to the right dependency set. Nested evaluations (a computed value
//! read while another watcher evaluates) push and pop in strict LIFO order;
//! only the top of the stack receives new subscriptions.
//!
//! The stack is thread-local: each logical event loop owns its own stack,
//! which keeps the common single-threaded case free of synchronization.

use std::cell::RefCell;

use crate::reactive::watcher::Watcher;

thread_local! {
    static TARGET_STACK: RefCell<Vec<Watcher>> = RefCell::new(Vec::new());
}

/// Guard that pops the target when dropped, so the stack stays balanced
/// even if evaluation panics.
pub(crate) struct TargetGuard {
    watcher_id: u64,
}

/// Make `watcher` the active computation until the guard drops.
pub(crate) fn push_target(watcher: &Watcher) -> TargetGuard {
    let watcher_id = watcher.id();
    TARGET_STACK.with(|stack| stack.borrow_mut().push(watcher.clone()));
    TargetGuard { watcher_id }
}

/// The watcher currently collecting dependencies, if any.
pub(crate) fn current_target() -> Option<Watcher> {
    TARGET_STACK.with(|stack| stack.borrow().last().cloned())
}

/// Whether any computation is currently collecting dependencies.
pub fn is_tracking() -> bool {
    TARGET_STACK.with(|stack| !stack.borrow().is_empty())
}

impl Drop for TargetGuard {
    fn drop(&mut self) {
        TARGET_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();
            // Catch mismatched push/pop pairs early.
            if let Some(watcher) = popped {
                debug_assert_eq!(
                    watcher.id(),
                    self.watcher_id,
                    "active-computation stack mismatch: expected {}, got {}",
                    self.watcher_id,
                    watcher.id()
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::watcher::{WatchOptions, WatchTarget, Watcher};
    use crate::value::Value;

    fn lazy_watcher() -> Watcher {
        Watcher::new(
            Value::Null,
            WatchTarget::func(|_| Ok(Value::Null)),
            |_, _| {},
            WatchOptions {
                lazy: true,
                ..WatchOptions::default()
            },
        )
        .expect("lazy watcher does not evaluate on construction")
    }

    #[test]
    fn stack_tracks_current_target() {
        assert!(!is_tracking());
        assert!(current_target().is_none());

        let watcher = lazy_watcher();
        {
            let _guard = push_target(&watcher);
            assert!(is_tracking());
            assert_eq!(current_target().map(|w| w.id()), Some(watcher.id()));
        }

        assert!(!is_tracking());
        assert!(current_target().is_none());
    }

    #[test]
    fn nested_targets_pop_in_lifo_order() {
        let outer = lazy_watcher();
        let inner = lazy_watcher();

        let _outer_guard = push_target(&outer);
        assert_eq!(current_target().map(|w| w.id()), Some(outer.id()));

        {
            let _inner_guard = push_target(&inner);
            assert_eq!(current_target().map(|w| w.id()), Some(inner.id()));
        }

        assert_eq!(current_target().map(|w| w.id()), Some(outer.id()));
    }
}
