//! Lazy Computed Values
//!
//! A [`Computed`] is a cached derived value built on a lazy watcher. Reading
//! it recomputes only when a dependency has invalidated the cache since the
//! last read; otherwise the cached value is returned without running the
//! getter. When read from inside another evaluation, the computed value's
//! own dependencies are re-registered with the active watcher, so an effect
//! that reads `x` only through a computed still re-runs when `x` changes.

use crate::error::Error;
use crate::reactive::context;
use crate::reactive::watcher::{WatchOptions, WatchTarget, Watcher};
use crate::value::Value;

/// A cached derived value.
///
/// Clones share the same cache and dependency state.
#[derive(Clone)]
pub struct Computed {
    watcher: Watcher,
}

impl Computed {
    /// Create a computed value over `getter`, evaluated against `owner`.
    ///
    /// Nothing is evaluated until the first [`get`](Computed::get).
    pub fn new(
        owner: Value,
        getter: impl Fn(&Value) -> Result<Value, Error> + Send + Sync + 'static,
    ) -> Result<Computed, Error> {
        let watcher = Watcher::new(
            owner,
            WatchTarget::func(getter),
            |_, _| {},
            WatchOptions {
                lazy: true,
                ..WatchOptions::default()
            },
        )?;
        Ok(Computed { watcher })
    }

    /// Read the computed value, recomputing if stale.
    ///
    /// When a computation is currently evaluating, the computed value's own
    /// dependencies are registered with it as well, making the dependence
    /// transitive.
    pub fn get(&self) -> Result<Value, Error> {
        if self.watcher.is_dirty() {
            self.watcher.evaluate()?;
        }
        if context::is_tracking() {
            self.watcher.depend();
        }
        Ok(self.watcher.value())
    }

    /// Whether the cache is stale. A fresh computed value starts dirty.
    pub fn is_dirty(&self) -> bool {
        self.watcher.is_dirty()
    }

    /// Unsubscribe from all dependencies. Further reads return the last
    /// cached value without recomputing.
    pub fn teardown(&self) {
        self.watcher.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{observe, Object};
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc;

    fn observed_pair() -> (Object, Value) {
        let obj = Object::new();
        obj.set("a", Value::Int(1));
        obj.set("b", Value::Int(2));
        let value = Value::Object(obj.clone());
        observe(&value);
        (obj, value)
    }

    fn sum_computed(owner: Value, evals: Arc<AtomicI32>) -> Computed {
        Computed::new(owner, move |scope| {
            evals.fetch_add(1, Ordering::SeqCst);
            let scope = scope.as_object().expect("owner is an object");
            let a = scope.get("a").as_int().unwrap_or(0);
            let b = scope.get("b").as_int().unwrap_or(0);
            Ok(Value::Int(a + b))
        })
        .expect("construction does not evaluate")
    }

    #[test]
    fn recomputes_only_when_dirty() {
        let (obj, owner) = observed_pair();
        let evals = Arc::new(AtomicI32::new(0));
        let computed = sum_computed(owner, evals.clone());

        assert!(computed.is_dirty());
        assert_eq!(computed.get().expect("getter succeeds").as_int(), Some(3));
        assert_eq!(computed.get().expect("getter succeeds").as_int(), Some(3));
        assert_eq!(evals.load(Ordering::SeqCst), 1);

        obj.set("a", Value::Int(10));
        assert!(computed.is_dirty());
        assert_eq!(computed.get().expect("getter succeeds").as_int(), Some(12));
        assert_eq!(evals.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unrelated_mutation_does_not_invalidate() {
        let (obj, owner) = observed_pair();
        obj.set("unrelated", Value::Int(0));
        let evals = Arc::new(AtomicI32::new(0));
        let computed = sum_computed(owner, evals.clone());

        computed.get().expect("getter succeeds");
        obj.set("unrelated", Value::Int(99));
        assert!(!computed.is_dirty());
        computed.get().expect("getter succeeds");
        assert_eq!(evals.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dependence_through_a_computed_is_transitive() {
        let (obj, owner) = observed_pair();
        let evals = Arc::new(AtomicI32::new(0));
        let computed = sum_computed(owner.clone(), evals.clone());

        let runs = Arc::new(AtomicI32::new(0));
        let runs_in_cb = runs.clone();
        let computed_in_getter = computed.clone();
        let _effect = Watcher::new(
            owner,
            WatchTarget::func(move |_| computed_in_getter.get()),
            move |_, _| {
                runs_in_cb.fetch_add(1, Ordering::SeqCst);
            },
            WatchOptions {
                sync: true,
                ..WatchOptions::default()
            },
        )
        .expect("getter succeeds");

        // The effect read "a" only through the computed; mutating "a" must
        // still re-run it.
        obj.set("a", Value::Int(5));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(computed.get().expect("getter succeeds").as_int(), Some(7));
    }

    #[test]
    fn teardown_freezes_the_cached_value() {
        let (obj, owner) = observed_pair();
        let evals = Arc::new(AtomicI32::new(0));
        let computed = sum_computed(owner, evals.clone());

        assert_eq!(computed.get().expect("getter succeeds").as_int(), Some(3));
        computed.teardown();

        obj.set("a", Value::Int(100));
        assert!(!computed.is_dirty());
        assert_eq!(computed.get().expect("getter succeeds").as_int(), Some(3));
        assert_eq!(evals.load(Ordering::SeqCst), 1);
    }
}
