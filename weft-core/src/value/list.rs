//! Sequence Container with Intercepted Mutators
//!
//! Element access on a list is not tracked per index; tracking flows through
//! the owning field's dependency set and the list's container dependency
//! set. What *is* intercepted is the fixed set of mutating operations:
//! `push`, `pop`, `shift`, `unshift`, `splice`, `sort_by`, `reverse`. Once
//! the list is observed, every mutator observes any newly inserted elements
//! and then fires the container dependency set.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::value::observer::Observer;
use crate::value::Value;

struct ListInner {
    items: RwLock<Vec<Value>>,
    observer: RwLock<Option<Arc<Observer>>>,
}

/// A shared, observable sequence container.
///
/// Clones share the same storage; identity is pointer identity.
#[derive(Clone)]
pub struct List {
    inner: Arc<ListInner>,
}

impl List {
    pub fn new() -> Self {
        List::from_vec(Vec::new())
    }

    pub fn from_vec(items: Vec<Value>) -> Self {
        List {
            inner: Arc::new(ListInner {
                items: RwLock::new(items),
                observer: RwLock::new(None),
            }),
        }
    }

    /// Read one element. Not individually tracked.
    pub fn get(&self, index: usize) -> Option<Value> {
        self.inner.items.read().get(index).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.items.read().is_empty()
    }

    /// Snapshot of the current elements.
    pub fn to_vec(&self) -> Vec<Value> {
        self.inner.items.read().clone()
    }

    pub fn ptr_eq(&self, other: &List) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn observer(&self) -> Option<Arc<Observer>> {
        self.inner.observer.read().clone()
    }

    pub(crate) fn set_observer(&self, observer: Arc<Observer>) {
        *self.inner.observer.write() = Some(observer);
    }

    pub fn push(&self, value: Value) {
        self.inner.items.write().push(value.clone());
        self.after_mutation(&[value]);
    }

    pub fn pop(&self) -> Option<Value> {
        let removed = self.inner.items.write().pop();
        self.after_mutation(&[]);
        removed
    }

    /// Remove and return the first element.
    pub fn shift(&self) -> Option<Value> {
        let removed = {
            let mut items = self.inner.items.write();
            if items.is_empty() {
                None
            } else {
                Some(items.remove(0))
            }
        };
        self.after_mutation(&[]);
        removed
    }

    /// Insert an element at the front.
    pub fn unshift(&self, value: Value) {
        self.inner.items.write().insert(0, value.clone());
        self.after_mutation(&[value]);
    }

    /// Remove `delete_count` elements starting at `start`, inserting
    /// `inserted` in their place. Returns the removed elements.
    pub fn splice(&self, start: usize, delete_count: usize, inserted: Vec<Value>) -> Vec<Value> {
        let removed = {
            let mut items = self.inner.items.write();
            let start = start.min(items.len());
            let end = (start + delete_count).min(items.len());
            items.splice(start..end, inserted.iter().cloned()).collect()
        };
        self.after_mutation(&inserted);
        removed
    }

    pub fn sort_by(&self, compare: impl FnMut(&Value, &Value) -> std::cmp::Ordering) {
        self.inner.items.write().sort_by(compare);
        self.after_mutation(&[]);
    }

    pub fn reverse(&self) {
        self.inner.items.write().reverse();
        self.after_mutation(&[]);
    }

    /// Extend with `Null` up to `len` without notifying. Length growth alone
    /// is not an intercepted mutation; the caller follows up with a splice.
    pub(crate) fn pad_to(&self, len: usize) {
        let mut items = self.inner.items.write();
        if items.len() < len {
            items.resize(len, Value::Null);
        }
    }

    /// Post-mutator hook: observe what was inserted, then fire the
    /// container dependency set. Inert until the list is observed.
    fn after_mutation(&self, inserted: &[Value]) {
        if let Some(observer) = self.observer() {
            for value in inserted {
                crate::value::observe(value);
            }
            observer.dep().notify();
        }
    }
}

impl Default for List {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for List {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.inner.items.read().iter()).finish()
    }
}
