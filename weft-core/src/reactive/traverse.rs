//! Deep Traversal
//!
//! Recursively reads every reachable property of a value so that, during an
//! evaluation, each of them registers with the active watcher. Used by
//! `deep` watchers after their getter returns. A seen-set of container
//! dependency ids cuts cycles in self-referencing structures.

use std::collections::HashSet;

use crate::value::Value;

/// Visit every reachable property of `value`, performing tracking reads.
pub fn traverse(value: &Value) {
    let mut seen = HashSet::new();
    traverse_inner(value, &mut seen);
}

fn traverse_inner(value: &Value, seen: &mut HashSet<u64>) {
    match value {
        Value::Object(obj) => {
            if let Some(observer) = obj.observer() {
                if !seen.insert(observer.dep().id()) {
                    return;
                }
            }
            for key in obj.keys() {
                // Tracking read: registers the field dep with the active
                // watcher before descending.
                let child = obj.get(&key);
                traverse_inner(&child, seen);
            }
        }
        Value::List(list) => {
            if let Some(observer) = list.observer() {
                if !seen.insert(observer.dep().id()) {
                    return;
                }
            }
            for item in list.to_vec() {
                traverse_inner(&item, seen);
            }
        }
        _ => {}
    }
}
