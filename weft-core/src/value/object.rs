//! Keyed Object Container
//!
//! An [`Object`] is an insertion-ordered map of string keys to [`Value`]s.
//! Fields start inert (plain storage); observation wires each field through
//! a per-field dependency set, after which `get` tracks and `set` notifies.
//!
//! Two flags restrict observation and structural mutation:
//!
//! - `extensible`: cleared via [`Object::prevent_extensions`], makes
//!   `observe` skip the object entirely (the counterpart of freezing).
//! - `instance`: marks framework instances. They are never wrapped, and
//!   programmatic `set_key`/`delete_key` on them is rejected.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::reactive::Dep;
use crate::value::observer::{depend_list, Observer};
use crate::value::Value;

/// Per-write hook, invoked after a write is accepted. Outer layers use it to
/// warn about mutations they want to discourage (e.g. writing to a prop).
pub(crate) type CustomSetter = Arc<dyn Fn() + Send + Sync>;

/// One object field: its value plus the reactive wiring attached by
/// `define_reactive`. `dep` is `None` while the field is inert.
pub(crate) struct Field {
    pub(crate) value: Value,
    pub(crate) dep: Option<Arc<Dep>>,
    pub(crate) shallow: bool,
    pub(crate) custom_setter: Option<CustomSetter>,
}

impl Field {
    fn inert(value: Value) -> Self {
        Field {
            value,
            dep: None,
            shallow: false,
            custom_setter: None,
        }
    }
}

struct ObjectInner {
    fields: RwLock<IndexMap<String, Field>>,
    observer: RwLock<Option<Arc<Observer>>>,
    extensible: AtomicBool,
    instance: AtomicBool,
}

/// A shared, observable keyed container.
///
/// Clones share the same storage; identity is pointer identity.
#[derive(Clone)]
pub struct Object {
    inner: Arc<ObjectInner>,
}

impl Object {
    pub fn new() -> Self {
        Object {
            inner: Arc::new(ObjectInner {
                fields: RwLock::new(IndexMap::new()),
                observer: RwLock::new(None),
                extensible: AtomicBool::new(true),
                instance: AtomicBool::new(false),
            }),
        }
    }

    /// Read a field, registering dependencies when a computation is active.
    ///
    /// Returns `Value::Null` for a missing key. On a wired field this
    /// registers the field's dependency set, the child container's
    /// dependency set if the value is observed, and every nested list
    /// container recursively.
    pub fn get(&self, key: &str) -> Value {
        let (value, dep, shallow) = {
            let fields = self.inner.fields.read();
            match fields.get(key) {
                None => return Value::Null,
                Some(field) => (field.value.clone(), field.dep.clone(), field.shallow),
            }
        };
        if let Some(dep) = &dep {
            dep.depend();
            if !shallow {
                if let Some(child_ob) = value.observer() {
                    child_ob.dep().depend();
                    if let Value::List(list) = &value {
                        depend_list(list);
                    }
                }
            }
        }
        value
    }

    /// Read a field without registering any dependency.
    pub fn get_untracked(&self, key: &str) -> Value {
        self.inner
            .fields
            .read()
            .get(key)
            .map(|field| field.value.clone())
            .unwrap_or(Value::Null)
    }

    /// Write a field.
    ///
    /// On a wired field this is the intercepted write path: reference-equal
    /// writes (including `NaN`/`NaN`) are suppressed, otherwise the value is
    /// stored, observed (unless the field is shallow), and subscribers are
    /// notified. Writes to inert fields and inserts of new keys are plain
    /// storage; use [`set_key`](crate::value::set_key) to add a key
    /// reactively after observation.
    pub fn set(&self, key: &str, value: Value) {
        let wired = {
            let mut fields = self.inner.fields.write();
            match fields.get_mut(key) {
                None => {
                    fields.insert(key.to_owned(), Field::inert(value));
                    None
                }
                Some(field) => match field.dep.clone() {
                    None => {
                        field.value = value;
                        None
                    }
                    Some(dep) => {
                        if Value::same_value(&field.value, &value) {
                            None
                        } else {
                            field.value = value.clone();
                            Some((dep, field.custom_setter.clone(), field.shallow, value))
                        }
                    }
                },
            }
        };
        if let Some((dep, custom_setter, shallow, value)) = wired {
            if let Some(custom_setter) = custom_setter {
                custom_setter();
            }
            if !shallow {
                crate::value::observe(&value);
            }
            dep.notify();
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.fields.read().contains_key(key)
    }

    /// Snapshot of the keys in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.inner.fields.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.fields.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.fields.read().is_empty()
    }

    pub fn ptr_eq(&self, other: &Object) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Forbid observation of this object.
    pub fn prevent_extensions(&self) {
        self.inner.extensible.store(false, Ordering::Relaxed);
    }

    pub fn is_extensible(&self) -> bool {
        self.inner.extensible.load(Ordering::Relaxed)
    }

    /// Mark this object as a framework instance: never wrapped, structural
    /// mutation rejected.
    pub fn mark_instance(&self) {
        self.inner.instance.store(true, Ordering::Relaxed);
    }

    pub fn is_instance(&self) -> bool {
        self.inner.instance.load(Ordering::Relaxed)
    }

    pub fn observer(&self) -> Option<Arc<Observer>> {
        self.inner.observer.read().clone()
    }

    pub(crate) fn set_observer(&self, observer: Arc<Observer>) {
        *self.inner.observer.write() = Some(observer);
    }

    /// Replace a field with a fully wired one. Used by `define_reactive`.
    pub(crate) fn wire_field(
        &self,
        key: &str,
        value: Value,
        dep: Arc<Dep>,
        custom_setter: Option<CustomSetter>,
        shallow: bool,
    ) {
        self.inner.fields.write().insert(
            key.to_owned(),
            Field {
                value,
                dep: Some(dep),
                shallow,
                custom_setter,
            },
        );
    }

    /// Remove a field outright, returning its value. Used by `delete_key`;
    /// performs no notification itself.
    pub(crate) fn remove_field(&self, key: &str) -> Option<Value> {
        self.inner
            .fields
            .write()
            .shift_remove(key)
            .map(|field| field.value)
    }
}

impl Default for Object {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields = self.inner.fields.read();
        let mut map = f.debug_map();
        for (key, field) in fields.iter() {
            map.entry(key, &field.value);
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_get_and_set() {
        let obj = Object::new();
        assert!(obj.get("a").is_null());

        obj.set("a", Value::Int(1));
        assert_eq!(obj.get("a").as_int(), Some(1));
        assert_eq!(obj.get_untracked("a").as_int(), Some(1));
        assert!(obj.contains_key("a"));
        assert_eq!(obj.len(), 1);
    }

    #[test]
    fn keys_preserve_insertion_order() {
        let obj = Object::new();
        obj.set("b", Value::Int(1));
        obj.set("a", Value::Int(2));
        obj.set("c", Value::Int(3));
        assert_eq!(obj.keys(), vec!["b", "a", "c"]);
    }

    #[test]
    fn clones_share_storage() {
        let obj = Object::new();
        let alias = obj.clone();
        obj.set("x", Value::Int(7));
        assert_eq!(alias.get("x").as_int(), Some(7));
        assert!(obj.ptr_eq(&alias));
        assert!(!obj.ptr_eq(&Object::new()));
    }

    #[test]
    fn flags_default_open() {
        let obj = Object::new();
        assert!(obj.is_extensible());
        assert!(!obj.is_instance());

        obj.prevent_extensions();
        obj.mark_instance();
        assert!(!obj.is_extensible());
        assert!(obj.is_instance());
    }
}
