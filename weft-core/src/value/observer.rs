//! Reactive Property Interceptor
//!
//! [`observe`] attaches an [`Observer`] to a container value. For objects it
//! converts every field into an intercepted accessor pair (the read path
//! collects dependencies, the write path dispatches updates); for lists it
//! recursively observes every element, while the list's own mutators handle
//! interception. The observer owns the *container* dependency set: the Dep
//! representing "this value as a whole", fired on structural changes and
//! list mutations.
//!
//! Observation is idempotent: a value is observed at most once, and
//! re-observing returns the existing observer. Primitives, framework
//! instances, and non-extensible objects are never wrapped.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::config;
use crate::error::Error;
use crate::reactive::Dep;
use crate::value::object::CustomSetter;
use crate::value::{List, Object, Value};

use std::cell::Cell;

thread_local! {
    /// Whether observation is currently enabled. Outer layers disable it
    /// while wiring values that must stay shallow (e.g. props on non-root
    /// instances).
    static SHOULD_OBSERVE: Cell<bool> = Cell::new(true);
}

/// Enable or disable observation on this thread.
pub fn toggle_observing(enabled: bool) {
    SHOULD_OBSERVE.with(|flag| flag.set(enabled));
}

/// Whether observation is currently enabled on this thread.
pub fn is_observing() -> bool {
    SHOULD_OBSERVE.with(Cell::get)
}

/// Attached to each observed container. Owns the container dependency set
/// and counts how many roots use the value as their root data.
pub struct Observer {
    dep: Arc<Dep>,
    root_count: AtomicUsize,
}

impl Observer {
    fn new() -> Self {
        Observer {
            dep: Arc::new(Dep::new()),
            root_count: AtomicUsize::new(0),
        }
    }

    /// The container dependency set: "this value as a whole".
    pub fn dep(&self) -> &Arc<Dep> {
        &self.dep
    }

    /// How many roots hold this value as their root data. Structural
    /// mutation of root data is rejected.
    pub fn root_count(&self) -> usize {
        self.root_count.load(Ordering::Relaxed)
    }

    fn mark_root(&self) {
        self.root_count.fetch_add(1, Ordering::Relaxed);
    }
}

/// Attempt to observe a value.
///
/// Returns the existing observer if the value already carries one.
/// Otherwise a new observer is attached iff observation is enabled, the
/// process is not server-rendering, and the value is an extensible,
/// non-instance container. Anything else stays inert and `None` is
/// returned.
pub fn observe(value: &Value) -> Option<Arc<Observer>> {
    if let Some(existing) = value.observer() {
        return Some(existing);
    }
    if !is_observing() || config::is_server_rendering() {
        return None;
    }
    match value {
        Value::Object(obj) => {
            if !obj.is_extensible() || obj.is_instance() {
                return None;
            }
            let observer = Arc::new(Observer::new());
            // Attach before walking so self-referencing structures
            // terminate.
            obj.set_observer(observer.clone());
            for key in obj.keys() {
                let val = obj.get_untracked(&key);
                define_reactive(obj, &key, val, None, false);
            }
            Some(observer)
        }
        Value::List(list) => {
            let observer = Arc::new(Observer::new());
            list.set_observer(observer.clone());
            for item in list.to_vec() {
                observe(&item);
            }
            Some(observer)
        }
        _ => None,
    }
}

/// Observe a value used as root data, bumping the observer's root count.
pub fn observe_root(value: &Value) -> Option<Arc<Observer>> {
    let observer = observe(value)?;
    observer.mark_root();
    Some(observer)
}

/// Wire one object field as a reactive property.
///
/// Creates a fresh dependency set for the field, observes the value (unless
/// `shallow`), and installs the intercepted accessor pair. `custom_setter`
/// is invoked on every accepted write.
pub fn define_reactive(
    obj: &Object,
    key: &str,
    value: Value,
    custom_setter: Option<CustomSetter>,
    shallow: bool,
) {
    let dep = Arc::new(Dep::new());
    if !shallow {
        observe(&value);
    }
    obj.wire_field(key, value, dep, custom_setter, shallow);
}

/// A member key for programmatic structural mutation: a list index or an
/// object field name.
#[derive(Debug, Clone, Copy)]
pub enum MemberKey<'a> {
    Index(usize),
    Name(&'a str),
}

impl<'a> From<usize> for MemberKey<'a> {
    fn from(index: usize) -> Self {
        MemberKey::Index(index)
    }
}

impl<'a> From<&'a str> for MemberKey<'a> {
    fn from(name: &'a str) -> Self {
        MemberKey::Name(name)
    }
}

/// Programmatically add or replace a member after initial observation.
///
/// Lists implement addition as a replace-and-reinsert splice at the index so
/// the mutation interception fires. Objects adding a previously missing key
/// wire it reactively and fire the container dependency set. Structural
/// addition on a framework instance or a root data container is rejected.
pub fn set_key<'a>(
    target: &Value,
    key: impl Into<MemberKey<'a>>,
    value: Value,
) -> Result<Value, Error> {
    match (target, key.into()) {
        (Value::List(list), MemberKey::Index(index)) => {
            list.pad_to(index);
            list.splice(index, 1, vec![value.clone()]);
            Ok(value)
        }
        (Value::Object(obj), MemberKey::Name(name)) => {
            if obj.contains_key(name) {
                obj.set(name, value.clone());
                return Ok(value);
            }
            let observer = obj.observer();
            if obj.is_instance() || observer.as_ref().is_some_and(|ob| ob.root_count() > 0) {
                tracing::warn!(
                    key = name,
                    "avoid adding reactive properties to an instance or its root data \
                     at runtime; declare them upfront"
                );
                return Err(Error::InvalidTarget(
                    "cannot add properties to an instance or root data at runtime",
                ));
            }
            match observer {
                None => {
                    // Target was never observed; plain storage.
                    obj.set(name, value.clone());
                    Ok(value)
                }
                Some(observer) => {
                    define_reactive(obj, name, value.clone(), None, false);
                    observer.dep().notify();
                    Ok(value)
                }
            }
        }
        (Value::List(_), MemberKey::Name(_)) => {
            tracing::warn!("cannot set a named key on a list");
            Err(Error::InvalidTarget("lists require an index key"))
        }
        (Value::Object(_), MemberKey::Index(_)) => {
            tracing::warn!("cannot set an index on an object");
            Err(Error::InvalidTarget("objects require a name key"))
        }
        _ => {
            tracing::warn!("cannot set a reactive property on a primitive value");
            Err(Error::InvalidTarget(
                "cannot set a reactive property on a primitive value",
            ))
        }
    }
}

/// Programmatically remove a member, notifying if the target is observed.
pub fn delete_key<'a>(target: &Value, key: impl Into<MemberKey<'a>>) -> Result<(), Error> {
    match (target, key.into()) {
        (Value::List(list), MemberKey::Index(index)) => {
            list.splice(index, 1, Vec::new());
            Ok(())
        }
        (Value::Object(obj), MemberKey::Name(name)) => {
            let observer = obj.observer();
            if obj.is_instance() || observer.as_ref().is_some_and(|ob| ob.root_count() > 0) {
                tracing::warn!(
                    key = name,
                    "avoid deleting properties on an instance or its root data; \
                     set the value to null instead"
                );
                return Err(Error::InvalidTarget(
                    "cannot delete properties on an instance or root data",
                ));
            }
            if obj.remove_field(name).is_none() {
                return Ok(());
            }
            if let Some(observer) = observer {
                observer.dep().notify();
            }
            Ok(())
        }
        (Value::List(_), MemberKey::Name(_)) => {
            tracing::warn!("cannot delete a named key on a list");
            Err(Error::InvalidTarget("lists require an index key"))
        }
        (Value::Object(_), MemberKey::Index(_)) => {
            tracing::warn!("cannot delete an index on an object");
            Err(Error::InvalidTarget("objects require a name key"))
        }
        _ => {
            tracing::warn!("cannot delete a reactive property on a primitive value");
            Err(Error::InvalidTarget(
                "cannot delete a reactive property on a primitive value",
            ))
        }
    }
}

/// Register the container dependency set of every element, recursively.
///
/// Element access cannot be intercepted like field access, so a tracking
/// read of a list subscribes to every nested container explicitly.
pub(crate) fn depend_list(list: &List) {
    for item in list.to_vec() {
        if let Some(observer) = item.observer() {
            observer.dep().depend();
        }
        if let Value::List(nested) = &item {
            depend_list(nested);
        }
    }
}
