//! Observable Data Model
//!
//! Rust has no implicit property-accessor rewriting, so the engine defines
//! an explicit dynamic value tree that all reads and writes go through:
//!
//! - [`Value`] is a JSON-like dynamic value: primitives plus shared
//!   [`Object`] and [`List`] containers.
//! - Containers are cheap clones (`Arc` handles); identity is pointer
//!   identity, which is what change detection compares for composites.
//! - A container starts *inert*: reads and writes are plain storage. Calling
//!   [`observe`](crate::value::observe) attaches an [`Observer`], which wires
//!   every object field through a per-field dependency set and intercepts
//!   the list mutators. From then on, reads performed while a computation is
//!   active register dependencies, and writes notify subscribers.
//!
//! # Reads and writes
//!
//! `Object::get` is the read path: it registers the field's dependency set
//! with the active computation, plus the child container's dependency set
//! (so "replace the whole object" and "mutate a nested list" are both
//! tracked), recursing into nested lists.
//!
//! `Object::set` is the write path: reference-equal writes (including
//! `NaN`/`NaN`) are suppressed; otherwise the new value is stored, observed,
//! and the field's subscribers notified.

mod list;
mod object;
mod observer;

pub use list::List;
pub use object::Object;
pub use observer::{
    define_reactive, delete_key, is_observing, observe, observe_root, set_key, toggle_observing,
    MemberKey, Observer,
};

use std::fmt;
use std::sync::Arc;

/// A dynamic observable value.
///
/// Primitives are stored inline; objects and lists are shared handles.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Object(Object),
    List(List),
}

impl Value {
    /// Whether this value is a container (object or list).
    ///
    /// Composite values always fire watcher callbacks on invalidation even
    /// when the handle is unchanged, because internal mutation cannot be
    /// detected by identity comparison alone.
    pub fn is_composite(&self) -> bool {
        matches!(self, Value::Object(_) | Value::List(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The unchanged-value rule: identity for containers, equality for
    /// primitives, with `NaN` considered equal to `NaN`.
    pub fn same_value(a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(x), Value::Bool(y)) => x == y,
            (Value::Int(x), Value::Int(y)) => x == y,
            (Value::Float(x), Value::Float(y)) => x == y || (x.is_nan() && y.is_nan()),
            (Value::Str(x), Value::Str(y)) => x == y,
            (Value::Object(x), Value::Object(y)) => x.ptr_eq(y),
            (Value::List(x), Value::List(y)) => x.ptr_eq(y),
            _ => false,
        }
    }

    /// The observer attached to this value, if it is an observed container.
    pub fn observer(&self) -> Option<Arc<Observer>> {
        match self {
            Value::Object(obj) => obj.observer(),
            Value::List(list) => list.observer(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&List> {
        match self {
            Value::List(list) => Some(list),
            _ => None,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Object(obj) => obj.fmt(f),
            Value::List(list) => list.fmt(f),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n.into())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Object> for Value {
    fn from(obj: Object) -> Self {
        Value::Object(obj)
    }
}

impl From<List> for Value {
    fn from(list: List) -> Self {
        Value::List(list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_value_primitives() {
        assert!(Value::same_value(&Value::Int(1), &Value::Int(1)));
        assert!(!Value::same_value(&Value::Int(1), &Value::Int(2)));
        assert!(!Value::same_value(&Value::Int(1), &Value::Float(1.0)));
        assert!(Value::same_value(&Value::Null, &Value::Null));
        assert!(Value::same_value(&Value::from("a"), &Value::from("a")));
    }

    #[test]
    fn same_value_nan_is_unchanged() {
        let nan = Value::Float(f64::NAN);
        assert!(Value::same_value(&nan, &Value::Float(f64::NAN)));
        assert!(!Value::same_value(&nan, &Value::Float(0.0)));
    }

    #[test]
    fn same_value_containers_compare_identity() {
        let a = Object::new();
        let b = Object::new();
        assert!(Value::same_value(
            &Value::Object(a.clone()),
            &Value::Object(a.clone())
        ));
        assert!(!Value::same_value(&Value::Object(a), &Value::Object(b)));
    }

    #[test]
    fn composite_detection() {
        assert!(Value::Object(Object::new()).is_composite());
        assert!(Value::List(List::new()).is_composite());
        assert!(!Value::Int(0).is_composite());
    }
}
