//! Weft Core
//!
//! This crate provides the reactivity engine for the Weft UI framework.
//! It implements:
//!
//! - Dependency tracking (dependency sets, the active-computation stack)
//! - Watchers: path and closure targets, deep/lazy/sync/user flavors
//! - A deferred flush scheduler with batching, ordering, and a runaway
//!   guard
//! - An observable dynamic value tree (objects, lists, intercepted
//!   mutators)
//! - Lazy computed values
//!
//! The crate has no rendering, template, or component-lifecycle knowledge;
//! those layers sit on top and drive the engine through `Value`, `Watcher`,
//! and the `next_tick` seam.
//!
//! # Architecture
//!
//! The crate is organized into a few modules:
//!
//! - `reactive`: dependency tracking, watchers, scheduling
//! - `value`: the observable data model
//! - `config`: runtime switches (async flushing, server rendering)
//! - `error`: the error taxonomy
//!
//! # Example
//!
//! ```rust
//! use weft_core::reactive::{run_tasks, WatchOptions, Watcher};
//! use weft_core::value::{observe, Object, Value};
//!
//! // Build and observe a scope.
//! let scope = Object::new();
//! scope.set("count", Value::Int(0));
//! let data = Value::Object(scope.clone());
//! observe(&data);
//!
//! // Watch a property path.
//! let watcher = Watcher::new(
//!     data,
//!     "count",
//!     |new, old| println!("count: {:?} -> {:?}", old, new),
//!     WatchOptions::default(),
//! )
//! .unwrap();
//!
//! // Mutations batch; the watcher runs once at the next tick.
//! scope.set("count", Value::Int(1));
//! scope.set("count", Value::Int(2));
//! run_tasks();
//! assert_eq!(watcher.value().as_int(), Some(2));
//! ```

pub mod config;
pub mod error;
pub mod reactive;
pub mod value;

pub use error::Error;
pub use reactive::{Computed, WatchOptions, WatchTarget, Watcher};
pub use value::{observe, List, Object, Value};
