//! Reactive Engine
//!
//! This module implements the core reactive system: dependency sets,
//! watchers, and the deferred flush scheduler.
//!
//! # Concepts
//!
//! ## Dependency sets
//!
//! Every reactive property owns a [`Dep`], the set of watchers currently
//! interested in it. Reading the property during an evaluation subscribes
//! the evaluating watcher; writing it notifies every subscriber.
//!
//! ## Watchers
//!
//! A [`Watcher`] is one unit of reactive work: it evaluates a target (a
//! property path or a getter closure), records exactly what it read, and
//! re-runs when any of it changes. Option flags turn the same type into a
//! lazy computed source, a synchronous watcher, or a deep watcher that
//! subscribes to every nested property of its result.
//!
//! ## Scheduling
//!
//! Invalidated watchers are queued and deduplicated, then flushed in
//! creation order at the next tick, so a burst of mutations costs each
//! affected watcher one re-evaluation. The engine does not own an event
//! loop; [`next_tick`]/[`run_tasks`] is the seam the host drives.
//!
//! # Implementation Notes
//!
//! Dependency detection is automatic: a thread-local stack records which
//! watcher is currently evaluating, and every tracked read registers with
//! the top of the stack. Subscriptions are reconciled after each
//! evaluation, so a watcher's dependency set always equals exactly what its
//! last evaluation read.

mod computed;
mod context;
mod dep;
mod scheduler;
mod traverse;
mod watcher;

pub use computed::Computed;
pub use context::is_tracking;
pub use dep::Dep;
pub use scheduler::{
    flush_queue, has_pending_tasks, next_tick, queue_watcher, run_tasks, set_tick_hook,
    MAX_UPDATE_COUNT,
};
pub use traverse::traverse;
pub use watcher::{WatchOptions, WatchTarget, Watcher};
