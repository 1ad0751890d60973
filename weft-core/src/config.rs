//! Runtime switches.
//!
//! These mirror the flags an embedding framework toggles around the engine:
//! whether invalidated watchers are flushed asynchronously (the default) or
//! inline, and whether the current context is server-rendering, in which
//! case no value is ever wrapped for observation.
//!
//! Like the scheduler and the active-computation stack, the switches are
//! thread-local: each logical event loop configures its own engine.

use std::cell::Cell;

thread_local! {
    static ASYNC: Cell<bool> = const { Cell::new(true) };
    static SERVER_RENDERING: Cell<bool> = const { Cell::new(false) };
}

/// Whether watcher flushes are deferred to the next tick.
///
/// When disabled, the first invalidation of an idle period flushes the
/// scheduler queue immediately. Intended for debugging and compatibility;
/// it defeats batching.
pub fn is_async() -> bool {
    ASYNC.with(Cell::get)
}

/// Toggle asynchronous (batched) flushing.
pub fn set_async(enabled: bool) {
    ASYNC.with(|flag| flag.set(enabled));
}

/// Whether the current context is server-rendering.
pub fn is_server_rendering() -> bool {
    SERVER_RENDERING.with(Cell::get)
}

/// Mark the current context as server-rendering. Observation becomes a
/// no-op.
pub fn set_server_rendering(enabled: bool) {
    SERVER_RENDERING.with(|flag| flag.set(enabled));
}
