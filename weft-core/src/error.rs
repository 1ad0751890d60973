//! Error types for the reactivity engine.
//!
//! Recoverable misuse (writing where reactivity cannot observe, watching an
//! unparsable expression) is reported through `tracing` and execution
//! continues with a safe fallback. Failures that leave a computation without
//! a value are surfaced as `Error` and propagate to the caller.

use thiserror::Error;

/// Errors produced by the reactivity engine.
#[derive(Debug, Error)]
pub enum Error {
    /// A watcher's evaluator failed to produce a value.
    ///
    /// For user-registered watchers this is reported and the flush continues;
    /// for render/computed watchers it propagates, since failing to produce
    /// a value is fatal to that computation.
    #[error("evaluation of watcher \"{expression}\" failed: {message}")]
    Evaluation {
        /// The watched expression (or `"function()"` for closure getters).
        expression: String,
        /// Human-readable failure description.
        message: String,
    },

    /// A structural mutation (`set_key` / `delete_key`) was rejected.
    #[error("invalid mutation target: {0}")]
    InvalidTarget(&'static str),
}
