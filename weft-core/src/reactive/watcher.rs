//! Reactive Computation
//!
//! A [`Watcher`] is one unit of reactive work: a render, a computed value,
//! or a user-registered watch expression. It knows how to evaluate its
//! target, records exactly the dependency sets it read during the last
//! evaluation, and re-runs when any of them notifies.
//!
//! # Flavors
//!
//! All flavors share one type, differentiated by option flags rather than
//! subtyping:
//!
//! - `lazy`: computed-style. Invalidation only marks the value dirty; the
//!   next read recomputes.
//! - `sync`: re-evaluates inline on invalidation instead of going through
//!   the scheduler.
//! - `user`: user-registered. Evaluation errors are reported and isolated
//!   instead of propagating.
//! - `deep`: the evaluated value is traversed recursively so every nested
//!   property becomes a dependency, and the callback fires on every
//!   invalidation.
//!
//! # Subscription reconciliation
//!
//! Each evaluation collects dependencies into a fresh working set. When
//! evaluation finishes, any dependency present in the previous set but not
//! the new one is unsubscribed, then the sets are swapped. The recorded
//! dependency set therefore always equals exactly what the last evaluation
//! read.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::error::Error;
use crate::reactive::context;
use crate::reactive::dep::Dep;
use crate::reactive::scheduler;
use crate::reactive::traverse::traverse;
use crate::value::Value;

/// Counter for generating unique watcher ids. Flush order is ascending id
/// order, so creation order is execution order.
static WATCHER_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_watcher_id() -> u64 {
    WATCHER_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

type GetterFn = Box<dyn Fn(&Value) -> Result<Value, Error> + Send + Sync>;
type Callback = Box<dyn Fn(&Value, &Value) + Send + Sync>;
type BeforeHook = Box<dyn Fn() + Send + Sync>;

/// What a watcher evaluates: a dot-delimited property path resolved against
/// the owner value, or an arbitrary getter closure.
pub enum WatchTarget {
    Expr(String),
    Func(GetterFn),
}

impl WatchTarget {
    pub fn func(f: impl Fn(&Value) -> Result<Value, Error> + Send + Sync + 'static) -> Self {
        WatchTarget::Func(Box::new(f))
    }
}

impl From<&str> for WatchTarget {
    fn from(path: &str) -> Self {
        WatchTarget::Expr(path.to_owned())
    }
}

impl From<String> for WatchTarget {
    fn from(path: String) -> Self {
        WatchTarget::Expr(path)
    }
}

/// Behavior flags and hooks for watcher construction.
pub struct WatchOptions {
    pub deep: bool,
    pub user: bool,
    pub lazy: bool,
    pub sync: bool,
    /// Invoked by the scheduler right before `run()` during a flush.
    pub before: Option<BeforeHook>,
}

impl Default for WatchOptions {
    fn default() -> Self {
        WatchOptions {
            deep: false,
            user: false,
            lazy: false,
            sync: false,
            before: None,
        }
    }
}

enum Getter {
    Path(Vec<String>),
    Func(GetterFn),
    /// Fallback for unparsable paths; always evaluates to `Null`.
    Noop,
}

/// Working sets for subscription reconciliation across evaluations.
#[derive(Default)]
struct TrackState {
    deps: SmallVec<[Arc<Dep>; 4]>,
    new_deps: SmallVec<[Arc<Dep>; 4]>,
    dep_ids: HashSet<u64>,
    new_dep_ids: HashSet<u64>,
}

pub(crate) struct WatcherInner {
    id: u64,
    owner: Value,
    getter: Getter,
    expression: String,
    callback: Callback,
    before: Option<BeforeHook>,
    deep: bool,
    user: bool,
    lazy: bool,
    sync: bool,
    active: AtomicBool,
    dirty: AtomicBool,
    value: Mutex<Value>,
    track: Mutex<TrackState>,
}

/// A reactive computation. Clones share the same state.
#[derive(Clone)]
pub struct Watcher {
    inner: Arc<WatcherInner>,
}

/// Weak handle stored in dependency sets so a Dep never keeps a torn-down
/// watcher alive.
#[derive(Clone)]
pub(crate) struct WeakWatcher(Weak<WatcherInner>);

impl WeakWatcher {
    pub(crate) fn upgrade(&self) -> Option<Watcher> {
        self.0.upgrade().map(|inner| Watcher { inner })
    }
}

impl Watcher {
    /// Create a watcher and, unless `lazy`, evaluate it immediately.
    ///
    /// An unparsable path expression is reported and replaced with an inert
    /// getter. An initial-evaluation failure of a non-user watcher tears the
    /// watcher down and propagates.
    pub fn new(
        owner: Value,
        target: impl Into<WatchTarget>,
        callback: impl Fn(&Value, &Value) + Send + Sync + 'static,
        options: WatchOptions,
    ) -> Result<Watcher, Error> {
        let (getter, expression) = match target.into() {
            WatchTarget::Expr(path) => match parse_path(&path) {
                Some(segments) => (Getter::Path(segments), path),
                None => {
                    tracing::warn!(
                        path = %path,
                        "failed watching path: only simple dot-delimited paths are supported; \
                         use a closure getter for full control"
                    );
                    (Getter::Noop, path)
                }
            },
            WatchTarget::Func(f) => (Getter::Func(f), String::from("function()")),
        };

        let watcher = Watcher {
            inner: Arc::new(WatcherInner {
                id: next_watcher_id(),
                owner,
                getter,
                expression,
                callback: Box::new(callback),
                before: options.before,
                deep: options.deep,
                user: options.user,
                lazy: options.lazy,
                sync: options.sync,
                active: AtomicBool::new(true),
                dirty: AtomicBool::new(options.lazy),
                value: Mutex::new(Value::Null),
                track: Mutex::new(TrackState::default()),
            }),
        };

        if !watcher.inner.lazy {
            match watcher.get() {
                Ok(value) => *watcher.inner.value.lock() = value,
                Err(err) => {
                    watcher.teardown();
                    return Err(err);
                }
            }
        }
        Ok(watcher)
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn expression(&self) -> &str {
        &self.inner.expression
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::Relaxed)
    }

    /// Whether a lazy watcher's cached value is stale.
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.load(Ordering::Relaxed)
    }

    pub fn is_lazy(&self) -> bool {
        self.inner.lazy
    }

    pub fn is_user(&self) -> bool {
        self.inner.user
    }

    pub fn is_deep(&self) -> bool {
        self.inner.deep
    }

    /// The cached result of the last evaluation.
    pub fn value(&self) -> Value {
        self.inner.value.lock().clone()
    }

    /// Number of dependency sets currently subscribed to.
    pub fn dep_count(&self) -> usize {
        self.inner.track.lock().deps.len()
    }

    pub(crate) fn downgrade(&self) -> WeakWatcher {
        WeakWatcher(Arc::downgrade(&self.inner))
    }

    pub(crate) fn call_before(&self) {
        if let Some(before) = &self.inner.before {
            before();
        }
    }

    /// Evaluate the target, re-collecting dependencies.
    ///
    /// Pushes this watcher onto the active-computation stack for the
    /// duration of evaluation; whether or not evaluation fails, the stack
    /// is popped and subscriptions are reconciled. A `deep` watcher
    /// traverses the result before the stack pops, so every nested
    /// property is subscribed.
    pub fn get(&self) -> Result<Value, Error> {
        let guard = context::push_target(self);
        let result = match &self.inner.getter {
            Getter::Path(segments) => Ok(resolve_path(&self.inner.owner, segments)),
            Getter::Func(f) => f(&self.inner.owner),
            Getter::Noop => Ok(Value::Null),
        };
        let result = match result {
            Ok(value) => {
                if self.inner.deep {
                    traverse(&value);
                }
                Ok(value)
            }
            Err(err) => {
                if self.inner.user {
                    tracing::error!(
                        watcher = %self.inner.expression,
                        error = %err,
                        "error in watcher getter"
                    );
                    Ok(Value::Null)
                } else {
                    Err(err)
                }
            }
        };
        drop(guard);
        self.cleanup_deps();
        result
    }

    /// Record a dependency collected during the current evaluation.
    ///
    /// Deduplicates against this cycle's working set, and against the
    /// previous cycle's set before subscribing, so the watcher never
    /// double-subscribes to the same Dep within or across cycles.
    pub(crate) fn add_dep(&self, dep: &Arc<Dep>) {
        let mut track = self.inner.track.lock();
        let id = dep.id();
        if !track.new_dep_ids.contains(&id) {
            track.new_dep_ids.insert(id);
            track.new_deps.push(dep.clone());
            if !track.dep_ids.contains(&id) {
                dep.add_sub(self);
            }
        }
    }

    /// Drop subscriptions that the latest evaluation did not renew, then
    /// promote the new working set for the next cycle.
    fn cleanup_deps(&self) {
        let mut track = self.inner.track.lock();
        let track = &mut *track;
        for dep in &track.deps {
            if !track.new_dep_ids.contains(&dep.id()) {
                dep.remove_sub(self.inner.id);
            }
        }
        std::mem::swap(&mut track.dep_ids, &mut track.new_dep_ids);
        track.new_dep_ids.clear();
        std::mem::swap(&mut track.deps, &mut track.new_deps);
        track.new_deps.clear();
    }

    /// Invalidation entry point, called on dependency notification.
    ///
    /// Lazy watchers only mark themselves dirty; sync watchers re-evaluate
    /// inline; everything else is handed to the scheduler.
    pub fn update(&self) {
        if self.inner.lazy {
            self.inner.dirty.store(true, Ordering::Relaxed);
        } else if self.inner.sync {
            if let Err(err) = self.run() {
                tracing::error!(
                    watcher = %self.inner.expression,
                    error = %err,
                    "synchronous watcher evaluation failed"
                );
            }
        } else {
            scheduler::queue_watcher(self.clone());
        }
    }

    /// Scheduler job interface: re-evaluate and fire the callback if the
    /// result warrants it.
    ///
    /// The callback fires when the value changed, when the value is a
    /// composite (internal mutation is invisible to identity comparison),
    /// or when the watcher is `deep`. A torn-down watcher is a no-op.
    pub fn run(&self) -> Result<(), Error> {
        if !self.is_active() {
            return Ok(());
        }
        let value = self.get()?;
        let mut cached = self.inner.value.lock();
        if !Value::same_value(&value, &cached) || value.is_composite() || self.inner.deep {
            let old = std::mem::replace(&mut *cached, value.clone());
            drop(cached);
            (self.inner.callback)(&value, &old);
        }
        Ok(())
    }

    /// Force evaluation of a lazy watcher and clear the dirty flag.
    ///
    /// Callers check `is_dirty()` first; this is the caching half of the
    /// computed-value protocol.
    pub fn evaluate(&self) -> Result<(), Error> {
        let value = self.get()?;
        *self.inner.value.lock() = value;
        self.inner.dirty.store(false, Ordering::Relaxed);
        Ok(())
    }

    /// Re-register every held Dep with the currently active computation.
    ///
    /// Lets a computed value's own dependencies become dependencies of
    /// whatever computation reads the computed value.
    pub fn depend(&self) {
        let deps: SmallVec<[Arc<Dep>; 4]> = self.inner.track.lock().deps.clone();
        for dep in &deps {
            dep.depend();
        }
    }

    /// Unsubscribe from every dependency set and go inactive. Idempotent;
    /// a torn-down watcher ignores all further invalidations.
    pub fn teardown(&self) {
        if self.inner.active.swap(false, Ordering::Relaxed) {
            let mut track = self.inner.track.lock();
            for dep in track.deps.drain(..) {
                dep.remove_sub(self.inner.id);
            }
            track.dep_ids.clear();
        }
    }
}

/// Resolve a parsed path against the owner, performing tracking reads.
/// Missing keys and non-object intermediates resolve to `Null`.
fn resolve_path(owner: &Value, segments: &[String]) -> Value {
    let mut current = owner.clone();
    for segment in segments {
        match current {
            Value::Object(obj) => current = obj.get(segment),
            _ => return Value::Null,
        }
    }
    current
}

/// Parse a dot-delimited identifier path. Returns `None` for anything
/// containing characters outside `[A-Za-z0-9_$.]` or with empty segments.
fn parse_path(path: &str) -> Option<Vec<String>> {
    if path.is_empty() {
        return None;
    }
    let valid = path
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$' || c == '.');
    if !valid {
        return None;
    }
    let segments: Vec<String> = path.split('.').map(str::to_owned).collect();
    if segments.iter().any(String::is_empty) {
        return None;
    }
    Some(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{observe, Object};
    use std::sync::atomic::AtomicI32;

    fn observed(pairs: &[(&str, Value)]) -> (Object, Value) {
        let obj = Object::new();
        for (key, value) in pairs {
            obj.set(key, value.clone());
        }
        let value = Value::Object(obj.clone());
        observe(&value);
        (obj, value)
    }

    fn noop_cb(_: &Value, _: &Value) {}

    #[test]
    fn parse_path_accepts_simple_paths() {
        assert_eq!(parse_path("a").map(|s| s.len()), Some(1));
        assert_eq!(parse_path("a.b.c").map(|s| s.len()), Some(3));
        assert!(parse_path("$data.value_1").is_some());
        assert!(parse_path("a[0]").is_none());
        assert!(parse_path("a..b").is_none());
        assert!(parse_path("").is_none());
    }

    #[test]
    fn path_watcher_reads_initial_value() {
        let (_, owner) = observed(&[("count", Value::Int(3))]);
        let watcher =
            Watcher::new(owner, "count", noop_cb, WatchOptions::default()).expect("valid path");
        assert_eq!(watcher.value().as_int(), Some(3));
        assert_eq!(watcher.dep_count(), 1);
    }

    #[test]
    fn unparsable_path_falls_back_to_inert_getter() {
        let (_, owner) = observed(&[("count", Value::Int(3))]);
        let watcher = Watcher::new(owner, "count[0]", noop_cb, WatchOptions::default())
            .expect("inert fallback still constructs");
        assert!(watcher.value().is_null());
        assert_eq!(watcher.dep_count(), 0);
    }

    #[test]
    fn nested_path_resolution() {
        let inner = Object::new();
        inner.set("b", Value::Int(7));
        let (_, owner) = observed(&[("a", Value::Object(inner))]);
        let watcher =
            Watcher::new(owner, "a.b", noop_cb, WatchOptions::default()).expect("valid path");
        assert_eq!(watcher.value().as_int(), Some(7));
        // Subscribed to the field dep of "a", the container dep of the
        // nested object, and the field dep of "b".
        assert_eq!(watcher.dep_count(), 3);
    }

    #[test]
    fn missing_path_resolves_to_null() {
        let (_, owner) = observed(&[("a", Value::Int(1))]);
        let watcher =
            Watcher::new(owner, "a.b.c", noop_cb, WatchOptions::default()).expect("valid path");
        assert!(watcher.value().is_null());
    }

    #[test]
    fn dependency_set_is_exact_across_evaluations() {
        let (obj, owner) = observed(&[
            ("flag", Value::Bool(true)),
            ("a", Value::Int(1)),
            ("b", Value::Int(2)),
        ]);
        let watcher = Watcher::new(
            owner,
            WatchTarget::func(move |scope| {
                let scope = scope.as_object().expect("owner is an object");
                if scope.get("flag").as_bool() == Some(true) {
                    Ok(scope.get("a"))
                } else {
                    Ok(scope.get("b"))
                }
            }),
            noop_cb,
            WatchOptions {
                sync: true,
                ..WatchOptions::default()
            },
        )
        .expect("getter succeeds");

        // First evaluation read {flag, a}.
        assert_eq!(watcher.dep_count(), 2);

        // Flip the branch: now {flag, b}; the dep for "a" is unsubscribed.
        obj.set("flag", Value::Bool(false));
        assert_eq!(watcher.dep_count(), 2);

        // Mutating "a" no longer reaches the watcher.
        obj.set("a", Value::Int(100));
        assert_eq!(watcher.value().as_int(), Some(2));
    }

    #[test]
    fn duplicate_reads_subscribe_once() {
        let (_, owner) = observed(&[("a", Value::Int(1))]);
        let watcher = Watcher::new(
            owner,
            WatchTarget::func(|scope| {
                let scope = scope.as_object().expect("owner is an object");
                let first = scope.get("a");
                let _second = scope.get("a");
                Ok(first)
            }),
            noop_cb,
            WatchOptions::default(),
        )
        .expect("getter succeeds");
        assert_eq!(watcher.dep_count(), 1);
    }

    #[test]
    fn sync_watcher_fires_on_change_and_suppresses_unchanged() {
        let (obj, owner) = observed(&[("count", Value::Int(0))]);
        let runs = Arc::new(AtomicI32::new(0));
        let runs_in_cb = runs.clone();
        let _watcher = Watcher::new(
            owner,
            "count",
            move |_, _| {
                runs_in_cb.fetch_add(1, Ordering::SeqCst);
            },
            WatchOptions {
                sync: true,
                ..WatchOptions::default()
            },
        )
        .expect("valid path");

        obj.set("count", Value::Int(1));
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        // Reference-equal write: no notification at all.
        obj.set("count", Value::Int(1));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn nan_write_is_suppressed() {
        let (obj, owner) = observed(&[("x", Value::Float(f64::NAN))]);
        let runs = Arc::new(AtomicI32::new(0));
        let runs_in_cb = runs.clone();
        let _watcher = Watcher::new(
            owner,
            "x",
            move |_, _| {
                runs_in_cb.fetch_add(1, Ordering::SeqCst);
            },
            WatchOptions {
                sync: true,
                ..WatchOptions::default()
            },
        )
        .expect("valid path");

        obj.set("x", Value::Float(f64::NAN));
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn composite_value_always_fires() {
        let nested = Object::new();
        nested.set("x", Value::Int(1));
        let (obj, owner) = observed(&[("nested", Value::Object(nested.clone()))]);
        let runs = Arc::new(AtomicI32::new(0));
        let runs_in_cb = runs.clone();
        let watcher = Watcher::new(
            owner,
            "nested",
            move |_, _| {
                runs_in_cb.fetch_add(1, Ordering::SeqCst);
            },
            WatchOptions {
                sync: true,
                ..WatchOptions::default()
            },
        )
        .expect("valid path");

        // The watched value is still the same object handle, but composite
        // values fire anyway: the mutation is internal.
        let held = obj.get_untracked("nested");
        assert!(Value::same_value(&held, &watcher.value()));
        nested.set("x", Value::Int(2));
        // Mutating nested.x notifies Dep(x), not Dep(nested); force a run
        // to exercise the always-fire rule directly.
        watcher.run().expect("run succeeds");
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn lazy_watcher_marks_dirty_instead_of_running() {
        let (obj, owner) = observed(&[("count", Value::Int(1))]);
        let evals = Arc::new(AtomicI32::new(0));
        let evals_in_getter = evals.clone();
        let watcher = Watcher::new(
            owner,
            WatchTarget::func(move |scope| {
                evals_in_getter.fetch_add(1, Ordering::SeqCst);
                let scope = scope.as_object().expect("owner is an object");
                Ok(scope.get("count"))
            }),
            noop_cb,
            WatchOptions {
                lazy: true,
                ..WatchOptions::default()
            },
        )
        .expect("lazy watcher does not evaluate on construction");

        // Lazy: nothing has run yet.
        assert_eq!(evals.load(Ordering::SeqCst), 0);
        assert!(watcher.is_dirty());

        watcher.evaluate().expect("evaluation succeeds");
        assert!(!watcher.is_dirty());
        assert_eq!(watcher.value().as_int(), Some(1));

        // Invalidation re-dirties without re-evaluating.
        obj.set("count", Value::Int(2));
        assert!(watcher.is_dirty());
        assert_eq!(evals.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn teardown_unsubscribes_and_is_idempotent() {
        let (obj, owner) = observed(&[("count", Value::Int(0))]);
        let runs = Arc::new(AtomicI32::new(0));
        let runs_in_cb = runs.clone();
        let watcher = Watcher::new(
            owner,
            "count",
            move |_, _| {
                runs_in_cb.fetch_add(1, Ordering::SeqCst);
            },
            WatchOptions {
                sync: true,
                ..WatchOptions::default()
            },
        )
        .expect("valid path");
        assert_eq!(watcher.dep_count(), 1);

        watcher.teardown();
        watcher.teardown();
        assert!(!watcher.is_active());
        assert_eq!(watcher.dep_count(), 0);

        obj.set("count", Value::Int(5));
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn user_watcher_getter_error_is_isolated() {
        let (_, owner) = observed(&[("a", Value::Int(1))]);
        let watcher = Watcher::new(
            owner,
            WatchTarget::func(|_| {
                Err(Error::Evaluation {
                    expression: String::from("function()"),
                    message: String::from("boom"),
                })
            }),
            noop_cb,
            WatchOptions {
                user: true,
                ..WatchOptions::default()
            },
        )
        .expect("user watcher swallows getter errors");
        assert!(watcher.value().is_null());
    }

    #[test]
    fn non_user_watcher_getter_error_propagates() {
        let (_, owner) = observed(&[("a", Value::Int(1))]);
        let result = Watcher::new(
            owner,
            WatchTarget::func(|_| {
                Err(Error::Evaluation {
                    expression: String::from("function()"),
                    message: String::from("boom"),
                })
            }),
            noop_cb,
            WatchOptions::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn deep_watcher_subscribes_to_nested_properties() {
        let inner = Object::new();
        inner.set("x", Value::Int(1));
        let (_, owner) = observed(&[("nested", Value::Object(inner.clone()))]);
        let runs = Arc::new(AtomicI32::new(0));
        let runs_in_cb = runs.clone();
        let _watcher = Watcher::new(
            owner,
            "nested",
            move |_, _| {
                runs_in_cb.fetch_add(1, Ordering::SeqCst);
            },
            WatchOptions {
                deep: true,
                sync: true,
                ..WatchOptions::default()
            },
        )
        .expect("valid path");

        // A shallow watcher would miss this; deep traversal subscribed to
        // Dep(nested.x) as well.
        inner.set("x", Value::Int(2));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
