//! Deferred Flush Scheduler
//!
//! Invalidated watchers are not re-run inline. They are queued, deduplicated
//! by id, and flushed in one batch at the next tick, in ascending id order,
//! so that any number of mutations in one synchronous burst costs each
//! affected watcher exactly one re-evaluation.
//!
//! # Ticks
//!
//! The engine does not own an event loop. [`next_tick`] enqueues a deferred
//! task and, on the first enqueue of an idle period, invokes the host wake
//! hook installed with [`set_tick_hook`]. The host then calls [`run_tasks`]
//! at its convenience; that call is the tick boundary. Tasks enqueued while
//! a drain is in progress belong to the next tick.
//!
//! All state is thread-local: one scheduler per logical event loop, no
//! cross-thread coordination.
//!
//! # Mid-flush invalidation
//!
//! A watcher invalidated while the flush is running is inserted into the
//! live queue at its id-ordered position, but never before the cursor. A
//! watcher that keeps re-invalidating itself trips the runaway guard after
//! [`MAX_UPDATE_COUNT`] re-entries and the flush is abandoned.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::config;
use crate::reactive::watcher::Watcher;

/// Re-entries of a single watcher tolerated within one flush before the
/// flush is abandoned as a runaway update loop.
pub const MAX_UPDATE_COUNT: u32 = 100;

#[derive(Default)]
struct SchedulerState {
    queue: Vec<Watcher>,
    has: HashSet<u64>,
    circular: HashMap<u64, u32>,
    waiting: bool,
    flushing: bool,
    index: usize,
}

type Task = Box<dyn FnOnce()>;

#[derive(Default)]
struct TaskQueue {
    tasks: Vec<Task>,
    pending: bool,
    wake: Option<Rc<dyn Fn()>>,
}

thread_local! {
    static SCHEDULER: RefCell<SchedulerState> = RefCell::new(SchedulerState::default());
    static TASKS: RefCell<TaskQueue> = RefCell::new(TaskQueue::default());
}

/// Queue a watcher for the next flush.
///
/// A watcher already queued is ignored. The first enqueue of an idle period
/// schedules exactly one flush; with async flushing disabled the flush runs
/// immediately instead.
pub fn queue_watcher(watcher: Watcher) {
    let id = watcher.id();
    let schedule_flush = SCHEDULER.with(|state| {
        let mut s = state.borrow_mut();
        if s.has.contains(&id) {
            return false;
        }
        s.has.insert(id);
        if !s.flushing {
            s.queue.push(watcher);
        } else {
            // The queue is already sorted and partially drained: insert at
            // the id-ordered position, but never behind the cursor.
            let mut i = s.queue.len();
            while i > s.index && s.queue[i - 1].id() > id {
                i -= 1;
            }
            s.queue.insert(i, watcher);
        }
        if s.waiting {
            return false;
        }
        s.waiting = true;
        true
    });
    if schedule_flush {
        if config::is_async() {
            next_tick(flush_queue);
        } else {
            flush_queue();
        }
    }
}

/// Drain the scheduler queue, running every queued watcher in ascending id
/// order.
///
/// Parent-before-child and plain-before-lazy ordering both reduce to id
/// order, since ids are assigned at construction. All scheduler state is
/// reset before this returns, so post-flush deferred tasks observe an idle
/// scheduler.
pub fn flush_queue() {
    SCHEDULER.with(|state| {
        let mut s = state.borrow_mut();
        s.flushing = true;
        s.queue.sort_by_key(Watcher::id);
    });

    loop {
        // The borrow is released before the watcher runs: running a watcher
        // re-enters the scheduler when it invalidates others.
        let next = SCHEDULER.with(|state| {
            let mut s = state.borrow_mut();
            if s.index >= s.queue.len() {
                return None;
            }
            let watcher = s.queue[s.index].clone();
            s.index += 1;
            // Cleared before the run so the watcher can requeue itself.
            s.has.remove(&watcher.id());
            Some(watcher)
        });
        let Some(watcher) = next else { break };

        watcher.call_before();
        if let Err(err) = watcher.run() {
            tracing::error!(
                watcher = %watcher.expression(),
                error = %err,
                "watcher evaluation failed during flush"
            );
        }

        let runaway = SCHEDULER.with(|state| {
            let mut s = state.borrow_mut();
            if !s.has.contains(&watcher.id()) {
                return false;
            }
            let count = s.circular.entry(watcher.id()).or_insert(0);
            *count += 1;
            *count > MAX_UPDATE_COUNT
        });
        if runaway {
            tracing::error!(
                watcher = %watcher.expression(),
                "possible infinite update loop in watcher; abandoning flush"
            );
            break;
        }
    }

    SCHEDULER.with(|state| {
        *state.borrow_mut() = SchedulerState::default();
    });
}

/// Defer `task` to the next tick.
///
/// The first task of an idle period flags the tick as pending and invokes
/// the host wake hook, if one is installed.
pub fn next_tick(task: impl FnOnce() + 'static) {
    let wake = TASKS.with(|queue| {
        let mut q = queue.borrow_mut();
        q.tasks.push(Box::new(task));
        if q.pending {
            None
        } else {
            q.pending = true;
            q.wake.clone()
        }
    });
    if let Some(wake) = wake {
        wake();
    }
}

/// Run every task deferred so far. This is the tick boundary.
///
/// The batch is snapshotted up front; tasks enqueued by a running task are
/// deferred to the next call.
pub fn run_tasks() {
    let batch = TASKS.with(|queue| {
        let mut q = queue.borrow_mut();
        q.pending = false;
        std::mem::take(&mut q.tasks)
    });
    for task in batch {
        task();
    }
}

/// Whether a tick is pending, for hosts that poll instead of installing a
/// wake hook.
pub fn has_pending_tasks() -> bool {
    TASKS.with(|queue| queue.borrow().pending)
}

/// Install the host wake hook invoked on the first deferred task of each
/// idle period.
pub fn set_tick_hook(hook: impl Fn() + 'static) {
    TASKS.with(|queue| queue.borrow_mut().wake = Some(Rc::new(hook)));
}
