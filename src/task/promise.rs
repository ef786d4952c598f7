//! Single-assignment settlement cell shared by a task and its observers.
//!
//! A `Promise<T>` moves through two states only: pending, then settled with a
//! `Result<T, TaskError>`. The outcome lives in a `OnceLock`, so reading a
//! settled cell is a single acquire load and needs no lock. Writers and
//! blocked readers meet on a `parking_lot` mutex/condvar pair:
//!
//! - `settle` stores the outcome and wakes waiters while holding the mutex,
//!   so a reader that checked "still pending" under the same mutex cannot
//!   miss the wake-up.
//! - Continuations registered with `on_settle` are run exactly once, on the
//!   thread that settles the cell (or immediately, if it is already settled).
//!
//! The `Settler` is the write half handed to an executor job. If the job is
//! dropped without running, the `Settler` settles the cell with
//! [`Abandoned`] instead of leaving it pending forever.
//!
//! Settling a cell runs its continuations, which may settle further cells
//! (a `bind` adopting its inner task, an inline executor running the next
//! `fmap`). Recursive code such as a countdown built from `bind` produces
//! chains of arbitrary length, so the cell bounds how deeply settlements
//! nest on one thread, counting continuations attached to already settled
//! cells as well. Beyond `MAX_INLINE_SETTLE_DEPTH` they are queued and
//! drained by the outermost settlement on that thread.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::mem;
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use crate::error::{Abandoned, TaskError};

/// The terminal outcome of a task.
pub(crate) type Outcome<T> = Result<T, TaskError>;

type Continuation<T> = Box<dyn FnOnce(&Outcome<T>) + Send + 'static>;

pub(crate) struct Promise<T> {
    outcome: OnceLock<Outcome<T>>,
    continuations: Mutex<Vec<Continuation<T>>>,
    settled: Condvar,
}

impl<T> Promise<T> {
    pub(crate) fn pending() -> Self {
        Self {
            outcome: OnceLock::new(),
            continuations: Mutex::new(Vec::new()),
            settled: Condvar::new(),
        }
    }

    pub(crate) fn settled(outcome: Outcome<T>) -> Self {
        Self {
            outcome: OnceLock::from(outcome),
            continuations: Mutex::new(Vec::new()),
            settled: Condvar::new(),
        }
    }

    /// The outcome, if the cell is settled. Never blocks.
    #[inline]
    pub(crate) fn outcome(&self) -> Option<&Outcome<T>> {
        self.outcome.get()
    }

    #[inline]
    pub(crate) fn is_settled(&self) -> bool {
        self.outcome.get().is_some()
    }

    /// Stores the outcome unless one is already present.
    ///
    /// Returns `false` (and drops `outcome`) if the cell was already settled.
    pub(crate) fn settle(&self, outcome: Outcome<T>) -> bool {
        let continuations = {
            let mut continuations = self.continuations.lock();
            if self.outcome.set(outcome).is_err() {
                return false;
            }
            self.settled.notify_all();
            mem::take(&mut *continuations)
        };

        let Some(outcome) = self.outcome.get() else {
            unreachable!("outcome was stored above");
        };
        let state = if outcome.is_ok() {
            "resolved"
        } else {
            "rejected"
        };
        trace!(state, continuations = continuations.len(), "task settled");
        for continuation in continuations {
            continuation(outcome);
        }
        true
    }

    /// Runs `continuation` with the outcome once the cell is settled.
    ///
    /// If the cell is already settled, the continuation runs immediately on
    /// the calling thread, subject to the same nesting bound as settlements.
    pub(crate) fn on_settle<F>(self: &Arc<Self>, continuation: F)
    where
        T: 'static,
        F: FnOnce(&Outcome<T>) + Send + 'static,
    {
        {
            let mut continuations = self.continuations.lock();
            if self.outcome.get().is_none() {
                continuations.push(Box::new(continuation));
                return;
            }
        }
        let promise = Arc::clone(self);
        run_or_defer(Box::new(move || {
            if let Some(outcome) = promise.outcome.get() {
                continuation(outcome);
            }
        }));
    }

    /// Blocks until the cell is settled, or until `timeout` elapses.
    ///
    /// Returns whether the cell is settled.
    pub(crate) fn wait(&self, timeout: Option<Duration>) -> bool {
        if self.is_settled() {
            return true;
        }
        // The settlement may be queued behind the caller on this very thread.
        run_deferred_until(|| self.is_settled());
        if self.is_settled() {
            return true;
        }

        let deadline = timeout.and_then(|timeout| Instant::now().checked_add(timeout));
        let mut continuations = self.continuations.lock();
        while !self.is_settled() {
            match (timeout, deadline) {
                (None, _) | (Some(_), None) => self.settled.wait(&mut continuations),
                (Some(_), Some(deadline)) => {
                    if self
                        .settled
                        .wait_until(&mut continuations, deadline)
                        .timed_out()
                    {
                        return self.is_settled();
                    }
                }
            }
        }
        true
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Promise")
            .field("settled", &self.is_settled())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Settler
// =============================================================================

/// Write half of a promise, owned by exactly one executor job.
pub(crate) struct Settler<T: 'static> {
    promise: Option<Arc<Promise<T>>>,
}

impl<T: 'static> Settler<T> {
    pub(crate) const fn new(promise: Arc<Promise<T>>) -> Self {
        Self {
            promise: Some(promise),
        }
    }

    pub(crate) fn settle(self, outcome: Outcome<T>) {
        run_or_defer(Box::new(move || self.settle_now(outcome)));
    }

    fn settle_now(mut self, outcome: Outcome<T>) {
        if let Some(promise) = self.promise.take() {
            promise.settle(outcome);
        }
    }
}

impl<T: 'static> Drop for Settler<T> {
    fn drop(&mut self) {
        if let Some(promise) = self.promise.take() {
            run_or_defer(Box::new(move || {
                promise.settle(Err(TaskError::new(Abandoned)));
            }));
        }
    }
}

// =============================================================================
// Settlement depth bound
// =============================================================================

const MAX_INLINE_SETTLE_DEPTH: usize = 32;

type Deferred = Box<dyn FnOnce()>;

thread_local! {
    static SETTLE_DEPTH: Cell<usize> = const { Cell::new(0) };
    static DEFERRED: RefCell<VecDeque<Deferred>> = const { RefCell::new(VecDeque::new()) };
}

/// Restores the settle depth of the enclosing frame.
struct DepthGuard {
    outer: usize,
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        SETTLE_DEPTH.set(self.outer);
        if self.outer == 0 && thread::panicking() {
            // Dropping a queued settlement abandons its promise, which may
            // queue again: take the queue out before dropping it.
            let leftover = DEFERRED.with_borrow_mut(mem::take);
            drop(leftover);
        }
    }
}

/// Runs `settlement` now, or queues it when this thread is already
/// `MAX_INLINE_SETTLE_DEPTH` settlements deep. The outermost settlement
/// drains the queue before returning.
fn run_or_defer(settlement: Deferred) {
    let depth = SETTLE_DEPTH.get();
    if depth >= MAX_INLINE_SETTLE_DEPTH {
        DEFERRED.with_borrow_mut(|queue| queue.push_back(settlement));
        return;
    }

    SETTLE_DEPTH.set(depth + 1);
    let _guard = DepthGuard { outer: depth };
    settlement();

    if depth == 0 {
        while let Some(next) = DEFERRED.with_borrow_mut(VecDeque::pop_front) {
            next();
        }
    }
}

/// Runs settlements queued on this thread until `done` holds or the queue is
/// empty.
fn run_deferred_until(done: impl Fn() -> bool) {
    while !done() {
        let Some(next) = DEFERRED.with_borrow_mut(VecDeque::pop_front) else {
            return;
        };
        next();
    }
}
