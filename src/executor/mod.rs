//! Executors: where task computations run.
//!
//! An [`Executor`] receives a boxed zero-argument [`Job`] and runs it, on its
//! own schedule. [`Task`](crate::Task) never spawns threads itself; the
//! executor a task is created on is the sole place where threading policy
//! lives, and every task derived from it (`fmap`, `bind`, ...) runs its
//! continuation on the same executor.
//!
//! | Executor | Runs jobs | Availability |
//! |----------|-----------|--------------|
//! | [`ImmediateExecutor`] | inline, on the submitting thread | always |
//! | [`ThreadPerTask`] | on a fresh, named OS thread per job | always |
//! | [`BlockingPool`] | on a tokio runtime's blocking pool | feature `runtime` |
//! | [`FixedPool`] | on a fixed-size rayon pool | feature `rayon` |
//!
//! Jobs handed out by this crate never unwind: panics inside computations
//! are caught and stored in the task. An executor that drops a job without
//! running it settles the task as rejected with
//! [`Abandoned`](crate::Abandoned).
//!
//! # Examples
//!
//! ```rust
//! use deferred_task::Task;
//! use deferred_task::executor::{immediate, thread_per_task};
//!
//! // Deterministic: the computation has already run when `on` returns.
//! let task = Task::on(immediate(), || Ok::<_, String>(1));
//! assert!(task.is_complete());
//!
//! let task = Task::on(thread_per_task(), || Ok::<_, String>(2));
//! assert_eq!(task.value().unwrap(), 2);
//! ```

#[cfg(feature = "rayon")]
pub mod pool;
#[cfg(feature = "runtime")]
pub mod runtime;

#[cfg(feature = "rayon")]
pub use pool::{FixedPool, PoolError};
#[cfg(feature = "runtime")]
pub use runtime::BlockingPool;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock};
use std::thread;

use tracing::{trace, warn};

/// A unit of work submitted to an executor.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// A capability that runs jobs.
///
/// Implementations decide where and when a job runs: inline, on a new
/// thread, on a pool. They must run every job at most once. Dropping a job
/// instead of running it is allowed; the task it belongs to is then
/// rejected with [`Abandoned`](crate::Abandoned).
///
/// # Examples
///
/// An executor that counts submissions and runs jobs inline:
///
/// ```rust
/// use deferred_task::Task;
/// use deferred_task::executor::{Executor, Job};
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// #[derive(Default)]
/// struct Counting(AtomicUsize);
///
/// impl Executor for Counting {
///     fn execute(&self, job: Job) {
///         self.0.fetch_add(1, Ordering::SeqCst);
///         job();
///     }
/// }
///
/// let executor = Arc::new(Counting::default());
/// let task = Task::on(executor.clone(), || Ok::<_, String>(20)).fmap(|x| x + 1);
///
/// assert_eq!(task.value().unwrap(), 21);
/// assert_eq!(executor.0.load(Ordering::SeqCst), 2);
/// ```
pub trait Executor: Send + Sync {
    /// Runs `job`, now or later, on this executor's threads.
    fn execute(&self, job: Job);
}

impl<E: Executor + ?Sized> Executor for Arc<E> {
    fn execute(&self, job: Job) {
        (**self).execute(job);
    }
}

// =============================================================================
// ImmediateExecutor
// =============================================================================

/// Runs every job on the calling thread before `execute` returns.
///
/// Tasks created on this executor are terminal as soon as they are
/// constructed, which makes it the executor of choice for deterministic
/// tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImmediateExecutor;

impl Executor for ImmediateExecutor {
    #[inline]
    fn execute(&self, job: Job) {
        job();
    }
}

// =============================================================================
// ThreadPerTask
// =============================================================================

/// Runs every job on a newly spawned OS thread.
///
/// Threads are named `<prefix>-<n>` with a process-wide counter. If the
/// operating system refuses to spawn a thread, the job is dropped and its
/// task is rejected with [`Abandoned`](crate::Abandoned).
#[derive(Debug, Clone)]
pub struct ThreadPerTask {
    name_prefix: Arc<str>,
    stack_size: Option<usize>,
}

static THREAD_COUNTER: AtomicUsize = AtomicUsize::new(0);

impl ThreadPerTask {
    /// Creates an executor whose threads are named `deferred-task-<n>`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            name_prefix: Arc::from("deferred-task"),
            stack_size: None,
        }
    }

    /// Sets the thread name prefix.
    #[must_use]
    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = Arc::from(prefix.into());
        self
    }

    /// Sets the stack size, in bytes, of spawned threads.
    #[must_use]
    pub const fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = Some(stack_size);
        self
    }
}

impl Default for ThreadPerTask {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor for ThreadPerTask {
    fn execute(&self, job: Job) {
        let index = THREAD_COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut builder = thread::Builder::new().name(format!("{}-{index}", self.name_prefix));
        if let Some(stack_size) = self.stack_size {
            builder = builder.stack_size(stack_size);
        }

        match builder.spawn(job) {
            Ok(_detached) => trace!(thread = index, "spawned task thread"),
            Err(error) => warn!(%error, "failed to spawn task thread, job dropped"),
        }
    }
}

// =============================================================================
// Shared executors
// =============================================================================

static DEFAULT_EXECUTOR: LazyLock<Arc<dyn Executor>> = LazyLock::new(|| {
    #[cfg(feature = "runtime")]
    let executor: Arc<dyn Executor> = Arc::new(BlockingPool::global());
    #[cfg(not(feature = "runtime"))]
    let executor: Arc<dyn Executor> = Arc::new(ThreadPerTask::new());
    executor
});

/// The process-wide executor used by [`Task::new`](crate::Task::new).
///
/// With the `runtime` feature (the default) this is the blocking pool of the
/// shared tokio runtime (see [`runtime::global`]); otherwise it is a
/// [`ThreadPerTask`] executor.
#[must_use]
pub fn default_executor() -> Arc<dyn Executor> {
    Arc::clone(&DEFAULT_EXECUTOR)
}

/// A shared [`ImmediateExecutor`].
#[must_use]
pub fn immediate() -> Arc<dyn Executor> {
    Arc::new(ImmediateExecutor)
}

/// A shared [`ThreadPerTask`] executor with default settings.
#[must_use]
pub fn thread_per_task() -> Arc<dyn Executor> {
    Arc::new(ThreadPerTask::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::sync::atomic::AtomicBool;
    use std::sync::mpsc;
    use std::time::Duration;

    #[rstest]
    fn immediate_runs_inline() {
        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = Arc::clone(&ran);

        ImmediateExecutor.execute(Box::new(move || ran_clone.store(true, Ordering::SeqCst)));

        assert!(ran.load(Ordering::SeqCst));
    }

    #[rstest]
    fn thread_per_task_runs_on_named_thread() {
        let (sender, receiver) = mpsc::channel();
        let executor = ThreadPerTask::new().with_name_prefix("unit-test");

        executor.execute(Box::new(move || {
            let name = thread::current().name().map(str::to_string);
            sender.send(name).unwrap();
        }));

        let name = receiver
            .recv_timeout(Duration::from_secs(5))
            .unwrap()
            .unwrap();
        assert!(name.starts_with("unit-test-"));
        assert_ne!(name, thread::current().name().unwrap_or_default());
    }

    #[rstest]
    fn thread_per_task_honours_stack_size() {
        let (sender, receiver) = mpsc::channel();
        let executor = ThreadPerTask::default().with_stack_size(256 * 1024);

        executor.execute(Box::new(move || sender.send(7).unwrap()));

        assert_eq!(receiver.recv_timeout(Duration::from_secs(5)), Ok(7));
    }

    #[rstest]
    fn arc_executor_delegates() {
        let executor: Arc<dyn Executor> = immediate();
        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = Arc::clone(&ran);

        Arc::clone(&executor).execute(Box::new(move || ran_clone.store(true, Ordering::SeqCst)));

        assert!(ran.load(Ordering::SeqCst));
    }

    #[rstest]
    fn default_executor_is_shared() {
        assert!(Arc::ptr_eq(&default_executor(), &default_executor()));
    }

    #[rstest]
    fn default_executor_runs_jobs() {
        let (sender, receiver) = mpsc::channel();
        default_executor().execute(Box::new(move || sender.send(42).unwrap()));
        assert_eq!(receiver.recv_timeout(Duration::from_secs(5)), Ok(42));
    }
}
