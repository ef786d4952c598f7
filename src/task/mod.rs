//! Deferred, thread-executed computations with a monadic interface.
//!
//! A [`Task<T>`] wraps a computation that eventually produces a `T` or
//! fails. The computation is handed to an [`Executor`] as soon as the task
//! is created and runs exactly once. The task itself is a handle to the
//! computation's settlement cell: it can be cloned, shared across threads,
//! waited on, and composed into new tasks.
//!
//! # Lifecycle
//!
//! ```text
//!             Ok(value)
//!           ┌──────────► Resolved(value)
//! Pending ──┤
//!           └──────────► Rejected(error)
//!           Err(error) / panic
//! ```
//!
//! The transition happens once. Every observer of a terminal task sees the
//! same outcome, and no accessor or combinator re-runs the computation.
//!
//! # Blocking and non-blocking operations
//!
//! | Operation | Blocks the caller |
//! |-----------|-------------------|
//! | [`Task::new`], [`Task::on`], [`Task::fmap`], [`Task::bind`], [`Task::or`], [`Task::or_fmap`] | no |
//! | [`Task::is_complete`], [`Task::state`], `Debug`/`Display` | no |
//! | [`Task::wait`], [`Task::wait_timeout`] | yes (bounded for `wait_timeout`) |
//! | [`Task::value`], [`Task::value_or`], [`Task::to_result`], [`Task::to_maybe`] | yes |
//!
//! Derived tasks do not occupy a thread while their parent is pending: the
//! derived computation is submitted to the executor only once the parent has
//! settled.
//!
//! # Failure containment
//!
//! A computation fails by returning `Err` or by panicking. Either way the
//! failure is stored as a [`TaskError`] and stays inert until an observer
//! asks for it. Closures passed to `fmap`, `bind`, `or` and `or_fmap` are
//! contained the same way.
//!
//! # Examples
//!
//! ```rust
//! use deferred_task::Task;
//!
//! let task = Task::new(|| "21".parse::<i32>())
//!     .fmap(|x| x * 2)
//!     .bind(|x| Task::pure(x.to_string()));
//!
//! assert_eq!(task.value().unwrap(), "42");
//! ```
//!
//! Recovering from a failure:
//!
//! ```rust
//! use deferred_task::Task;
//!
//! let task: Task<i32> = Task::new(|| "oops".parse::<i32>());
//!
//! assert_eq!(task.to_maybe(), None);
//! assert_eq!(task.value_or(|| 0), 0);
//! assert_eq!(task.or_fmap(|_| -1).value().unwrap(), -1);
//! ```

mod promise;
mod state;
mod traverse;

pub use state::{Status, TaskState};

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use tracing::trace;

use crate::error::{BoxError, TaskError, UnwrapError};
use crate::executor::{Executor, default_executor};
use promise::{Outcome, Promise, Settler};

/// A single-assignment, thread-executed deferred computation.
///
/// See the [module documentation](crate::task) for the lifecycle and the blocking
/// behaviour of each operation.
///
/// Cloning a `Task` is cheap and yields another handle to the same
/// computation.
pub struct Task<T> {
    promise: Arc<Promise<T>>,
    executor: Arc<dyn Executor>,
}

static_assertions::assert_impl_all!(Task<i32>: Send, Sync, Clone);
static_assertions::assert_impl_all!(Task<String>: Send, Sync, Clone);

impl<T> Clone for Task<T> {
    fn clone(&self) -> Self {
        Self {
            promise: Arc::clone(&self.promise),
            executor: Arc::clone(&self.executor),
        }
    }
}

/// What a derived computation does once its parent has settled.
enum Step<U> {
    Done(Outcome<U>),
    Adopt(Task<U>),
}

fn capture<T, E, F>(computation: F) -> Outcome<T>
where
    F: FnOnce() -> Result<T, E>,
    E: Into<BoxError>,
{
    match catch_unwind(AssertUnwindSafe(computation)) {
        Ok(result) => result.map_err(TaskError::new),
        Err(payload) => Err(TaskError::from_panic(payload)),
    }
}

// =============================================================================
// Construction
// =============================================================================

impl<T: Send + Sync + 'static> Task<T> {
    /// Submits `computation` to the [default executor](crate::executor::default_executor).
    ///
    /// The computation starts running right away; it is not deferred until
    /// the value is requested. An `Err` it returns, or a panic, rejects the
    /// task. Construction itself never fails.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use deferred_task::Task;
    ///
    /// let task = Task::new(|| Ok::<_, std::io::Error>(42));
    /// assert_eq!(task.value().unwrap(), 42);
    /// ```
    pub fn new<F, E>(computation: F) -> Self
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        E: Into<BoxError>,
    {
        Self::on(default_executor(), computation)
    }

    /// Submits `computation` to `executor`.
    ///
    /// Tasks derived from the returned one run their continuations on the
    /// same executor.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use deferred_task::Task;
    /// use deferred_task::executor::immediate;
    ///
    /// let task = Task::on(immediate(), || Ok::<_, String>("ready"));
    /// assert!(task.is_complete());
    /// ```
    pub fn on<F, E>(executor: Arc<dyn Executor>, computation: F) -> Self
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        E: Into<BoxError>,
    {
        let promise = Arc::new(Promise::pending());
        let settler = Settler::new(Arc::clone(&promise));

        trace!("submitting task");
        executor.execute(Box::new(move || settler.settle(capture(computation))));

        Self { promise, executor }
    }

    /// Submits an infallible computation to the default executor.
    ///
    /// A panic inside `computation` still rejects the task.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use deferred_task::Task;
    ///
    /// let task = Task::spawn(|| 1 + 1);
    /// assert_eq!(task.value().unwrap(), 2);
    /// ```
    pub fn spawn<F>(computation: F) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
    {
        Self::new(move || Ok::<T, std::convert::Infallible>(computation()))
    }

    /// A task already resolved with `value`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use deferred_task::{Status, Task};
    ///
    /// assert_eq!(Task::pure(3).status(), Status::Resolved);
    /// ```
    pub fn pure(value: T) -> Self {
        Self::settled(default_executor(), Ok(value))
    }

    /// A task already resolved with `value`, deriving on `executor`.
    pub fn pure_on(executor: Arc<dyn Executor>, value: T) -> Self {
        Self::settled(executor, Ok(value))
    }

    /// A task already rejected with `error`.
    ///
    /// Passing a [`TaskError`] keeps its identity.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use deferred_task::Task;
    ///
    /// let task: Task<i32> = Task::rejected("not found");
    /// assert_eq!(task.to_result().unwrap_err().to_string(), "not found");
    /// ```
    pub fn rejected<E>(error: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::settled(default_executor(), Err(TaskError::new(error)))
    }

    /// Lifts a `Result` into an already settled task.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use deferred_task::Task;
    ///
    /// assert_eq!(Task::from_result(Ok::<_, String>(1)).to_maybe(), Some(1));
    /// assert_eq!(Task::<i32>::from_result(Err("no")).to_maybe(), None);
    /// ```
    pub fn from_result<E>(result: Result<T, E>) -> Self
    where
        E: Into<BoxError>,
    {
        Self::settled(default_executor(), result.map_err(TaskError::new))
    }

    fn settled(executor: Arc<dyn Executor>, outcome: Outcome<T>) -> Self {
        Self {
            promise: Arc::new(Promise::settled(outcome)),
            executor,
        }
    }
}

// =============================================================================
// Waiting and introspection
// =============================================================================

impl<T> Task<T> {
    /// Returns `true` if the task is resolved or rejected. Never blocks.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.promise.is_settled()
    }

    /// Blocks until the task is resolved or rejected.
    ///
    /// Returns `self` so that accessors can be chained.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use deferred_task::Task;
    ///
    /// let task = Task::spawn(|| std::thread::sleep(std::time::Duration::from_millis(10)));
    /// assert!(task.wait().is_complete());
    /// ```
    pub fn wait(&self) -> &Self {
        self.promise.wait(None);
        self
    }

    /// Blocks until the task is terminal or `timeout` has elapsed.
    ///
    /// A timeout is not an error: the task is returned still pending and its
    /// computation keeps running.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use deferred_task::Task;
    /// use std::time::Duration;
    ///
    /// let task = Task::spawn(|| std::thread::sleep(Duration::from_millis(200)));
    /// assert!(!task.wait_timeout(Duration::from_millis(1)).is_complete());
    /// ```
    pub fn wait_timeout(&self, timeout: Duration) -> &Self {
        self.promise.wait(Some(timeout));
        self
    }

    /// A snapshot of the task's state. Never blocks.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use deferred_task::{Task, TaskState};
    ///
    /// let task: Task<i32> = Task::rejected("boom");
    /// match task.state() {
    ///     TaskState::Rejected(error) => assert_eq!(error.to_string(), "boom"),
    ///     other => panic!("unexpected state {other:?}"),
    /// }
    /// ```
    pub fn state(&self) -> TaskState<'_, T> {
        match self.promise.outcome() {
            None => TaskState::Pending,
            Some(Ok(value)) => TaskState::Resolved(value),
            Some(Err(error)) => TaskState::Rejected(error),
        }
    }

    /// The lifecycle discriminant of the task. Never blocks.
    pub fn status(&self) -> Status {
        self.state().status()
    }

    /// The executor derived tasks are scheduled on.
    pub const fn executor(&self) -> &Arc<dyn Executor> {
        &self.executor
    }

    fn outcome(&self) -> &Outcome<T> {
        self.promise.wait(None);
        let Some(outcome) = self.promise.outcome() else {
            unreachable!("an untimed wait returns only once the task is settled");
        };
        outcome
    }
}

// =============================================================================
// Extraction and conversion
// =============================================================================

impl<T: Clone + Send + Sync + 'static> Task<T> {
    /// Blocks until terminal and returns the value.
    ///
    /// # Errors
    ///
    /// Returns an [`UnwrapError`] referencing the captured error if the task
    /// was rejected.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use deferred_task::Task;
    ///
    /// assert_eq!(Task::spawn(|| 5).value().unwrap(), 5);
    ///
    /// let failed: Task<i32> = Task::new(|| Err("no disk"));
    /// assert_eq!(failed.value().unwrap_err().error().to_string(), "no disk");
    /// ```
    pub fn value(&self) -> Result<T, UnwrapError> {
        self.outcome().clone().map_err(UnwrapError::new)
    }

    /// Blocks until terminal; returns the value, or `fallback()` if the task
    /// was rejected.
    ///
    /// The captured error is discarded on the fallback path.
    pub fn value_or<F>(&self, fallback: F) -> T
    where
        F: FnOnce() -> T,
    {
        match self.outcome() {
            Ok(value) => value.clone(),
            Err(_) => fallback(),
        }
    }

    /// Blocks until terminal and converts the outcome into a `Result`.
    ///
    /// # Errors
    ///
    /// Returns the captured [`TaskError`] if the task was rejected. This is
    /// the conversion to use with `?`.
    pub fn to_result(&self) -> Result<T, TaskError> {
        self.outcome().clone()
    }

    /// Blocks until terminal and converts the outcome into an `Option`.
    ///
    /// A rejected task becomes `None`; the error is discarded.
    pub fn to_maybe(&self) -> Option<T> {
        self.outcome().as_ref().ok().cloned()
    }

    // =========================================================================
    // Composition
    // =========================================================================

    /// Schedules `continuation` to run on this task's executor once this task
    /// has settled, and returns the task it settles.
    fn chain<U, F>(&self, continuation: F) -> Task<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(Outcome<T>) -> Step<U> + Send + 'static,
    {
        let promise = Arc::new(Promise::pending());
        let settler = Settler::new(Arc::clone(&promise));
        let executor = Arc::clone(&self.executor);

        self.promise.on_settle(move |outcome| {
            let outcome = outcome.clone();
            executor.execute(Box::new(move || {
                match catch_unwind(AssertUnwindSafe(move || continuation(outcome))) {
                    Ok(Step::Done(result)) => settler.settle(result),
                    Ok(Step::Adopt(task)) => task
                        .promise
                        .on_settle(move |adopted| settler.settle(adopted.clone())),
                    Err(payload) => settler.settle(Err(TaskError::from_panic(payload))),
                }
            }));
        });

        Task {
            promise,
            executor: Arc::clone(&self.executor),
        }
    }

    /// Applies `function` to the value once the task resolves.
    ///
    /// A rejection propagates unchanged and `function` is not called.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use deferred_task::Task;
    ///
    /// assert_eq!(Task::spawn(|| 20).fmap(|x| x + 1).value().unwrap(), 21);
    /// ```
    pub fn fmap<U, F>(&self, function: F) -> Task<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.chain(move |outcome| Step::Done(outcome.map(function)))
    }

    /// Chains a task-producing `function` onto the value and flattens the
    /// result.
    ///
    /// The returned task adopts the outcome of the task `function` produces.
    /// A rejection propagates unchanged and `function` is not called.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use deferred_task::Task;
    ///
    /// let task = Task::spawn(|| 6).bind(|x| Task::spawn(move || x * 7));
    /// assert_eq!(task.value().unwrap(), 42);
    /// ```
    pub fn bind<U, F>(&self, function: F) -> Task<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> Task<U> + Send + 'static,
    {
        self.chain(move |outcome| match outcome {
            Ok(value) => Step::Adopt(function(value)),
            Err(error) => Step::Done(Err(error)),
        })
    }

    /// Alias for [`Task::bind`].
    pub fn and_then<U, F>(&self, function: F) -> Task<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> Task<U> + Send + 'static,
    {
        self.bind(function)
    }

    /// Falls back to the task `function` produces if this task is rejected.
    ///
    /// `function` receives the captured error. A resolved task passes through
    /// unchanged and `function` is not called.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use deferred_task::Task;
    ///
    /// let primary: Task<&str> = Task::rejected("primary down");
    /// let task = primary.or(|_| Task::spawn(|| "replica"));
    /// assert_eq!(task.value().unwrap(), "replica");
    /// ```
    pub fn or<F>(&self, function: F) -> Self
    where
        F: FnOnce(TaskError) -> Self + Send + 'static,
    {
        self.chain(move |outcome| match outcome {
            Ok(value) => Step::Done(Ok(value)),
            Err(error) => Step::Adopt(function(error)),
        })
    }

    /// Turns a rejection into a value computed from the captured error.
    ///
    /// Unlike [`Task::or`], `function` returns a plain value, and the new task
    /// resolves with it. A resolved task passes through unchanged.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use deferred_task::Task;
    ///
    /// let task: Task<String> = Task::rejected("timeout");
    /// let recovered = task.or_fmap(|error| format!("fallback after {error}"));
    /// assert_eq!(recovered.to_result().unwrap(), "fallback after timeout");
    /// ```
    pub fn or_fmap<F>(&self, function: F) -> Self
    where
        F: FnOnce(TaskError) -> T + Send + 'static,
    {
        self.chain(move |outcome| Step::Done(outcome.or_else(|error| Ok(function(error)))))
    }

    /// Combines two tasks with `function` once both resolve.
    ///
    /// If either task is rejected the result is rejected; when both are,
    /// the receiver's error wins.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use deferred_task::Task;
    ///
    /// let sum = Task::spawn(|| 20).zip_with(&Task::spawn(|| 22), |a, b| a + b);
    /// assert_eq!(sum.value().unwrap(), 42);
    /// ```
    pub fn zip_with<U, V, F>(&self, other: &Task<U>, function: F) -> Task<V>
    where
        U: Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
        F: FnOnce(T, U) -> V + Send + 'static,
    {
        let other = other.clone();
        self.bind(move |left| other.fmap(move |right| function(left, right)))
    }

    /// Pairs the values of two tasks.
    pub fn zip<U>(&self, other: &Task<U>) -> Task<(T, U)>
    where
        U: Clone + Send + Sync + 'static,
    {
        self.zip_with(other, |left, right| (left, right))
    }

    /// Keeps the outcome shape and drops the value.
    pub fn discard(&self) -> Task<()> {
        self.fmap(|_| ())
    }
}

// =============================================================================
// Textual representation
// =============================================================================

impl<T: fmt::Debug> fmt::Debug for Task<T> {
    /// Renders `Task(state=pending)`, `Task(state=resolved value=..)` or
    /// `Task(state=rejected error=..)`, with the value or error in its
    /// `Debug` form. Never blocks.
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state() {
            TaskState::Pending => formatter.write_str("Task(state=pending)"),
            TaskState::Resolved(value) => {
                write!(formatter, "Task(state=resolved value={value:?})")
            }
            TaskState::Rejected(error) => {
                write!(formatter, "Task(state=rejected error={error:?})")
            }
        }
    }
}

impl<T: fmt::Debug> fmt::Display for Task<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, formatter)
    }
}
