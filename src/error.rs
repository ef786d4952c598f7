//! Error types for task computations.
//!
//! A rejected [`Task`](crate::Task) stores its failure as a [`TaskError`]:
//! a cheaply clonable, shared handle to the original error value. The
//! original keeps its concrete type, so it can be recovered with
//! [`TaskError::downcast_ref`], and its identity, so every observer of the
//! same task sees the very same error ([`TaskError::ptr_eq`]).
//!
//! Forcing the value out of a rejected task with [`Task::value`](crate::Task::value)
//! does not hand back the computation error directly. It returns an
//! [`UnwrapError`] that references it, which keeps "a forced unwrap failed"
//! distinguishable from the domain error itself.
//!
//! # Examples
//!
//! ```rust
//! use deferred_task::{Task, TaskError};
//! use deferred_task::executor::immediate;
//!
//! let task: Task<i32> = Task::on(immediate(), || "42x".parse::<i32>());
//!
//! let error: TaskError = task.to_result().unwrap_err();
//! assert!(error.is::<std::num::ParseIntError>());
//! ```

use std::any::Any;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// A boxed, thread-safe error. Any error a computation returns is converted
/// into this type before it is stored.
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

// =============================================================================
// TaskError
// =============================================================================

/// The error captured by a rejected task.
///
/// `TaskError` is a shared handle: cloning it is cheap and the clones point
/// at the same underlying error. `Display`, `Debug` and
/// [`Error::source`] delegate to the wrapped error.
///
/// Equality is identity: two `TaskError`s are equal when they wrap the same
/// allocation.
///
/// # Examples
///
/// ```rust
/// use deferred_task::TaskError;
///
/// let error = TaskError::new("connection refused");
/// let copy = error.clone();
///
/// assert_eq!(error.to_string(), "connection refused");
/// assert!(error.ptr_eq(&copy));
/// assert_ne!(error, TaskError::new("connection refused"));
/// ```
#[derive(Clone)]
pub struct TaskError {
    inner: Arc<dyn Error + Send + Sync + 'static>,
}

impl TaskError {
    /// Wraps an error.
    ///
    /// Anything convertible into a [`BoxError`] is accepted: error types,
    /// `String` and `&str`. Wrapping a `TaskError` returns it unchanged, so
    /// an error keeps its identity when it is propagated from one task to
    /// another.
    pub fn new<E>(error: E) -> Self
    where
        E: Into<BoxError>,
    {
        match error.into().downcast::<Self>() {
            Ok(task_error) => *task_error,
            Err(other) => Self {
                inner: Arc::from(other),
            },
        }
    }

    /// Builds a `TaskError` from the payload of a caught panic.
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        Self::new(Panicked::from_payload(payload.as_ref()))
    }

    /// Returns a reference to the wrapped error if it is of type `E`.
    #[must_use]
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: Error + 'static,
    {
        self.inner.downcast_ref::<E>()
    }

    /// Returns `true` if the wrapped error is of type `E`.
    #[must_use]
    pub fn is<E>(&self) -> bool
    where
        E: Error + 'static,
    {
        self.inner.is::<E>()
    }

    /// Returns `true` if the computation panicked instead of returning an error.
    #[must_use]
    pub fn is_panic(&self) -> bool {
        self.is::<Panicked>()
    }

    /// Returns `true` if both handles point at the same captured error.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Returns the wrapped error as a trait object.
    #[must_use]
    pub fn as_error(&self) -> &(dyn Error + Send + Sync + 'static) {
        self.inner.as_ref()
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, formatter)
    }
}

impl fmt::Debug for TaskError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.inner, formatter)
    }
}

impl Error for TaskError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.inner.source()
    }
}

impl PartialEq for TaskError {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for TaskError {}

// =============================================================================
// UnwrapError
// =============================================================================

/// Returned by [`Task::value`](crate::Task::value) when the task was rejected.
///
/// The captured computation error is available through [`UnwrapError::error`]
/// and as the [`Error::source`] of this error.
///
/// # Examples
///
/// ```rust
/// use deferred_task::Task;
/// use deferred_task::executor::immediate;
/// use std::error::Error;
///
/// let task: Task<i32> = Task::on(immediate(), || Err("disk full"));
/// let unwrap_error = task.value().unwrap_err();
///
/// assert_eq!(unwrap_error.error().to_string(), "disk full");
/// assert_eq!(unwrap_error.source().unwrap().to_string(), "disk full");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnwrapError {
    error: TaskError,
}

impl UnwrapError {
    pub(crate) const fn new(error: TaskError) -> Self {
        Self { error }
    }

    /// The error the task was rejected with.
    #[must_use]
    pub const fn error(&self) -> &TaskError {
        &self.error
    }

    /// Consumes the `UnwrapError`, returning the captured error.
    #[must_use]
    pub fn into_error(self) -> TaskError {
        self.error
    }
}

impl fmt::Display for UnwrapError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "value() called on a rejected task: {}", self.error)
    }
}

impl Error for UnwrapError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.error.as_error())
    }
}

// =============================================================================
// Panicked
// =============================================================================

/// The error stored when a computation or a continuation panics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Panicked {
    message: String,
}

impl Panicked {
    fn from_payload(payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|message| (*message).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "Box<dyn Any>".to_string());
        Self { message }
    }

    /// The panic message, or `Box<dyn Any>` when the payload was not a string.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Panicked {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "task computation panicked: {}", self.message)
    }
}

impl Error for Panicked {}

// =============================================================================
// Abandoned
// =============================================================================

/// The error stored when an executor drops a job without running it.
///
/// This happens when a thread cannot be spawned or when a runtime shuts
/// down with jobs still queued. Settling the task keeps its observers from
/// waiting forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Abandoned;

impl fmt::Display for Abandoned {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "task computation was dropped by its executor before it ran"
        )
    }
}

impl Error for Abandoned {}
