//! Lifecycle states of a task.

use std::fmt;

use crate::error::TaskError;

/// The lifecycle discriminant of a task.
///
/// A task starts `Pending` and moves to exactly one of `Resolved` or
/// `Rejected`. The transition happens once and is never reversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// The computation has not produced an outcome yet.
    Pending,
    /// The computation returned a value.
    Resolved,
    /// The computation returned an error or panicked.
    Rejected,
}

impl Status {
    /// Returns `true` for `Resolved` and `Rejected`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// The lowercase name used in a task's textual representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Resolved => "resolved",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// A non-blocking snapshot of a task, borrowing its outcome.
///
/// Obtained from [`Task::state`](crate::Task::state). Once a snapshot is
/// `Resolved` or `Rejected`, every later snapshot of the same task is
/// identical.
///
/// # Examples
///
/// ```rust
/// use deferred_task::{Task, TaskState};
///
/// let task = Task::pure(42);
/// assert!(matches!(task.state(), TaskState::Resolved(&42)));
/// ```
#[derive(Debug, PartialEq, Eq)]
pub enum TaskState<'a, T> {
    /// No outcome yet.
    Pending,
    /// The value the task resolved with.
    Resolved(&'a T),
    /// The error the task was rejected with.
    Rejected(&'a TaskError),
}

impl<T> TaskState<'_, T> {
    /// The discriminant of this snapshot.
    #[must_use]
    pub const fn status(&self) -> Status {
        match self {
            Self::Pending => Status::Pending,
            Self::Resolved(_) => Status::Resolved,
            Self::Rejected(_) => Status::Rejected,
        }
    }
}

impl<T> Clone for TaskState<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for TaskState<'_, T> {}
