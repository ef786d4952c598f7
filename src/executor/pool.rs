//! Fixed-size thread pool executor.
//!
//! `FixedPool` runs jobs on a rayon thread pool with a fixed number of
//! threads. Use it to put a hard bound on how many task computations run at
//! once. Jobs beyond the capacity wait in the pool's queue.
//!
//! Task continuations never block a pool thread while waiting for a parent
//! task: they are scheduled only once the parent has settled. A pool of one
//! thread can therefore run arbitrarily long `fmap`/`bind` chains.
//!
//! # Examples
//!
//! ```rust
//! use deferred_task::Task;
//! use deferred_task::executor::FixedPool;
//! use std::sync::Arc;
//!
//! let pool = Arc::new(FixedPool::new(2));
//! let task = Task::on(pool, || Ok::<_, String>(10)).fmap(|x| x * 2);
//!
//! assert_eq!(task.value().unwrap(), 20);
//! ```

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use rayon::{ThreadPool, ThreadPoolBuilder};

use super::{Executor, Job};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when creating a `FixedPool`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The pool capacity was set to zero.
    ///
    /// A pool must have at least one thread.
    InvalidCapacity,

    /// The operating system refused to start the pool's threads.
    Build(String),
}

impl fmt::Display for PoolError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCapacity => {
                write!(formatter, "pool capacity must be greater than 0")
            }
            Self::Build(reason) => {
                write!(formatter, "failed to start pool threads: {reason}")
            }
        }
    }
}

impl Error for PoolError {}

// =============================================================================
// FixedPool
// =============================================================================

/// An executor backed by a fixed number of threads.
///
/// Threads are named `deferred-task-pool-<index>`. Cloning a `FixedPool`
/// shares the same threads.
#[derive(Clone)]
pub struct FixedPool {
    capacity: usize,
    pool: Arc<ThreadPool>,
}

impl fmt::Debug for FixedPool {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("FixedPool")
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl FixedPool {
    /// Creates a pool with `capacity` threads.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0 or the threads cannot be started. Use
    /// [`FixedPool::try_new`] for a non-panicking version.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use deferred_task::executor::FixedPool;
    ///
    /// let pool = FixedPool::new(4);
    /// assert_eq!(pool.capacity(), 4);
    /// ```
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self::try_new(capacity).unwrap_or_else(|error| panic!("FixedPool::new: {error}"))
    }

    /// Tries to create a pool with `capacity` threads.
    ///
    /// # Errors
    ///
    /// - [`PoolError::InvalidCapacity`] if `capacity` is 0.
    /// - [`PoolError::Build`] if the threads cannot be started.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use deferred_task::executor::{FixedPool, PoolError};
    ///
    /// assert!(FixedPool::try_new(2).is_ok());
    /// assert_eq!(FixedPool::try_new(0).unwrap_err(), PoolError::InvalidCapacity);
    /// ```
    pub fn try_new(capacity: usize) -> Result<Self, PoolError> {
        if capacity == 0 {
            return Err(PoolError::InvalidCapacity);
        }

        let pool = ThreadPoolBuilder::new()
            .num_threads(capacity)
            .thread_name(|index| format!("deferred-task-pool-{index}"))
            .build()
            .map_err(|error| PoolError::Build(error.to_string()))?;

        Ok(Self {
            capacity,
            pool: Arc::new(pool),
        })
    }

    /// Number of threads in the pool.
    #[must_use]
    #[inline]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for FixedPool {
    /// One thread per CPU core.
    fn default() -> Self {
        Self::new(rayon::current_num_threads().max(1))
    }
}

impl Executor for FixedPool {
    fn execute(&self, job: Job) {
        self.pool.spawn(job);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    #[rstest]
    fn new_creates_pool_with_capacity() {
        assert_eq!(FixedPool::new(3).capacity(), 3);
    }

    #[rstest]
    #[should_panic(expected = "pool capacity must be greater than 0")]
    fn new_panics_on_zero_capacity() {
        let _ = FixedPool::new(0);
    }

    #[rstest]
    fn try_new_returns_err_for_zero_capacity() {
        assert_eq!(FixedPool::try_new(0).unwrap_err(), PoolError::InvalidCapacity);
    }

    #[rstest]
    fn pool_error_display() {
        assert_eq!(
            PoolError::InvalidCapacity.to_string(),
            "pool capacity must be greater than 0"
        );
        assert!(
            PoolError::Build("no threads".to_string())
                .to_string()
                .contains("no threads")
        );
    }

    #[rstest]
    fn debug_shows_capacity() {
        let debug = format!("{:?}", FixedPool::new(2));
        assert!(debug.contains("FixedPool"));
        assert!(debug.contains("capacity: 2"));
    }

    #[rstest]
    fn jobs_run_on_pool_threads() {
        let pool = FixedPool::new(2);
        let (sender, receiver) = mpsc::channel();

        for _ in 0..4 {
            let sender = sender.clone();
            pool.execute(Box::new(move || {
                let name = thread::current().name().map(str::to_string);
                sender.send(name).unwrap();
            }));
        }

        for _ in 0..4 {
            let name = receiver
                .recv_timeout(Duration::from_secs(5))
                .unwrap()
                .unwrap();
            assert!(name.starts_with("deferred-task-pool-"));
        }
    }
}
