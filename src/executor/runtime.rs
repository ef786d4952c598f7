//! Shared tokio runtime and the blocking-pool executor built on it.
//!
//! Task computations are ordinary blocking closures, so they belong on a
//! runtime's blocking pool rather than on its async worker threads. This
//! module owns one process-wide multi-thread runtime, created lazily on first
//! use, and exposes [`BlockingPool`], the executor that hands jobs to
//! `spawn_blocking`.
//!
//! # Configuration
//!
//! The global runtime is built from a [`RuntimeConfig`]. Install one with
//! [`configure`] before the first task runs on the default executor; once
//! the runtime exists its configuration is fixed.
//!
//! ```rust
//! use deferred_task::executor::runtime::{self, RuntimeConfig};
//!
//! let config = RuntimeConfig::default()
//!     .with_max_blocking_threads(64)
//!     .with_thread_name("my-app-task");
//!
//! // Fails with `AlreadyInitialized` if the runtime was already started.
//! let _ = runtime::configure(config);
//! ```
//!
//! # Handle selection
//!
//! [`handle`] prefers the runtime the caller is currently running in, so
//! tasks created from inside an application's own tokio runtime use that
//! runtime's blocking pool. Outside any runtime it falls back to the global
//! one.

use std::error::Error;
use std::fmt;
use std::sync::{LazyLock, OnceLock};
use std::time::Duration;

use tokio::runtime::{Builder, Handle, Runtime};
use tracing::debug;

use super::{Executor, Job};

// =============================================================================
// Configuration
// =============================================================================

/// Settings for the global runtime.
///
/// # Examples
///
/// ```rust
/// use deferred_task::executor::runtime::RuntimeConfig;
/// use std::time::Duration;
///
/// let config = RuntimeConfig::default()
///     .with_worker_threads(2)
///     .with_max_blocking_threads(16)
///     .with_thread_keep_alive(Duration::from_secs(1));
///
/// assert_eq!(config.worker_threads(), 2);
/// assert_eq!(config.max_blocking_threads(), 16);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    worker_threads: usize,
    max_blocking_threads: usize,
    thread_name: String,
    thread_keep_alive: Duration,
}

impl RuntimeConfig {
    /// Default upper bound on blocking-pool threads.
    pub const DEFAULT_MAX_BLOCKING_THREADS: usize = 512;

    /// Default thread name.
    pub const DEFAULT_THREAD_NAME: &'static str = "deferred-task-blocking";

    /// Default idle time before a blocking-pool thread exits.
    pub const DEFAULT_THREAD_KEEP_ALIVE: Duration = Duration::from_secs(10);

    /// Sets the number of async worker threads.
    #[must_use]
    pub const fn with_worker_threads(mut self, worker_threads: usize) -> Self {
        self.worker_threads = worker_threads;
        self
    }

    /// Sets the maximum number of blocking-pool threads, which bounds how
    /// many task computations run at once.
    #[must_use]
    pub const fn with_max_blocking_threads(mut self, max_blocking_threads: usize) -> Self {
        self.max_blocking_threads = max_blocking_threads;
        self
    }

    /// Sets the name given to runtime threads.
    #[must_use]
    pub fn with_thread_name(mut self, thread_name: impl Into<String>) -> Self {
        self.thread_name = thread_name.into();
        self
    }

    /// Sets how long an idle blocking-pool thread is kept.
    #[must_use]
    pub const fn with_thread_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.thread_keep_alive = keep_alive;
        self
    }

    /// Number of async worker threads.
    #[must_use]
    pub const fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    /// Maximum number of blocking-pool threads.
    #[must_use]
    pub const fn max_blocking_threads(&self) -> usize {
        self.max_blocking_threads
    }

    /// Thread name.
    #[must_use]
    pub fn thread_name(&self) -> &str {
        &self.thread_name
    }

    /// Idle keep-alive of blocking-pool threads.
    #[must_use]
    pub const fn thread_keep_alive(&self) -> Duration {
        self.thread_keep_alive
    }

    /// Checks that the thread counts are non-zero.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidWorkerThreads`] or
    /// [`ConfigError::InvalidMaxBlockingThreads`] for a zero count.
    pub const fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_threads == 0 {
            return Err(ConfigError::InvalidWorkerThreads);
        }
        if self.max_blocking_threads == 0 {
            return Err(ConfigError::InvalidMaxBlockingThreads);
        }
        Ok(())
    }

    fn build(&self) -> std::io::Result<Runtime> {
        Builder::new_multi_thread()
            .worker_threads(self.worker_threads)
            .max_blocking_threads(self.max_blocking_threads)
            .thread_name(self.thread_name.clone())
            .thread_keep_alive(self.thread_keep_alive)
            .enable_all()
            .build()
    }
}

impl Default for RuntimeConfig {
    /// One worker thread per CPU core, 512 blocking threads, 10 s keep-alive.
    fn default() -> Self {
        Self {
            worker_threads: num_cpus::get(),
            max_blocking_threads: Self::DEFAULT_MAX_BLOCKING_THREADS,
            thread_name: Self::DEFAULT_THREAD_NAME.to_string(),
            thread_keep_alive: Self::DEFAULT_THREAD_KEEP_ALIVE,
        }
    }
}

/// Errors returned when configuring the global runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// The global runtime was already configured or already started.
    AlreadyInitialized,

    /// `worker_threads` was zero.
    InvalidWorkerThreads,

    /// `max_blocking_threads` was zero.
    InvalidMaxBlockingThreads,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyInitialized => write!(
                formatter,
                "global runtime is already configured or running: configure it before first use"
            ),
            Self::InvalidWorkerThreads => {
                write!(formatter, "worker thread count must be greater than 0")
            }
            Self::InvalidMaxBlockingThreads => {
                write!(formatter, "blocking thread limit must be greater than 0")
            }
        }
    }
}

impl Error for ConfigError {}

static CONFIG: OnceLock<RuntimeConfig> = OnceLock::new();

/// Installs the configuration of the global runtime.
///
/// Must be called before anything starts the runtime (creating a task on the
/// default executor, or calling [`global`] / [`handle`] outside a runtime).
///
/// # Errors
///
/// - [`ConfigError::InvalidWorkerThreads`] / [`ConfigError::InvalidMaxBlockingThreads`]
///   if the configuration does not validate.
/// - [`ConfigError::AlreadyInitialized`] if a configuration was already
///   installed, explicitly or by starting the runtime with the defaults.
pub fn configure(config: RuntimeConfig) -> Result<(), ConfigError> {
    config.validate()?;
    CONFIG
        .set(config)
        .map_err(|_| ConfigError::AlreadyInitialized)
}

/// The configuration the global runtime is (or will be) built with.
#[must_use]
pub fn config() -> &'static RuntimeConfig {
    CONFIG.get_or_init(RuntimeConfig::default)
}

// =============================================================================
// Global Runtime
// =============================================================================

static GLOBAL_RUNTIME: LazyLock<Runtime> = LazyLock::new(|| {
    let config = config();
    debug!(
        worker_threads = config.worker_threads(),
        max_blocking_threads = config.max_blocking_threads(),
        thread_name = config.thread_name(),
        "starting global task runtime"
    );
    config
        .build()
        .expect("Failed to create global tokio runtime")
});

/// Returns the global runtime, starting it on first call.
///
/// # Panics
///
/// Panics if the operating system refuses to create the runtime's threads.
#[inline]
#[must_use]
pub fn global() -> &'static Runtime {
    &GLOBAL_RUNTIME
}

/// Returns a handle to the current runtime, or to the global one.
///
/// Inside a tokio runtime this is `Handle::current()`. Outside, it is a
/// handle to [`global`], which starts the global runtime.
#[inline]
#[must_use]
pub fn handle() -> Handle {
    Handle::try_current().unwrap_or_else(|_| global().handle().clone())
}

// =============================================================================
// BlockingPool
// =============================================================================

/// Runs jobs with `spawn_blocking` on a tokio runtime.
///
/// The blocking pool grows on demand up to the runtime's
/// `max_blocking_threads` and retires idle threads after the keep-alive, so
/// it suits task computations that block on I/O. Jobs submitted while the
/// runtime is shutting down are dropped, rejecting their tasks with
/// [`Abandoned`](crate::Abandoned).
///
/// # Examples
///
/// ```rust
/// use deferred_task::Task;
/// use deferred_task::executor::BlockingPool;
/// use std::sync::Arc;
///
/// let task = Task::on(Arc::new(BlockingPool::global()), || Ok::<_, String>(6 * 7));
/// assert_eq!(task.value().unwrap(), 42);
/// ```
#[derive(Debug, Clone)]
pub struct BlockingPool {
    /// `None` targets the global runtime, resolved when the first job is
    /// submitted.
    handle: Option<Handle>,
}

impl BlockingPool {
    /// Uses the global runtime.
    ///
    /// The runtime is not started until a job is submitted, so the
    /// configuration can still be installed with [`configure`] after this
    /// executor has been created.
    #[must_use]
    pub const fn global() -> Self {
        Self { handle: None }
    }

    /// Uses the runtime the caller is running in, or the global runtime.
    ///
    /// The choice is made now, through [`handle`], so outside a runtime this
    /// starts the global runtime.
    #[must_use]
    pub fn current() -> Self {
        Self::from_handle(handle())
    }

    /// Uses the runtime behind `handle`.
    #[must_use]
    pub const fn from_handle(handle: Handle) -> Self {
        Self {
            handle: Some(handle),
        }
    }

    /// The runtime handle jobs are spawned on.
    ///
    /// For a pool on the global runtime this starts the runtime.
    #[must_use]
    pub fn handle(&self) -> &Handle {
        self.handle
            .as_ref()
            .unwrap_or_else(|| global().handle())
    }
}

impl Executor for BlockingPool {
    fn execute(&self, job: Job) {
        drop(self.handle().spawn_blocking(job));
    }
}
