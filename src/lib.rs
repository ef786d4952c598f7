//! # deferred-task
//!
//! Deferred computations that run on background threads, with a monadic
//! interface for composing them.
//!
//! ## Overview
//!
//! A [`Task<T>`] starts its computation as soon as it is created and settles
//! exactly once, either resolved with a value or rejected with an error.
//! Failures, including panics, are captured and stay inert until someone
//! asks for them.
//!
//! - **Construction**: [`Task::new`], [`Task::on`], [`Task::spawn`], [`Task::pure`]
//! - **Composition** (non-blocking): [`Task::fmap`], [`Task::bind`], [`Task::or`],
//!   [`Task::or_fmap`], [`Task::zip`], [`Task::sequence`]
//! - **Observation**: [`Task::wait`], [`Task::value`], [`Task::value_or`],
//!   [`Task::to_result`], [`Task::to_maybe`], [`Task::state`]
//! - **Executors**: pluggable threading policy, see [`executor`]
//!
//! ## Feature Flags
//!
//! - `runtime` (default): the default executor is the blocking pool of a shared
//!   tokio runtime, configurable through [`executor::runtime`]
//! - `rayon`: [`executor::FixedPool`], a fixed-size thread pool
//!
//! Without `runtime`, the default executor spawns one thread per task.
//!
//! ## Example
//!
//! ```rust
//! use deferred_task::prelude::*;
//!
//! let price = Task::new(|| "120".parse::<u32>());
//! let quantity = Task::spawn(|| 3_u32);
//!
//! let total = price
//!     .zip_with(&quantity, |price, quantity| price * quantity)
//!     .or_fmap(|_| 0);
//!
//! assert_eq!(total.value().unwrap(), 360);
//! println!("{total}"); // Task(state=resolved value=360)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Prelude module for convenient imports.
///
/// # Usage
///
/// ```rust
/// use deferred_task::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{TaskError, UnwrapError};
    pub use crate::executor::{Executor, default_executor, immediate, thread_per_task};
    pub use crate::task::{Status, Task, TaskState};
}

pub mod error;
pub mod executor;
pub mod task;

pub use error::{Abandoned, BoxError, Panicked, TaskError, UnwrapError};
pub use task::{Status, Task, TaskState};
