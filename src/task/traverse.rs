//! Collecting many tasks into one.
//!
//! `sequence` watches every input cell directly. A cursor walks the inputs
//! in order as they settle, copying each value once, so collecting `n`
//! tasks costs `O(n)` clones regardless of the order they finish in.

use std::mem;
use std::sync::Arc;

use parking_lot::Mutex;

use super::Task;
use super::promise::{Outcome, Promise, Settler};

struct Collector<T: 'static> {
    tasks: Vec<Task<T>>,
    progress: Mutex<Progress<T>>,
}

struct Progress<T: 'static> {
    next: usize,
    values: Vec<T>,
    settler: Option<Settler<Vec<T>>>,
}

impl<T: Clone + Send + Sync + 'static> Collector<T> {
    /// Moves the cursor past every settled input at the front and settles
    /// the collection once it reaches the end or a rejection.
    fn advance(&self) {
        let mut progress = self.progress.lock();
        if progress.settler.is_none() {
            return;
        }

        let outcome: Outcome<Vec<T>> = loop {
            let Some(task) = self.tasks.get(progress.next) else {
                break Ok(mem::take(&mut progress.values));
            };
            match task.promise.outcome() {
                None => return,
                Some(Ok(value)) => {
                    progress.values.push(value.clone());
                    progress.next += 1;
                }
                Some(Err(error)) => break Err(error.clone()),
            }
        };

        let settler = progress.settler.take();
        drop(progress);
        if let Some(settler) = settler {
            settler.settle(outcome);
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Task<Vec<T>> {
    /// Turns a sequence of tasks into a task of their values, in order.
    ///
    /// The result resolves once every task has resolved. It is rejected with
    /// the error of the first rejected task in iteration order, as soon as
    /// every task before that one has resolved. An empty input yields
    /// `Task::pure(vec![])`.
    ///
    /// The tasks keep running concurrently; only the collection is ordered.
    /// Derived tasks run on the first task's executor.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use deferred_task::Task;
    ///
    /// let tasks = (1..=3).map(|n| Task::spawn(move || n * 10));
    /// assert_eq!(Task::sequence(tasks).value().unwrap(), vec![10, 20, 30]);
    /// ```
    pub fn sequence<I>(tasks: I) -> Self
    where
        I: IntoIterator<Item = Task<T>>,
    {
        let tasks: Vec<Task<T>> = tasks.into_iter().collect();
        let Some(executor) = tasks.first().map(|task| Arc::clone(&task.executor)) else {
            return Self::pure(Vec::new());
        };

        let promise = Arc::new(Promise::pending());
        let collector = Arc::new(Collector {
            progress: Mutex::new(Progress {
                next: 0,
                values: Vec::with_capacity(tasks.len()),
                settler: Some(Settler::new(Arc::clone(&promise))),
            }),
            tasks,
        });

        for task in &collector.tasks {
            let collector = Arc::clone(&collector);
            task.promise.on_settle(move |_| collector.advance());
        }

        Self { promise, executor }
    }

    /// Maps every item to a task and collects the values, in order.
    ///
    /// Equivalent to `Task::sequence(items.into_iter().map(function))`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use deferred_task::Task;
    ///
    /// let lengths = Task::traverse(["a", "bb", "ccc"], |word| Task::spawn(move || word.len()));
    /// assert_eq!(lengths.value().unwrap(), vec![1, 2, 3]);
    ///
    /// let parsed = Task::traverse(["1", "x"], |text| Task::new(move || text.parse::<i32>()));
    /// assert!(parsed.to_maybe().is_none());
    /// ```
    pub fn traverse<A, I, F>(items: I, function: F) -> Self
    where
        I: IntoIterator<Item = A>,
        F: FnMut(A) -> Task<T>,
    {
        Self::sequence(items.into_iter().map(function))
    }
}
