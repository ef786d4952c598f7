#![cfg(feature = "runtime")]
//! Integration tests for the executors behind `Task`.

use deferred_task::Task;
use deferred_task::executor::runtime::{self, ConfigError, RuntimeConfig};
use deferred_task::executor::{BlockingPool, Executor, ImmediateExecutor, ThreadPerTask, default_executor};
use rstest::rstest;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn current_thread_name() -> String {
    thread::current().name().unwrap_or_default().to_string()
}

// =============================================================================
// Default executor and runtime configuration
// =============================================================================

#[rstest]
fn configure_applies_to_lazily_started_runtime() {
    // Another test in this binary may already have started the runtime.
    let config = RuntimeConfig::default()
        .with_worker_threads(2)
        .with_thread_name("executor-tests");

    match runtime::configure(config.clone()) {
        Ok(()) => assert_eq!(runtime::config(), &config),
        Err(error) => assert_eq!(error, ConfigError::AlreadyInitialized),
    }
}

#[rstest]
fn configure_rejects_zero_blocking_threads() {
    let result = runtime::configure(RuntimeConfig::default().with_max_blocking_threads(0));
    assert_eq!(result, Err(ConfigError::InvalidMaxBlockingThreads));
}

#[rstest]
fn default_executor_runs_off_the_calling_thread() {
    let caller = thread::current().id();
    let task = Task::on(default_executor(), move || Ok::<_, String>(thread::current().id()));

    assert_ne!(task.value().unwrap(), caller);
}

#[rstest]
fn blocking_pool_runs_on_runtime_threads() {
    let task = Task::on(Arc::new(BlockingPool::global()), || {
        Ok::<_, String>(current_thread_name())
    });

    assert_eq!(task.value().unwrap(), runtime::config().thread_name());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn blocking_pool_current_uses_ambient_runtime() {
    let pool = BlockingPool::current();
    let task = Task::on(Arc::new(pool), || Ok::<_, String>(6 * 7));

    let value = tokio::task::spawn_blocking(move || task.value())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(value, 42);
}

#[rstest]
fn many_tasks_on_default_executor() {
    let tasks: Vec<Task<usize>> = (0..64)
        .map(|index| {
            Task::new(move || {
                thread::sleep(Duration::from_millis(1));
                Ok::<_, String>(index)
            })
        })
        .collect();

    let total: usize = Task::sequence(tasks).value().unwrap().into_iter().sum();
    assert_eq!(total, (0..64).sum());
}

// =============================================================================
// ThreadPerTask
// =============================================================================

#[rstest]
fn thread_per_task_names_threads_with_prefix() {
    let executor = Arc::new(ThreadPerTask::new().with_name_prefix("report-worker"));
    let task = Task::on(executor, || Ok::<_, String>(current_thread_name()));

    assert!(task.value().unwrap().starts_with("report-worker-"));
}

#[rstest]
fn derived_tasks_inherit_thread_per_task() {
    let executor: Arc<dyn Executor> = Arc::new(ThreadPerTask::new().with_name_prefix("chain"));
    let task = Task::pure_on(executor, ()).fmap(|()| current_thread_name());

    assert!(task.value().unwrap().starts_with("chain-"));
}

#[rstest]
fn immediate_executor_runs_on_caller() {
    let caller = current_thread_name();
    let task = Task::on(Arc::new(ImmediateExecutor), || Ok::<_, String>(current_thread_name()));

    assert!(task.is_complete());
    assert_eq!(task.value().unwrap(), caller);
}

// =============================================================================
// FixedPool
// =============================================================================

#[cfg(feature = "rayon")]
mod fixed_pool {
    use super::*;
    use deferred_task::executor::{FixedPool, PoolError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[rstest]
    fn zero_capacity_is_rejected() {
        assert_eq!(FixedPool::try_new(0).unwrap_err(), PoolError::InvalidCapacity);
    }

    #[rstest]
    fn single_thread_pool_runs_long_chains() {
        let pool: Arc<dyn Executor> = Arc::new(FixedPool::new(1));

        let task = (0..100).fold(Task::pure_on(pool, 0), |task, _| {
            task.bind(|x| Task::pure(x + 1)).fmap(|x| x + 1)
        });

        assert_eq!(task.value().unwrap(), 200);
    }

    #[rstest]
    fn pool_bounds_concurrency() {
        let pool: Arc<dyn Executor> = Arc::new(FixedPool::new(2));
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<Task<()>> = (0..8)
            .map(|_| {
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                Task::on(Arc::clone(&pool), move || {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(10));
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, String>(())
                })
            })
            .collect();

        Task::sequence(tasks).wait();

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}
