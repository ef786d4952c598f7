//! Concurrency tests for `Task`: timed waits, cross-thread observation,
//! exactly-once execution and panic containment.

use deferred_task::executor::{Executor, Job, immediate, thread_per_task};
use deferred_task::{Abandoned, Status, Task, TaskState};
use rstest::rstest;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, mpsc};
use std::thread;
use std::time::{Duration, Instant};

fn gated(value: i32) -> (Task<i32>, mpsc::Sender<()>) {
    let (release, gate) = mpsc::channel::<()>();
    let task = Task::on(thread_per_task(), move || {
        gate.recv().map_err(|error| error.to_string())?;
        Ok::<_, String>(value)
    });
    (task, release)
}

// =============================================================================
// Waiting
// =============================================================================

#[rstest]
fn wait_timeout_returns_pending_task_after_timeout() {
    let (task, release) = gated(1);

    let started = Instant::now();
    let waited = task.wait_timeout(Duration::from_millis(50));

    assert!(started.elapsed() >= Duration::from_millis(50));
    assert!(!waited.is_complete());
    assert_eq!(waited.status(), Status::Pending);

    release.send(()).unwrap();
    assert_eq!(task.value().unwrap(), 1);
}

#[rstest]
fn wait_timeout_returns_early_when_task_settles() {
    let task = Task::on(thread_per_task(), || {
        thread::sleep(Duration::from_millis(20));
        Ok::<_, String>("done")
    });

    let started = Instant::now();
    task.wait_timeout(Duration::from_secs(10));

    assert!(task.is_complete());
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[rstest]
fn wait_timeout_on_terminal_task_returns_immediately() {
    let task = Task::pure(5);
    assert_eq!(task.wait_timeout(Duration::ZERO).status(), Status::Resolved);
}

#[rstest]
fn timed_out_computation_keeps_running() {
    let (task, release) = gated(9);

    task.wait_timeout(Duration::from_millis(1));
    release.send(()).unwrap();

    assert_eq!(task.wait().state(), TaskState::Resolved(&9));
}

// =============================================================================
// Combinators never block the caller
// =============================================================================

#[rstest]
fn combinators_return_while_parent_is_pending() {
    let (parent, release) = gated(2);

    let derived = parent
        .fmap(|x| x * 10)
        .bind(|x| Task::spawn(move || x + 1))
        .or(|_| Task::pure(0))
        .or_fmap(|_| -1);

    assert!(!derived.is_complete());
    assert_eq!(derived.to_string(), "Task(state=pending)");

    release.send(()).unwrap();
    assert_eq!(derived.value().unwrap(), 21);
}

// =============================================================================
// Cross-thread observation
// =============================================================================

#[rstest]
fn many_observers_see_the_same_outcome() {
    let runs = Arc::new(AtomicUsize::new(0));
    let runs_clone = Arc::clone(&runs);
    let start = Arc::new(Barrier::new(9));
    let start_clone = Arc::clone(&start);

    let task = Task::on(thread_per_task(), move || {
        start_clone.wait();
        runs_clone.fetch_add(1, Ordering::SeqCst);
        Ok::<_, String>(String::from("shared"))
    });

    let observers: Vec<_> = (0..8)
        .map(|_| {
            let task = task.clone();
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                task.value().unwrap()
            })
        })
        .collect();

    for observer in observers {
        assert_eq!(observer.join().unwrap(), "shared");
    }
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[rstest]
fn rejected_error_is_identical_across_threads() {
    let task: Task<i32> = Task::new(|| Err("contended failure"));
    let expected = task.to_result().unwrap_err();

    let observers: Vec<_> = (0..4)
        .map(|_| {
            let task = task.clone();
            thread::spawn(move || task.to_result().unwrap_err())
        })
        .collect();

    for observer in observers {
        assert!(observer.join().unwrap().ptr_eq(&expected));
    }
}

#[rstest]
fn long_chain_settles() {
    let task = (0..200).fold(Task::spawn(|| 0_u64), |task, _| task.fmap(|x| x + 1));
    assert_eq!(task.value().unwrap(), 200);
}

// =============================================================================
// Deep recursion
// =============================================================================

/// Runs jobs one after another on a single worker thread.
struct SerialExecutor {
    jobs: mpsc::Sender<Job>,
}

impl Executor for SerialExecutor {
    fn execute(&self, job: Job) {
        // The worker only stops once every sender is gone.
        let _ = self.jobs.send(job);
    }
}

fn serial() -> Arc<dyn Executor> {
    let (jobs, queue) = mpsc::channel::<Job>();
    thread::spawn(move || {
        for job in queue {
            job();
        }
    });
    Arc::new(SerialExecutor { jobs })
}

fn countdown(executor: &Arc<dyn Executor>, remaining: u32) -> Task<u32> {
    let next = Arc::clone(executor);
    Task::on(Arc::clone(executor), move || Ok::<_, String>(remaining)).bind(move |remaining| {
        if remaining == 0 {
            Task::pure_on(next, 0)
        } else {
            countdown(&next, remaining - 1)
        }
    })
}

fn retry(executor: &Arc<dyn Executor>, attempts_left: u32) -> Task<u32> {
    let next = Arc::clone(executor);
    Task::on(Arc::clone(executor), move || {
        if attempts_left == 0 {
            Ok(attempts_left)
        } else {
            Err("not yet")
        }
    })
    .or(move |_| retry(&next, attempts_left - 1))
}

#[rstest]
#[case::serial(serial())]
#[case::immediate(immediate())]
fn recursive_bind_settles_at_depth(#[case] executor: Arc<dyn Executor>) {
    let task = countdown(&executor, 100_000);
    assert_eq!(task.value().unwrap(), 0);
}

#[rstest]
#[case::serial(serial())]
#[case::immediate(immediate())]
fn recursive_retry_settles_at_depth(#[case] executor: Arc<dyn Executor>) {
    let task = retry(&executor, 100_000);
    assert_eq!(task.value().unwrap(), 0);
}

#[rstest]
fn recursive_bind_settles_on_thread_per_task() {
    let task = countdown(&thread_per_task(), 20_000);
    assert_eq!(task.value().unwrap(), 0);
}

#[rstest]
fn deep_chain_on_pending_task_settles_after_release() {
    let (root, release) = gated(0);
    let adopted = Task::pure_on(immediate(), ()).bind(move |()| root);
    let task = (0..100_000).fold(adopted, |task, _| task.fmap(|x| x + 1));
    assert_eq!(task.status(), Status::Pending);

    release.send(()).unwrap();

    assert_eq!(task.value().unwrap(), 100_000);
}

// =============================================================================
// Failure containment
// =============================================================================

#[rstest]
fn panic_in_background_does_not_reach_caller() {
    let task: Task<i32> = Task::spawn(|| panic!("background crash"));

    let error = task.to_result().unwrap_err();

    assert!(error.is_panic());
    assert!(error.to_string().contains("background crash"));
    assert_eq!(task.value_or(|| 3), 3);
}

#[rstest]
fn panic_in_bind_function_rejects_derived_task() {
    let task = Task::spawn(|| 1).bind(|_| -> Task<i32> { panic!("no task for you") });
    assert!(task.to_result().unwrap_err().is_panic());
}

struct DroppingExecutor;

impl Executor for DroppingExecutor {
    fn execute(&self, job: Job) {
        drop(job);
    }
}

#[rstest]
fn dropped_job_rejects_task_with_abandoned() {
    let task: Task<i32> = Task::on(Arc::new(DroppingExecutor), || Ok::<_, String>(1));

    assert!(task.is_complete());
    assert!(task.to_result().unwrap_err().is::<Abandoned>());
}
