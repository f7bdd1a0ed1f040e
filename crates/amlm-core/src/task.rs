//! Task runner: executes cancellable, progress-reporting work on an executor.
//!
//! A [`Task`] receives the [`Promise`] of the future handed back to the
//! caller. It reports results and progress through it and polls
//! [`Promise::is_canceled`] to stop early. The runner owns the rest of the
//! lifecycle:
//!
//! - the future is started before [`TaskRunner::start`] returns;
//! - a task canceled before it got a thread never runs;
//! - returned errors and panics are captured on the future;
//! - the future is finished exactly once, after the body returns.
//!
//! # Example
//!
//! ```
//! use amlm_core::{Promise, TaskError, TaskRunner};
//!
//! let runner = TaskRunner::global();
//! let future = runner.start(|promise: &Promise<u64>| -> Result<(), TaskError> {
//!     promise.report_progress_range(0, 3);
//!     for i in 1..=3 {
//!         if promise.is_canceled() {
//!             return Err(TaskError::Canceled);
//!         }
//!         promise.report_result(i * i);
//!         promise.report_progress_value(i as i64);
//!     }
//!     Ok(())
//! });
//!
//! assert_eq!(future.results().unwrap(), vec![1, 4, 9]);
//! ```

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use crate::error::TaskError;
use crate::executor::{SharedExecutor, default_executor};
use crate::future::{Future, Promise};
use crate::logging::{span_names, targets};

/// Identifies one started task in log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    /// Get the raw u64 value of this task ID.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

fn next_task_id() -> TaskId {
    TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
}

/// A unit of work driven by the [`TaskRunner`].
///
/// Implemented for every `FnMut(&Promise<T>) -> Result<(), TaskError>`
/// closure, so most callers never name this trait.
pub trait Task<T: Send + 'static>: Send + 'static {
    /// Do the work, reporting through `promise`.
    ///
    /// The body may finish the promise itself; otherwise the runner does it
    /// after `run` returns.
    fn run(&mut self, promise: &Promise<T>) -> Result<(), TaskError>;
}

impl<T, F> Task<T> for F
where
    T: Send + 'static,
    F: FnMut(&Promise<T>) -> Result<(), TaskError> + Send + 'static,
{
    fn run(&mut self, promise: &Promise<T>) -> Result<(), TaskError> {
        self(promise)
    }
}

/// Runs tasks on an executor and reports them through futures.
#[derive(Clone)]
pub struct TaskRunner {
    executor: SharedExecutor,
    active: Arc<AtomicUsize>,
}

impl TaskRunner {
    /// A runner that schedules on `executor`.
    pub fn new(executor: SharedExecutor) -> Self {
        Self {
            executor,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// The process-wide runner on the global thread pool.
    pub fn global() -> &'static TaskRunner {
        static GLOBAL: OnceLock<TaskRunner> = OnceLock::new();
        GLOBAL.get_or_init(|| TaskRunner::new(default_executor()))
    }

    /// The executor task bodies run on.
    pub fn executor(&self) -> SharedExecutor {
        self.executor.clone()
    }

    /// Number of tasks scheduled or running.
    pub fn active_tasks(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Start `task` and return its future immediately.
    pub fn start<T, K>(&self, task: K) -> Future<T>
    where
        T: Send + 'static,
        K: Task<T>,
    {
        self.start_with_id(task).1
    }

    /// Like [`start`](Self::start), also returning the id used in log output.
    pub fn start_with_id<T, K>(&self, task: K) -> (TaskId, Future<T>)
    where
        T: Send + 'static,
        K: Task<T>,
    {
        let id = next_task_id();
        let promise = Promise::with_executor(self.executor.clone());
        promise.report_started();
        let future = promise.future();

        self.active.fetch_add(1, Ordering::AcqRel);
        let active = ActiveGuard(self.active.clone());
        tracing::debug!(target: targets::TASK, task = id.as_u64(), "task scheduled");

        self.executor.execute(Box::new(move || {
            let _active = active;
            execute(id, task, promise);
        }));
        (id, future)
    }

    /// Run a closure producing one value.
    ///
    /// A panic in `f` is captured as [`TaskError::Panicked`].
    pub fn run<R, F>(&self, f: F) -> Future<R>
    where
        R: Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        let mut f = Some(f);
        self.start(move |promise: &Promise<R>| -> Result<(), TaskError> {
            if let Some(f) = f.take() {
                promise.report_result(f());
            }
            Ok(())
        })
    }
}

impl std::fmt::Debug for TaskRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRunner")
            .field("active_tasks", &self.active_tasks())
            .finish()
    }
}

/// Decrements the active counter even if the job is dropped unrun.
struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

fn execute<T, K>(id: TaskId, mut task: K, promise: Promise<T>)
where
    T: Send + 'static,
    K: Task<T>,
{
    let _span =
        tracing::debug_span!(target: targets::TASK, span_names::TASK_RUN, task = id.as_u64())
            .entered();

    if promise.is_canceled() {
        tracing::debug!(target: targets::TASK, "canceled before start; body skipped");
        promise.report_finished();
        return;
    }

    let outcome = catch_unwind(AssertUnwindSafe(|| task.run(&promise)));
    let error = match outcome {
        Ok(Ok(())) => None,
        Ok(Err(error)) => Some(error),
        Err(payload) => Some(TaskError::from_panic(payload)),
    };

    if promise.is_finished() {
        if let Some(error) = error {
            tracing::warn!(target: targets::TASK, %error, "error after the task finished its promise; dropped");
        }
        return;
    }
    if let Some(error) = error {
        tracing::debug!(target: targets::TASK, %error, "task failed");
        promise.report_exception(error);
    }
    // A pending cancel request already left the canceled flag set.
    promise.report_finished();
}

static_assertions::assert_impl_all!(TaskRunner: Send, Sync, Clone);
