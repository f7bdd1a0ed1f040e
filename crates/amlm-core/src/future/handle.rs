//! The consumer half of a future.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{FutureError, TaskError};
use crate::executor::SharedExecutor;
use crate::progress::ProgressInfo;

use super::state::{FutureEvent, FutureState, ListenerId, SharedState};

/// Consumer handle to the result of asynchronous work.
///
/// `Future` is cheap to clone; all clones observe the same state. Queries
/// never block. [`wait`](Self::wait), [`result`](Self::result),
/// [`get`](Self::get) and [`results`](Self::results) block the calling thread.
pub struct Future<T> {
    pub(crate) shared: Arc<SharedState<T>>,
}

impl<T> Clone for Future<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T: Send + 'static> Future<T> {
    pub(crate) fn from_shared(shared: Arc<SharedState<T>>) -> Self {
        Self { shared }
    }

    /// Current lifecycle flags.
    pub fn state(&self) -> FutureState {
        self.shared.state()
    }

    /// Whether the producer reported start.
    pub fn is_started(&self) -> bool {
        self.state().contains(FutureState::STARTED)
    }

    /// Whether the work is started and not yet finished.
    pub fn is_running(&self) -> bool {
        self.state().contains(FutureState::RUNNING)
    }

    /// Whether cancellation was requested or reported.
    pub fn is_canceled(&self) -> bool {
        self.state().contains(FutureState::CANCELED)
    }

    /// Whether the future reached its terminal state.
    pub fn is_finished(&self) -> bool {
        self.state().contains(FutureState::FINISHED)
    }

    /// Whether the producer captured an error.
    pub fn has_exception(&self) -> bool {
        self.shared.error().is_some()
    }

    /// The captured error, if any.
    pub fn error(&self) -> Option<TaskError> {
        self.shared.error()
    }

    /// Request cooperative cancellation.
    ///
    /// The producer has to notice via `is_canceled()`. Futures returned by
    /// [`then`](Self::then) and [`tap`](Self::tap) pass the request on to the
    /// future they were chained from.
    pub fn cancel(&self) {
        self.shared.cancel();
    }

    /// Block until finished.
    pub fn wait(&self) {
        self.shared.wait();
    }

    /// Alias of [`wait`](Self::wait).
    pub fn wait_for_finished(&self) {
        self.shared.wait();
    }

    /// Block until finished or `timeout` elapses; returns whether it finished.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.shared.wait_timeout(timeout)
    }

    /// Snapshot of the progress.
    pub fn progress(&self) -> ProgressInfo {
        self.shared.progress()
    }

    /// Current progress value.
    pub fn progress_value(&self) -> i64 {
        self.progress().value
    }

    /// Lower bound of the progress range.
    pub fn progress_minimum(&self) -> i64 {
        self.progress().minimum
    }

    /// Upper bound of the progress range.
    pub fn progress_maximum(&self) -> i64 {
        self.progress().maximum
    }

    /// Current progress description.
    pub fn progress_text(&self) -> String {
        self.progress().text
    }

    /// Number of results available without blocking.
    pub fn result_count(&self) -> usize {
        self.shared.ready_count()
    }

    /// Whether result `index` is available without blocking.
    pub fn is_result_ready_at(&self, index: usize) -> bool {
        index < self.result_count()
    }

    /// The executor late continuations are scheduled on.
    pub fn executor(&self) -> SharedExecutor {
        self.shared.executor()
    }

    /// Run `f` with this future once it has finished.
    ///
    /// This is the primitive under [`then`](Self::then): no new future is
    /// created and a panic in `f` is only logged.
    pub fn on_finished<F>(&self, f: F)
    where
        F: FnOnce(Future<T>) + Send + 'static,
    {
        self.shared.enqueue_continuation(Box::new(f));
    }

    /// Register a raw event listener. Events are delivered on the thread that
    /// caused them, with no lock held.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Future<T>, &FutureEvent) + Send + Sync + 'static,
    {
        self.shared.add_listener(Arc::new(
            move |shared: &Arc<SharedState<T>>, event: &FutureEvent| {
                listener(&Future::from_shared(shared.clone()), event)
            },
        ))
    }

    /// Remove a listener added by [`subscribe`](Self::subscribe).
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.shared.remove_listener(id)
    }
}

impl<T: Clone + Send + 'static> Future<T> {
    /// Block until result `index` is available or the future finishes.
    ///
    /// Returns the captured error if the producer failed, and
    /// [`FutureError::NoResultAvailable`] if it finished without that result.
    pub fn result(&self, index: usize) -> Result<T, FutureError> {
        self.shared.result(index)
    }

    /// Convenience for `result(0)`.
    pub fn get(&self) -> Result<T, FutureError> {
        self.result(0)
    }

    /// Block until finished and return all results in index order.
    pub fn results(&self) -> Result<Vec<T>, FutureError> {
        self.shared.results()
    }
}

impl<T> PartialEq for Future<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl<T> Eq for Future<T> {}

impl<T> std::fmt::Debug for Future<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Future").field(&self.shared).finish()
    }
}
