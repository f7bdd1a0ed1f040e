//! The producer half of a future.

use std::sync::Arc;

use crate::error::TaskError;
use crate::executor::{SharedExecutor, default_executor};
use crate::logging::targets;
use crate::progress::ProgressInfo;

use super::Future;
use super::state::{FutureState, SharedState};

/// Producer handle for a [`Future`].
///
/// There is exactly one `Promise` per shared state; it is the only handle
/// allowed to call `report_*`. Consumers get [`Future`] clones via
/// [`future`](Self::future).
///
/// Dropping a promise that was never finished reports
/// [`TaskError::BrokenPromise`], then Canceled and Finished, so no waiter is
/// left blocked forever.
///
/// # Example
///
/// ```
/// use amlm_core::Promise;
///
/// let promise = Promise::<u32>::new();
/// let future = promise.future();
///
/// promise.report_started();
/// promise.report_progress_range(0, 2);
/// promise.report_result(1);
/// promise.report_progress_value(1);
/// promise.report_result(2);
/// promise.report_progress_value(2);
/// promise.report_finished();
///
/// assert_eq!(future.results().unwrap(), vec![1, 2]);
/// assert_eq!(future.progress_value(), 2);
/// ```
pub struct Promise<T: Send + 'static> {
    shared: Arc<SharedState<T>>,
}

impl<T: Send + 'static> Promise<T> {
    /// Create a promise whose continuations schedule on the global pool.
    pub fn new() -> Self {
        Self::with_executor(default_executor())
    }

    /// Create a promise whose late continuations schedule on `executor`.
    pub fn with_executor(executor: SharedExecutor) -> Self {
        Self {
            shared: SharedState::new(executor),
        }
    }

    /// A consumer handle to the same state.
    pub fn future(&self) -> Future<T> {
        Future::from_shared(self.shared.clone())
    }

    /// Mark the work as started and running.
    pub fn report_started(&self) {
        self.shared.report_started();
    }

    /// Append a result.
    ///
    /// Results keep flowing after cancellation; reporting after
    /// [`report_finished`](Self::report_finished) is a usage error.
    pub fn report_result(&self, value: T) {
        self.shared.report_result(None, value);
    }

    /// Store a result at a specific index.
    ///
    /// Results become visible to consumers only once every lower index is
    /// present.
    pub fn report_result_at(&self, index: usize, value: T) {
        self.shared.report_result(Some(index), value);
    }

    /// Append several results in order.
    pub fn report_results(&self, values: impl IntoIterator<Item = T>) {
        for value in values {
            self.report_result(value);
        }
    }

    /// Set the canceled flag. Waiters are not woken until finished.
    pub fn report_canceled(&self) {
        self.shared.report_canceled();
    }

    /// Capture an error for consumers. The first error wins and marks the
    /// future canceled.
    pub fn report_exception(&self, error: TaskError) {
        self.shared.report_exception(error);
    }

    /// Finish: wakes waiters, then runs `then` continuations in
    /// registration order on this thread.
    pub fn report_finished(&self) {
        self.shared.report_finished();
    }

    /// Set the progress range.
    pub fn report_progress_range(&self, minimum: i64, maximum: i64) {
        self.shared
            .update_progress(|p| p.set_range(minimum, maximum));
    }

    /// Set the progress value, clamped into the range.
    pub fn report_progress_value(&self, value: i64) {
        self.shared.update_progress(|p| p.set_value(value));
    }

    /// Set the progress description.
    pub fn report_progress_text(&self, text: impl Into<String>) {
        let text = text.into();
        self.shared.update_progress(|p| p.set_text(text));
    }

    /// Set value and description in one update.
    pub fn report_progress(&self, value: i64, text: impl Into<String>) {
        let text = text.into();
        self.shared.update_progress(|p| {
            let value_changed = p.set_value(value);
            p.set_text(text) || value_changed
        });
    }

    pub(crate) fn report_progress_info(&self, info: ProgressInfo) {
        self.shared.update_progress(|p| {
            if *p == info {
                return false;
            }
            *p = info;
            true
        });
    }

    /// Whether cancellation was requested; producers should poll this.
    pub fn is_canceled(&self) -> bool {
        self.shared.state().contains(FutureState::CANCELED)
    }

    /// Whether the promise has been finished.
    pub fn is_finished(&self) -> bool {
        self.shared.state().contains(FutureState::FINISHED)
    }
}

impl<T: Send + 'static> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> Drop for Promise<T> {
    fn drop(&mut self) {
        if self.is_finished() {
            return;
        }
        tracing::warn!(target: targets::FUTURE, "promise dropped before finishing");
        self.shared.report_exception(TaskError::BrokenPromise);
        self.shared.report_finished();
    }
}

impl<T: Send + 'static> std::fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Promise")
            .field("state", &self.shared.state())
            .finish()
    }
}
