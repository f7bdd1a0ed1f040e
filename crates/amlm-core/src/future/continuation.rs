//! Chaining: `then`, `then_on`, `tap` and `finally`.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::TaskError;
use crate::executor::SharedExecutor;
use crate::logging::targets;

use super::state::{FutureEvent, SharedState};
use super::{Future, Promise};

/// Make `downstream.cancel()` also cancel `upstream`.
///
/// Only a weak reference is kept so a chain never keeps its source alive.
pub(crate) fn link_cancel<D, U>(downstream: &Future<D>, upstream: &Future<U>)
where
    D: Send + 'static,
    U: Send + 'static,
{
    let weak = Arc::downgrade(&upstream.shared);
    downstream.shared.add_cancel_hook(move || {
        if let Some(upstream) = weak.upgrade() {
            upstream.cancel();
        }
    });
}

fn run_continuation<T, R, F>(upstream: Future<T>, downstream: Promise<R>, continuation: F)
where
    T: Send + 'static,
    R: Send + 'static,
    F: FnOnce(Future<T>) -> R,
{
    if downstream.is_canceled() {
        tracing::debug!(target: targets::FUTURE, "downstream canceled; continuation skipped");
        downstream.report_finished();
        return;
    }
    match catch_unwind(AssertUnwindSafe(move || continuation(upstream))) {
        Ok(value) => downstream.report_result(value),
        Err(payload) => downstream.report_exception(TaskError::from_panic(payload)),
    }
    downstream.report_finished();
}

impl<T: Send + 'static> Future<T> {
    /// Run `continuation` once this future has finished and return a future
    /// for its return value.
    ///
    /// Continuations registered before completion run on the thread that
    /// finishes this future, in registration order. Continuations registered
    /// after completion are scheduled on this future's executor, still after
    /// every earlier registrant. A panic inside `continuation` is captured as
    /// [`TaskError::Panicked`] on the returned future.
    ///
    /// # Example
    ///
    /// ```
    /// use amlm_core::Promise;
    ///
    /// let promise = Promise::<u32>::new();
    /// let doubled = promise.future().then(|f| f.get().unwrap_or(0) * 2);
    ///
    /// promise.report_started();
    /// promise.report_result(21);
    /// promise.report_finished();
    ///
    /// assert_eq!(doubled.get().unwrap(), 42);
    /// ```
    pub fn then<R, F>(&self, continuation: F) -> Future<R>
    where
        R: Send + 'static,
        F: FnOnce(Future<T>) -> R + Send + 'static,
    {
        self.chain(None, continuation)
    }

    /// Like [`then`](Self::then), but the continuation body always runs on
    /// `executor`.
    pub fn then_on<R, F>(&self, executor: SharedExecutor, continuation: F) -> Future<R>
    where
        R: Send + 'static,
        F: FnOnce(Future<T>) -> R + Send + 'static,
    {
        self.chain(Some(executor), continuation)
    }

    /// Run `f` after this future finishes, whatever the outcome.
    pub fn finally<F>(&self, f: F) -> Future<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.then(move |_| f())
    }

    fn chain<R, F>(&self, target: Option<SharedExecutor>, continuation: F) -> Future<R>
    where
        R: Send + 'static,
        F: FnOnce(Future<T>) -> R + Send + 'static,
    {
        let executor = target.clone().unwrap_or_else(|| self.executor());
        let downstream = Promise::<R>::with_executor(executor);
        downstream.report_started();
        let result = downstream.future();
        link_cancel(&result, self);

        self.on_finished(move |upstream| match target {
            Some(executor) => executor.execute(Box::new(move || {
                run_continuation(upstream, downstream, continuation)
            })),
            None => run_continuation(upstream, downstream, continuation),
        });
        result
    }
}

/// Per-tap delivery cursor.
struct TapCursor {
    next: usize,
    failed: bool,
    done: bool,
}

struct TapObserver<T: Send + 'static, F> {
    callback: F,
    downstream: Promise<T>,
    /// Held for the whole delivery so results reach `callback` in order.
    cursor: Mutex<TapCursor>,
}

impl<T, F> TapObserver<T, F>
where
    T: Clone + Send + 'static,
    F: Fn(&T) + Send + Sync + 'static,
{
    /// Deliver every result not yet seen; finish downstream once caught up
    /// with a finished upstream. Safe to call from several threads.
    fn pump(&self, upstream: &SharedState<T>) {
        let mut cursor = self.cursor.lock();
        if cursor.done {
            return;
        }
        loop {
            let snapshot = upstream.snapshot_from(cursor.next);
            let delivered = snapshot.values.len();

            for value in snapshot.values {
                cursor.next += 1;
                if cursor.failed {
                    continue;
                }
                match catch_unwind(AssertUnwindSafe(|| (self.callback)(&value))) {
                    Ok(()) => self.downstream.report_result(value),
                    Err(payload) => {
                        cursor.failed = true;
                        self.downstream
                            .report_exception(TaskError::from_panic(payload));
                    }
                }
            }

            if snapshot.finished {
                cursor.done = true;
                if let Some(error) = snapshot.error {
                    self.downstream.report_exception(error);
                } else if snapshot.canceled {
                    self.downstream.report_canceled();
                }
                self.downstream.report_finished();
                return;
            }
            if delivered == 0 {
                return;
            }
        }
    }
}

impl<T: Clone + Send + 'static> Future<T> {
    /// Invoke `callback` once per result, in report order, as results arrive.
    ///
    /// The returned future carries the same results, each one reported only
    /// after `callback` has seen it, and finishes after the last one; a
    /// `then` chained on it therefore observes every callback first. Progress
    /// is forwarded as well.
    ///
    /// # Example
    ///
    /// ```
    /// use amlm_core::Promise;
    /// use std::sync::{Arc, Mutex};
    ///
    /// let promise = Promise::<i32>::new();
    /// let seen = Arc::new(Mutex::new(Vec::new()));
    ///
    /// let s = seen.clone();
    /// let tapped = promise.future().tap(move |v| s.lock().unwrap().push(*v));
    ///
    /// promise.report_started();
    /// promise.report_result(1);
    /// promise.report_result(2);
    /// promise.report_finished();
    ///
    /// tapped.wait();
    /// assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    /// ```
    pub fn tap<F>(&self, callback: F) -> Future<T>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let downstream = Promise::<T>::with_executor(self.executor());
        downstream.report_started();
        let result = downstream.future();
        link_cancel(&result, self);

        let observer = Arc::new(TapObserver {
            callback,
            downstream,
            cursor: Mutex::new(TapCursor {
                next: 0,
                failed: false,
                done: false,
            }),
        });

        let obs = observer.clone();
        self.shared.add_listener(Arc::new(
            move |upstream: &Arc<SharedState<T>>, event: &FutureEvent| match event {
                FutureEvent::ResultsReady { .. } | FutureEvent::Finished => obs.pump(upstream),
                FutureEvent::Progress(info) => {
                    obs.downstream.report_progress_info(info.clone());
                }
                FutureEvent::Started | FutureEvent::Canceled => {}
            },
        ));

        // Replay anything reported before the listener was installed.
        if self.result_count() > 0 || self.is_finished() {
            let upstream = self.shared.clone();
            self.executor()
                .execute(Box::new(move || observer.pump(&upstream)));
        }
        result
    }
}
