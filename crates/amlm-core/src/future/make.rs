//! Futures that are born in a known state.

use crate::error::TaskError;

use super::{Future, Promise};

/// A finished future holding a single result.
pub fn make_ready_future<T: Send + 'static>(value: T) -> Future<T> {
    make_ready_future_from(std::iter::once(value))
}

/// A finished future holding every value of `values`, in order.
pub fn make_ready_future_from<T, I>(values: I) -> Future<T>
where
    T: Send + 'static,
    I: IntoIterator<Item = T>,
{
    let promise = Promise::new();
    promise.report_started();
    promise.report_results(values);
    promise.report_finished();
    promise.future()
}

/// A finished future that failed with `error`.
pub fn make_exceptional_future<T: Send + 'static>(error: TaskError) -> Future<T> {
    let promise = Promise::new();
    promise.report_started();
    promise.report_exception(error);
    promise.report_finished();
    promise.future()
}

/// A finished, canceled future with no results.
pub fn make_canceled_future<T: Send + 'static>() -> Future<T> {
    let promise = Promise::new();
    promise.report_started();
    promise.report_canceled();
    promise.report_finished();
    promise.future()
}

/// A started promise that nothing drives yet.
///
/// The caller owns the producer side and must finish it.
pub fn make_started_only_future<T: Send + 'static>() -> Promise<T> {
    let promise = Promise::new();
    promise.report_started();
    promise
}
