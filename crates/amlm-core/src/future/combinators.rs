//! Joining several futures into one.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{FutureError, TaskError};

use super::{Future, Promise};

struct JoinState<T> {
    slots: Vec<Option<T>>,
    remaining: usize,
    error: Option<TaskError>,
}

/// A future that finishes once every input has finished.
///
/// Its single result holds the first result of each input, in input order.
/// If any input failed, was canceled or finished without a result, the
/// combined future fails instead. Canceling the combined future cancels
/// every input.
///
/// An empty input yields an empty vector immediately.
pub fn when_all<T>(futures: Vec<Future<T>>) -> Future<Vec<T>>
where
    T: Clone + Send + 'static,
{
    let promise = Arc::new(Promise::<Vec<T>>::new());
    promise.report_started();
    let combined = promise.future();

    if futures.is_empty() {
        promise.report_result(Vec::new());
        promise.report_finished();
        return combined;
    }

    for input in &futures {
        super::continuation::link_cancel(&combined, input);
    }

    let join = Arc::new(Mutex::new(JoinState {
        slots: (0..futures.len()).map(|_| None).collect(),
        remaining: futures.len(),
        error: None,
    }));

    for (index, input) in futures.into_iter().enumerate() {
        let join = join.clone();
        let promise = promise.clone();
        input.on_finished(move |finished| {
            let outcome = match finished.get() {
                Ok(value) => Ok(value),
                Err(FutureError::Task(error)) => Err(error),
                Err(FutureError::NoResultAvailable) => Err(TaskError::Canceled),
            };

            let done = {
                let mut join = join.lock();
                match outcome {
                    Ok(value) => join.slots[index] = Some(value),
                    Err(error) => {
                        join.error.get_or_insert(error);
                    }
                }
                join.remaining -= 1;
                if join.remaining > 0 {
                    None
                } else {
                    Some(match join.error.take() {
                        Some(error) => Err(error),
                        None => Ok(join.slots.iter_mut().filter_map(Option::take).collect()),
                    })
                }
            };

            match done {
                Some(Ok(values)) => {
                    promise.report_result(values);
                    promise.report_finished();
                }
                Some(Err(error)) => {
                    promise.report_exception(error);
                    promise.report_finished();
                }
                None => {}
            }
        });
    }
    combined
}

/// A future whose result is the index of the first input to finish.
///
/// An empty input yields a canceled future.
pub fn when_any<T>(futures: Vec<Future<T>>) -> Future<usize>
where
    T: Send + 'static,
{
    let promise = Promise::<usize>::new();
    promise.report_started();
    let combined = promise.future();

    if futures.is_empty() {
        promise.report_canceled();
        promise.report_finished();
        return combined;
    }

    for input in &futures {
        super::continuation::link_cancel(&combined, input);
    }

    let slot = Arc::new(Mutex::new(Some(promise)));
    for (index, input) in futures.into_iter().enumerate() {
        let slot = slot.clone();
        input.on_finished(move |_| {
            if let Some(promise) = slot.lock().take() {
                promise.report_result(index);
                promise.report_finished();
            }
        });
    }
    combined
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::future::{make_exceptional_future, make_ready_future};

    #[test]
    fn test_when_all_collects_in_input_order() {
        let a = Promise::<i32>::new();
        let b = Promise::<i32>::new();
        a.report_started();
        b.report_started();

        let all = when_all(vec![a.future(), b.future()]);
        b.report_result(2);
        b.report_finished();
        assert!(!all.is_finished());

        a.report_result(1);
        a.report_finished();
        assert_eq!(all.get(), Ok(vec![1, 2]));
    }

    #[test]
    fn test_when_all_fails_if_any_input_fails() {
        let all = when_all(vec![
            make_ready_future(1),
            make_exceptional_future(TaskError::failed("boom")),
        ]);
        assert_eq!(
            all.get(),
            Err(FutureError::Task(TaskError::Failed("boom".into())))
        );
    }

    #[test]
    fn test_when_all_empty() {
        let all = when_all(Vec::<Future<u8>>::new());
        assert_eq!(all.get(), Ok(Vec::new()));
    }

    #[test]
    fn test_when_all_cancel_reaches_inputs() {
        let a = Promise::<i32>::new();
        a.report_started();
        let all = when_all(vec![a.future()]);
        all.cancel();
        assert!(a.is_canceled());
        a.report_finished();
    }

    #[test]
    fn test_when_any_reports_first_finisher() {
        let a = Promise::<i32>::new();
        let b = Promise::<i32>::new();
        a.report_started();
        b.report_started();

        let any = when_any(vec![a.future(), b.future()]);
        b.report_finished();
        a.report_finished();
        assert_eq!(any.get(), Ok(1));
    }

    #[test]
    fn test_when_any_empty_is_canceled() {
        let any = when_any(Vec::<Future<u8>>::new());
        assert!(any.is_canceled());
        assert!(any.is_finished());
    }
}
