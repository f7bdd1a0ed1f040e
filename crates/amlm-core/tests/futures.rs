//! Integration tests for the promise/future engine and its continuations.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use amlm_core::executor::EventQueue;
use amlm_core::{
    FutureError, FutureEvent, InlineExecutor, Promise, SharedExecutor, TaskError, ThreadPool,
    ThreadPoolConfig,
};
use parking_lot::Mutex;

fn pool() -> SharedExecutor {
    Arc::new(ThreadPool::new(ThreadPoolConfig::with_threads(2)).expect("pool"))
}

#[test]
fn test_cancel_before_results_then_finish() {
    let promise = Promise::<i32>::with_executor(InlineExecutor::shared());
    let future = promise.future();
    promise.report_started();

    future.cancel();
    assert!(promise.is_canceled());
    promise.report_finished();

    assert!(future.is_canceled());
    assert!(future.is_finished());
    assert_eq!(future.get(), Err(FutureError::NoResultAvailable));
}

#[test]
#[cfg_attr(debug_assertions, should_panic(expected = "future usage error"))]
fn test_result_after_finish_is_ignored() {
    let promise = Promise::<i32>::with_executor(InlineExecutor::shared());
    let future = promise.future();
    promise.report_started();
    promise.report_result(1);
    promise.report_finished();

    promise.report_result(2);

    assert_eq!(future.results().unwrap(), vec![1]);
    assert!(future.is_finished());
    assert!(!future.is_running());
}

#[test]
#[cfg_attr(debug_assertions, should_panic(expected = "future usage error"))]
fn test_second_finish_is_ignored() {
    let promise = Promise::<i32>::with_executor(InlineExecutor::shared());
    let future = promise.future();
    let runs = Arc::new(Mutex::new(0));
    let r = runs.clone();
    future.on_finished(move |_| *r.lock() += 1);

    promise.report_finished();
    promise.report_finished();

    assert_eq!(*runs.lock(), 1);
}

#[test]
fn test_continuations_run_in_registration_order() {
    let promise = Promise::<u8>::with_executor(pool());
    let future = promise.future();
    let log = Arc::new(Mutex::new(Vec::new()));

    let outputs: Vec<_> = (1..=3)
        .map(|n| {
            let log = log.clone();
            future.then(move |_| log.lock().push(n))
        })
        .collect();

    let producer = thread::spawn(move || {
        promise.report_started();
        promise.report_result(0);
        promise.report_finished();
    });
    producer.join().unwrap();

    for out in &outputs {
        out.wait();
    }
    assert_eq!(*log.lock(), vec![1, 2, 3]);
}

#[test]
fn test_late_continuations_are_scheduled_in_order() {
    let queue = EventQueue::new();
    let promise = Promise::<u8>::with_executor(queue.executor());
    let future = promise.future();
    promise.report_result(4);
    promise.report_finished();

    let log = Arc::new(Mutex::new(Vec::new()));
    let l1 = log.clone();
    let first = future.then(move |f| l1.lock().push(("first", f.get().unwrap_or(0))));
    let l2 = log.clone();
    let second = future.then(move |_| l2.lock().push(("second", 0)));

    // Scheduled on the executor, never inline.
    assert!(log.lock().is_empty());
    queue.process_until(Duration::from_secs(5), || second.is_finished());

    assert!(first.is_finished());
    assert_eq!(*log.lock(), vec![("first", 4), ("second", 0)]);
}

#[test]
fn test_tap_runs_before_then() {
    let promise = Promise::<i32>::with_executor(pool());
    let seen = Arc::new(Mutex::new(Vec::new()));

    let s = seen.clone();
    let observed_by_then = {
        let seen = seen.clone();
        promise
            .future()
            .tap(move |v| s.lock().push(*v))
            .then(move |_| seen.lock().clone())
    };

    let producer = thread::spawn(move || {
        promise.report_started();
        for v in 1..=5 {
            promise.report_result(v);
        }
        promise.report_finished();
    });
    producer.join().unwrap();

    assert_eq!(observed_by_then.get().unwrap(), vec![1, 2, 3, 4, 5]);
}

#[test]
fn test_tap_attached_after_results_replays_them() {
    let promise = Promise::<i32>::with_executor(InlineExecutor::shared());
    promise.report_started();
    promise.report_result(10);
    promise.report_result(20);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    let tapped = promise.future().tap(move |v| s.lock().push(*v));
    promise.report_result(30);
    promise.report_finished();

    assert_eq!(tapped.results().unwrap(), vec![10, 20, 30]);
    assert_eq!(*seen.lock(), vec![10, 20, 30]);
}

#[test]
fn test_tap_forwards_errors_and_progress() {
    let promise = Promise::<i32>::with_executor(InlineExecutor::shared());
    let tapped = promise.future().tap(|_| {});
    promise.report_started();
    promise.report_progress_range(0, 10);
    promise.report_progress_value(6);
    promise.report_exception(TaskError::failed("unreadable"));
    promise.report_finished();

    assert_eq!(tapped.progress_value(), 6);
    assert_eq!(
        tapped.get(),
        Err(FutureError::Task(TaskError::Failed("unreadable".into())))
    );
}

#[test]
fn test_continuation_panic_surfaces_on_get() {
    let promise = Promise::<i32>::with_executor(InlineExecutor::shared());
    let chained = promise.future().then(|_| -> i32 { panic!("tag parse failed") });
    promise.report_finished();

    assert_eq!(
        chained.get(),
        Err(FutureError::Task(TaskError::Panicked("tag parse failed".into())))
    );
    assert!(chained.is_finished());
}

#[test]
fn test_cancel_propagates_upstream() {
    let promise = Promise::<i32>::with_executor(InlineExecutor::shared());
    let chained = promise.future().tap(|_| {}).then(|f| f.result_count());

    chained.cancel();
    assert!(promise.is_canceled());

    promise.report_finished();
    assert!(chained.is_finished());
    assert!(chained.is_canceled());
}

#[test]
fn test_canceled_downstream_skips_continuation() {
    let promise = Promise::<i32>::with_executor(InlineExecutor::shared());
    let ran = Arc::new(Mutex::new(false));
    let r = ran.clone();
    let chained = promise.future().then(move |_| *r.lock() = true);

    chained.cancel();
    promise.report_finished();

    assert!(!*ran.lock());
    assert_eq!(chained.get(), Err(FutureError::NoResultAvailable));
}

#[test]
fn test_then_on_runs_on_given_executor() {
    let queue = EventQueue::new();
    let promise = Promise::<i32>::with_executor(InlineExecutor::shared());
    let chained = promise
        .future()
        .then_on(queue.executor(), |f| f.get().unwrap_or(0) + 1);

    promise.report_result(41);
    promise.report_finished();
    assert!(!chained.is_finished());

    queue.process_pending();
    assert_eq!(chained.get(), Ok(42));
}

#[test]
fn test_finally_runs_on_failure() {
    let promise = Promise::<i32>::with_executor(InlineExecutor::shared());
    let cleaned = Arc::new(Mutex::new(false));
    let c = cleaned.clone();
    let done = promise.future().finally(move || *c.lock() = true);

    promise.report_exception(TaskError::Canceled);
    promise.report_finished();

    done.wait();
    assert!(*cleaned.lock());
}

#[test]
fn test_dropped_promise_is_broken() {
    let promise = Promise::<i32>::with_executor(InlineExecutor::shared());
    let future = promise.future();
    promise.report_started();
    drop(promise);

    assert!(future.is_finished());
    assert!(future.is_canceled());
    assert_eq!(
        future.get(),
        Err(FutureError::Task(TaskError::BrokenPromise))
    );
}

#[test]
fn test_out_of_order_results_become_visible_when_contiguous() {
    let promise = Promise::<&str>::with_executor(InlineExecutor::shared());
    let future = promise.future();

    promise.report_result_at(1, "b");
    assert_eq!(future.result_count(), 0);
    assert!(!future.is_result_ready_at(1));

    promise.report_result_at(0, "a");
    assert_eq!(future.result_count(), 2);
    promise.report_finished();
    assert_eq!(future.results().unwrap(), vec!["a", "b"]);
}

#[test]
fn test_blocking_result_wakes_on_report() {
    let promise = Promise::<u64>::with_executor(InlineExecutor::shared());
    let future = promise.future();

    let reader = thread::spawn(move || future.result(0));
    thread::sleep(Duration::from_millis(20));
    promise.report_result(99);

    assert_eq!(reader.join().unwrap(), Ok(99));
    promise.report_finished();
}

#[test]
fn test_wait_timeout() {
    let promise = Promise::<u8>::with_executor(InlineExecutor::shared());
    let future = promise.future();
    assert!(!future.wait_timeout(Duration::from_millis(10)));
    promise.report_finished();
    assert!(future.wait_timeout(Duration::from_millis(10)));
}

#[test]
fn test_subscribe_sees_events_in_order() {
    let promise = Promise::<u8>::with_executor(InlineExecutor::shared());
    let events = Arc::new(Mutex::new(Vec::new()));
    let e = events.clone();
    let id = promise
        .future()
        .subscribe(move |_, event| e.lock().push(event.clone()));

    promise.report_started();
    promise.report_result(1);
    promise.report_canceled();
    promise.report_finished();

    assert_eq!(
        *events.lock(),
        vec![
            FutureEvent::Started,
            FutureEvent::ResultsReady { begin: 0, end: 1 },
            FutureEvent::Canceled,
            FutureEvent::Finished,
        ]
    );
    assert!(promise.future().unsubscribe(id));
}
