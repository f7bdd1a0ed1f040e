//! Future watchers: turn a future's events into signals for an observer.
//!
//! A [`FutureWatcher`] attaches to a [`Future`] and re-emits its lifecycle,
//! results and progress through [`WatcherSignals`]. Progress is coalesced
//! by a [`ProgressThrottle`] so a fast producer cannot flood a UI thread,
//! and the last update before cancel or finish is always delivered.
//!
//! With [`WatcherConfig::deliver_on`], every emission is posted to an
//! executor instead of running on the producer's thread:
//!
//! ```
//! use amlm_core::executor::EventQueue;
//! use amlm_core::watcher::{FutureWatcher, WatcherConfig};
//! use amlm_core::Promise;
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicBool, Ordering};
//!
//! let ui = EventQueue::new();
//! let mut watcher =
//!     FutureWatcher::<u32>::with_config(WatcherConfig::default().deliver_on(ui.executor()));
//!
//! let finished = Arc::new(AtomicBool::new(false));
//! let f = finished.clone();
//! watcher.signals().finished.connect(move |_| f.store(true, Ordering::SeqCst));
//!
//! let promise = Promise::new();
//! watcher.set_future(&promise.future());
//! promise.report_started();
//! promise.report_finished();
//!
//! assert!(!finished.load(Ordering::SeqCst));
//! ui.process_pending();
//! assert!(finished.load(Ordering::SeqCst));
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, MutexGuard};

use crate::executor::SharedExecutor;
use crate::future::{Future, FutureEvent, FutureState, Listener, ListenerId, SharedState};
use crate::logging::targets;
use crate::progress::{ProgressInfo, ProgressThrottle};
use crate::signal::Signal;

/// Minimum gap between two progress emissions unless configured otherwise.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(50);

/// Configuration for a [`FutureWatcher`].
#[derive(Clone)]
pub struct WatcherConfig {
    /// Minimum time between two progress emissions.
    pub progress_interval: Duration,
    /// Executor every emission is posted to; `None` emits on the producer's thread.
    pub delivery: Option<SharedExecutor>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            delivery: None,
        }
    }
}

impl WatcherConfig {
    /// A configuration with the given progress interval.
    pub fn with_interval(progress_interval: Duration) -> Self {
        Self {
            progress_interval,
            ..Self::default()
        }
    }

    /// Post every emission to `executor`.
    pub fn deliver_on(mut self, executor: SharedExecutor) -> Self {
        self.delivery = Some(executor);
        self
    }
}

impl std::fmt::Debug for WatcherConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherConfig")
            .field("progress_interval", &self.progress_interval)
            .field("queued_delivery", &self.delivery.is_some())
            .finish()
    }
}

/// Signals emitted by a [`FutureWatcher`].
#[derive(Debug, Default)]
pub struct WatcherSignals {
    /// The future was started.
    pub started: Signal<()>,
    /// Results `begin..end` became available.
    pub result_ready_at: Signal<(usize, usize)>,
    /// The progress range changed: `(minimum, maximum)`.
    pub progress_range_changed: Signal<(i64, i64)>,
    /// The progress value changed.
    pub progress_value_changed: Signal<i64>,
    /// The progress text changed.
    pub progress_text_changed: Signal<String>,
    /// Any part of the progress changed; carries the full snapshot.
    pub progress: Signal<ProgressInfo>,
    /// The future was canceled.
    pub canceled: Signal<()>,
    /// The future finished.
    pub finished: Signal<()>,
}

#[derive(Debug)]
enum Emission {
    Started,
    ResultsReady(usize, usize),
    Range(i64, i64),
    Value(i64),
    Text(String),
    Progress(ProgressInfo),
    Canceled,
    Finished,
}

impl WatcherSignals {
    fn emit(&self, emission: Emission) {
        match emission {
            Emission::Started => self.started.emit(()),
            Emission::ResultsReady(begin, end) => self.result_ready_at.emit((begin, end)),
            Emission::Range(min, max) => self.progress_range_changed.emit((min, max)),
            Emission::Value(value) => self.progress_value_changed.emit(value),
            Emission::Text(text) => self.progress_text_changed.emit(text),
            Emission::Progress(info) => self.progress.emit(info),
            Emission::Canceled => self.canceled.emit(()),
            Emission::Finished => self.finished.emit(()),
        }
    }
}

struct CoreState {
    throttle: ProgressThrottle,
    /// Last progress handed to observers, for per-component change signals.
    last: ProgressInfo,
    queue: VecDeque<Emission>,
    draining: bool,
}

impl CoreState {
    fn progress_emissions(&mut self, info: ProgressInfo) {
        if (info.minimum, info.maximum) != (self.last.minimum, self.last.maximum) {
            self.queue.push_back(Emission::Range(info.minimum, info.maximum));
        }
        if info.value != self.last.value {
            self.queue.push_back(Emission::Value(info.value));
        }
        if info.text != self.last.text {
            self.queue.push_back(Emission::Text(info.text.clone()));
        }
        self.last = info.clone();
        self.queue.push_back(Emission::Progress(info));
    }

    fn flush_progress(&mut self) {
        if let Some(info) = self.throttle.flush() {
            self.progress_emissions(info);
        }
    }

    fn on_event(&mut self, event: &FutureEvent) {
        match event {
            FutureEvent::Started => self.queue.push_back(Emission::Started),
            FutureEvent::ResultsReady { begin, end } => {
                self.queue.push_back(Emission::ResultsReady(*begin, *end))
            }
            FutureEvent::Progress(info) => {
                if let Some(info) = self.throttle.offer(info.clone(), Instant::now()) {
                    self.progress_emissions(info);
                }
            }
            FutureEvent::Canceled => {
                self.flush_progress();
                self.queue.push_back(Emission::Canceled);
            }
            FutureEvent::Finished => {
                self.flush_progress();
                self.queue.push_back(Emission::Finished);
            }
        }
    }
}

/// The part of a watcher shared with the future's listener.
struct WatcherCore {
    state: Mutex<CoreState>,
    signals: Arc<WatcherSignals>,
    delivery: Option<SharedExecutor>,
}

impl WatcherCore {
    /// Deliver queued emissions in order. Only one thread drains at a time;
    /// emissions queued meanwhile are picked up by that thread.
    fn drain<'a>(&'a self, mut state: MutexGuard<'a, CoreState>) {
        if state.draining {
            return;
        }
        state.draining = true;
        loop {
            let batch: Vec<Emission> = state.queue.drain(..).collect();
            if batch.is_empty() {
                state.draining = false;
                return;
            }
            drop(state);
            self.dispatch(batch);
            state = self.state.lock();
        }
    }

    fn dispatch(&self, batch: Vec<Emission>) {
        match &self.delivery {
            None => {
                for emission in batch {
                    self.signals.emit(emission);
                }
            }
            Some(executor) => {
                let signals = self.signals.clone();
                executor.execute(Box::new(move || {
                    for emission in batch {
                        signals.emit(emission);
                    }
                }));
            }
        }
    }
}

/// Observes one [`Future`] at a time and re-emits its events as signals.
///
/// Dropping the watcher or calling [`detach`](Self::detach) stops the
/// observation; the future itself is unaffected.
pub struct FutureWatcher<T: Send + 'static> {
    core: Arc<WatcherCore>,
    attached: Option<(Future<T>, ListenerId)>,
}

impl<T: Send + 'static> Default for FutureWatcher<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> FutureWatcher<T> {
    /// A watcher with the default configuration.
    pub fn new() -> Self {
        Self::with_config(WatcherConfig::default())
    }

    /// A watcher with an explicit configuration.
    pub fn with_config(config: WatcherConfig) -> Self {
        Self {
            core: Arc::new(WatcherCore {
                state: Mutex::new(CoreState {
                    throttle: ProgressThrottle::new(config.progress_interval),
                    last: ProgressInfo::default(),
                    queue: VecDeque::new(),
                    draining: false,
                }),
                signals: Arc::new(WatcherSignals::default()),
                delivery: config.delivery,
            }),
            attached: None,
        }
    }

    /// The signals to connect observers to.
    pub fn signals(&self) -> &WatcherSignals {
        &self.core.signals
    }

    /// Watch `future`, replacing any previously watched one.
    ///
    /// Everything that already happened to `future` is replayed first
    /// (started, ready results, current progress, canceled, finished), so a
    /// late watcher misses nothing.
    pub fn set_future(&mut self, future: &Future<T>) {
        self.detach();

        let mut state = self.core.state.lock();
        state.throttle = ProgressThrottle::new(state.throttle.interval());
        state.last = ProgressInfo::default();

        let core = Arc::downgrade(&self.core);
        let listener: Listener<T> = Arc::new(move |_: &Arc<SharedState<T>>, event: &FutureEvent| {
            if let Some(core) = core.upgrade() {
                let mut state = core.state.lock();
                state.on_event(event);
                core.drain(state);
            }
        });
        let (id, flags, ready, progress) = future.shared.add_listener_with_snapshot(listener);
        tracing::debug!(target: targets::WATCHER, ?flags, ready, "watching future");

        if flags.contains(FutureState::STARTED) {
            state.queue.push_back(Emission::Started);
        }
        if ready > 0 {
            state.queue.push_back(Emission::ResultsReady(0, ready));
        }
        if progress != ProgressInfo::default() {
            state.on_event(&FutureEvent::Progress(progress));
        }
        if flags.contains(FutureState::CANCELED) {
            state.on_event(&FutureEvent::Canceled);
        }
        if flags.contains(FutureState::FINISHED) {
            state.on_event(&FutureEvent::Finished);
        }
        self.attached = Some((future.clone(), id));
        self.core.drain(state);
    }

    /// The future being watched.
    pub fn future(&self) -> Option<&Future<T>> {
        self.attached.as_ref().map(|(future, _)| future)
    }

    /// Stop watching. Pending throttled progress is discarded.
    pub fn detach(&mut self) {
        if let Some((future, id)) = self.attached.take() {
            future.unsubscribe(id);
        }
    }

    /// Emit any progress update the throttle is holding back.
    pub fn flush(&self) {
        let mut state = self.core.state.lock();
        state.flush_progress();
        self.core.drain(state);
    }

    /// Cancel the watched future, if any.
    pub fn cancel(&self) {
        if let Some(future) = self.future() {
            future.cancel();
        }
    }

    /// Whether the watched future has finished. `false` when not watching.
    pub fn is_finished(&self) -> bool {
        self.future().is_some_and(Future::is_finished)
    }

    /// Whether the watched future was canceled. `false` when not watching.
    pub fn is_canceled(&self) -> bool {
        self.future().is_some_and(Future::is_canceled)
    }

    /// Last progress value handed to observers.
    pub fn progress_value(&self) -> i64 {
        self.core.state.lock().last.value
    }
}

impl<T: Send + 'static> Drop for FutureWatcher<T> {
    fn drop(&mut self) {
        self.detach();
    }
}

impl<T: Send + 'static> std::fmt::Debug for FutureWatcher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FutureWatcher")
            .field("attached", &self.attached.is_some())
            .finish()
    }
}

static_assertions::assert_impl_all!(FutureWatcher<u32>: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Promise;
    use crate::executor::EventQueue;

    fn record<A: Clone + Send + 'static>(signal: &Signal<A>) -> Arc<Mutex<Vec<A>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let l = log.clone();
        signal.connect(move |args: &A| l.lock().push(args.clone()));
        log
    }

    #[test]
    fn test_lifecycle_signals_in_order() {
        let mut watcher = FutureWatcher::<i32>::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for (signal, name) in [
            (&watcher.signals().started, "started"),
            (&watcher.signals().canceled, "canceled"),
            (&watcher.signals().finished, "finished"),
        ] {
            let o = order.clone();
            signal.connect(move |_| o.lock().push(name));
        }
        let ready = record(&watcher.signals().result_ready_at);

        let promise = Promise::new();
        watcher.set_future(&promise.future());
        promise.report_started();
        promise.report_result(1);
        promise.report_result(2);
        promise.report_canceled();
        promise.report_finished();

        assert_eq!(*order.lock(), vec!["started", "canceled", "finished"]);
        assert_eq!(*ready.lock(), vec![(0, 1), (1, 2)]);
        assert!(watcher.is_finished());
        assert!(watcher.is_canceled());
    }

    #[test]
    fn test_last_progress_delivered_before_finished() {
        let mut watcher =
            FutureWatcher::<()>::with_config(WatcherConfig::with_interval(Duration::from_secs(60)));
        let values = record(&watcher.signals().progress_value_changed);
        let finished = record(&watcher.signals().finished);

        let promise = Promise::new();
        watcher.set_future(&promise.future());
        promise.report_started();
        promise.report_progress_range(0, 5);
        for v in 1..=5 {
            promise.report_progress_value(v);
        }
        assert!(finished.lock().is_empty());
        promise.report_finished();

        assert_eq!(values.lock().last(), Some(&5));
        assert_eq!(finished.lock().len(), 1);
        assert_eq!(watcher.progress_value(), 5);
    }

    #[test]
    fn test_component_signals_only_for_changes() {
        let config = WatcherConfig::with_interval(Duration::ZERO);
        let mut watcher = FutureWatcher::<()>::with_config(config);
        let ranges = record(&watcher.signals().progress_range_changed);
        let texts = record(&watcher.signals().progress_text_changed);
        let all = record(&watcher.signals().progress);

        let promise = Promise::new();
        watcher.set_future(&promise.future());
        promise.report_progress_range(0, 10);
        promise.report_progress_text("Scanning");
        promise.report_progress_value(3);
        promise.report_finished();

        assert_eq!(*ranges.lock(), vec![(0, 10)]);
        assert_eq!(*texts.lock(), vec!["Scanning".to_string()]);
        assert_eq!(all.lock().len(), 3);
    }

    #[test]
    fn test_flush_emits_held_back_progress() {
        let mut watcher =
            FutureWatcher::<()>::with_config(WatcherConfig::with_interval(Duration::from_secs(60)));
        let values = record(&watcher.signals().progress_value_changed);

        let promise = Promise::new();
        watcher.set_future(&promise.future());
        promise.report_progress_range(0, 10);
        promise.report_progress_value(4);
        promise.report_progress_value(7);
        assert!(values.lock().is_empty());

        watcher.flush();
        assert_eq!(*values.lock(), vec![7]);
        promise.report_finished();
    }

    #[test]
    fn test_late_watcher_replays_state() {
        let promise = Promise::<u8>::new();
        promise.report_started();
        promise.report_result(9);
        promise.report_progress_range(0, 1);
        promise.report_progress_value(1);
        promise.report_finished();

        let mut watcher = FutureWatcher::new();
        let ready = record(&watcher.signals().result_ready_at);
        let values = record(&watcher.signals().progress_value_changed);
        let finished = record(&watcher.signals().finished);
        watcher.set_future(&promise.future());

        assert_eq!(*ready.lock(), vec![(0, 1)]);
        assert_eq!(*values.lock(), vec![1]);
        assert_eq!(finished.lock().len(), 1);
    }

    #[test]
    fn test_queued_delivery() {
        let ui = EventQueue::new();
        let mut watcher =
            FutureWatcher::<u8>::with_config(WatcherConfig::default().deliver_on(ui.executor()));
        let started = record(&watcher.signals().started);

        let promise = Promise::new();
        watcher.set_future(&promise.future());
        promise.report_started();
        assert!(started.lock().is_empty());
        assert!(ui.process_pending() > 0);
        assert_eq!(started.lock().len(), 1);
        promise.report_finished();
    }

    #[test]
    fn test_detach_stops_delivery() {
        let mut watcher = FutureWatcher::<u8>::new();
        let finished = record(&watcher.signals().finished);

        let promise = Promise::new();
        watcher.set_future(&promise.future());
        watcher.detach();
        assert!(watcher.future().is_none());
        promise.report_finished();
        assert!(finished.lock().is_empty());
    }
}
