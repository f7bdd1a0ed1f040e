//! Shared state behind a `Promise`/`Future` pair.

use std::collections::VecDeque;
use std::fmt;
use std::ops::BitOr;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use slotmap::{SlotMap, new_key_type};

use crate::error::{FutureError, TaskError};
use crate::executor::SharedExecutor;
use crate::logging::{span_names, targets};
use crate::progress::ProgressInfo;

use super::Future;

new_key_type! {
    /// Identifies an event listener registered on a future.
    pub struct ListenerId;
}

/// Lifecycle flags of a future.
///
/// Flags combine: a canceled future may still be running, and a canceled
/// future becomes finished once the producer stops.
#[derive(Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct FutureState(u8);

impl FutureState {
    /// Nothing reported yet.
    pub const NONE: Self = Self(0);
    /// The producer reported start.
    pub const STARTED: Self = Self(0b0001);
    /// Started and not yet finished.
    pub const RUNNING: Self = Self(0b0010);
    /// Cancellation was requested or reported.
    pub const CANCELED: Self = Self(0b0100);
    /// Terminal.
    pub const FINISHED: Self = Self(0b1000);

    /// Raw bits.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Whether every flag in `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub(crate) fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub(crate) fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl BitOr for FutureState {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for FutureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = [
            (Self::STARTED, "Started"),
            (Self::RUNNING, "Running"),
            (Self::CANCELED, "Canceled"),
            (Self::FINISHED, "Finished"),
        ]
        .iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, name)| *name)
        .collect();
        if names.is_empty() {
            write!(f, "FutureState(None)")
        } else {
            write!(f, "FutureState({})", names.join(" | "))
        }
    }
}

/// Events delivered to listeners on the producer's thread.
#[derive(Debug, Clone, PartialEq)]
pub enum FutureEvent {
    /// The producer reported start.
    Started,
    /// Results `begin..end` became available, in report order.
    ResultsReady {
        /// First newly ready index.
        begin: usize,
        /// One past the last newly ready index.
        end: usize,
    },
    /// Progress changed.
    Progress(ProgressInfo),
    /// The canceled flag was set.
    Canceled,
    /// The future finished.
    Finished,
}

pub(crate) type Listener<T> = Arc<dyn Fn(&Arc<SharedState<T>>, &FutureEvent) + Send + Sync>;
pub(crate) type Continuation<T> = Box<dyn FnOnce(Future<T>) + Send>;
type CancelHook = Arc<dyn Fn() + Send + Sync>;

struct Inner<T> {
    state: FutureState,
    /// Indexed results; `None` marks a gap left by an out-of-order report.
    results: Vec<Option<T>>,
    /// Length of the contiguous prefix of available results.
    ready: usize,
    error: Option<TaskError>,
    progress: ProgressInfo,
    continuations: VecDeque<Continuation<T>>,
    draining: bool,
    listeners: SlotMap<ListenerId, Listener<T>>,
    cancel_hooks: Vec<CancelHook>,
}

impl<T> Inner<T> {
    fn listeners(&self) -> Vec<Listener<T>> {
        self.listeners.values().cloned().collect()
    }
}

/// The state shared by one promise and all of its futures.
pub struct SharedState<T> {
    inner: Mutex<Inner<T>>,
    changed: Condvar,
    executor: SharedExecutor,
}

/// A consistent view of the results from some index onwards.
pub(crate) struct ResultsSnapshot<T> {
    pub(crate) values: Vec<T>,
    pub(crate) finished: bool,
    pub(crate) canceled: bool,
    pub(crate) error: Option<TaskError>,
}

/// Report a producer-side usage error: loud in debug builds, a logged no-op otherwise.
fn usage_error(what: &str) {
    tracing::warn!(target: targets::FUTURE, "{what}; ignored");
    if cfg!(debug_assertions) {
        panic!("future usage error: {what}");
    }
}

impl<T: Send + 'static> SharedState<T> {
    pub(crate) fn new(executor: SharedExecutor) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                state: FutureState::NONE,
                results: Vec::new(),
                ready: 0,
                error: None,
                progress: ProgressInfo::default(),
                continuations: VecDeque::new(),
                draining: false,
                listeners: SlotMap::with_key(),
                cancel_hooks: Vec::new(),
            }),
            changed: Condvar::new(),
            executor,
        })
    }

    pub(crate) fn executor(&self) -> SharedExecutor {
        self.executor.clone()
    }

    fn fire(self: &Arc<Self>, listeners: Vec<Listener<T>>, event: FutureEvent) {
        for listener in listeners {
            listener(self, &event);
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub(crate) fn state(&self) -> FutureState {
        self.inner.lock().state
    }

    pub(crate) fn error(&self) -> Option<TaskError> {
        self.inner.lock().error.clone()
    }

    pub(crate) fn progress(&self) -> ProgressInfo {
        self.inner.lock().progress.clone()
    }

    pub(crate) fn ready_count(&self) -> usize {
        self.inner.lock().ready
    }

    // ------------------------------------------------------------------
    // Producer side
    // ------------------------------------------------------------------

    pub(crate) fn report_started(self: &Arc<Self>) {
        let listeners = {
            let mut inner = self.inner.lock();
            if inner.state.contains(FutureState::STARTED)
                || inner.state.contains(FutureState::FINISHED)
            {
                return;
            }
            inner.state.insert(FutureState::STARTED | FutureState::RUNNING);
            inner.listeners()
        };
        self.fire(listeners, FutureEvent::Started);
    }

    pub(crate) fn report_result(self: &Arc<Self>, index: Option<usize>, value: T) {
        let mut inner = self.inner.lock();
        if inner.state.contains(FutureState::FINISHED) {
            drop(inner);
            usage_error("report_result on a finished future");
            return;
        }

        let index = index.unwrap_or(inner.results.len());
        if index >= inner.results.len() {
            inner.results.resize_with(index + 1, || None);
        }
        if inner.results[index].is_some() {
            drop(inner);
            tracing::warn!(target: targets::FUTURE, index, "result index reported twice; keeping the first");
            return;
        }
        inner.results[index] = Some(value);

        let begin = inner.ready;
        while inner.ready < inner.results.len() && inner.results[inner.ready].is_some() {
            inner.ready += 1;
        }
        let end = inner.ready;
        if end == begin {
            return;
        }

        self.changed.notify_all();
        let listeners = inner.listeners();
        drop(inner);
        self.fire(listeners, FutureEvent::ResultsReady { begin, end });
    }

    pub(crate) fn report_canceled(self: &Arc<Self>) {
        let listeners = {
            let mut inner = self.inner.lock();
            if inner.state.contains(FutureState::CANCELED) {
                return;
            }
            inner.state.insert(FutureState::CANCELED);
            inner.listeners()
        };
        self.fire(listeners, FutureEvent::Canceled);
    }

    pub(crate) fn report_exception(self: &Arc<Self>, error: TaskError) {
        let mut inner = self.inner.lock();
        if inner.state.contains(FutureState::FINISHED) {
            drop(inner);
            usage_error("report_exception on a finished future");
            return;
        }
        tracing::debug!(target: targets::FUTURE, %error, "exception captured");
        if inner.error.is_none() {
            inner.error = Some(error);
        }
        if inner.state.contains(FutureState::CANCELED) {
            return;
        }
        inner.state.insert(FutureState::CANCELED);
        let listeners = inner.listeners();
        drop(inner);
        self.fire(listeners, FutureEvent::Canceled);
    }

    pub(crate) fn report_finished(self: &Arc<Self>) {
        let mut inner = self.inner.lock();
        if inner.state.contains(FutureState::FINISHED) {
            drop(inner);
            usage_error("report_finished called twice");
            return;
        }
        inner.state.insert(FutureState::FINISHED);
        inner.state.remove(FutureState::RUNNING);
        self.changed.notify_all();

        let listeners = inner.listeners();
        let drain = !inner.draining && !inner.continuations.is_empty();
        if drain {
            inner.draining = true;
        }
        let state = inner.state;
        drop(inner);

        tracing::trace!(target: targets::FUTURE, ?state, "finished");
        self.fire(listeners, FutureEvent::Finished);
        if drain {
            self.drain_continuations();
        }
    }

    /// Apply a progress mutation; listeners hear about it only if it changed something.
    pub(crate) fn update_progress(
        self: &Arc<Self>,
        update: impl FnOnce(&mut ProgressInfo) -> bool,
    ) {
        let mut inner = self.inner.lock();
        if inner.state.contains(FutureState::FINISHED) {
            tracing::trace!(target: targets::FUTURE, "progress after finish ignored");
            return;
        }
        if !update(&mut inner.progress) {
            return;
        }
        let info = inner.progress.clone();
        let listeners = inner.listeners();
        drop(inner);
        self.fire(listeners, FutureEvent::Progress(info));
    }

    // ------------------------------------------------------------------
    // Consumer side
    // ------------------------------------------------------------------

    /// Consumer cancellation request: sets the flag and runs cancel hooks.
    pub(crate) fn cancel(self: &Arc<Self>) {
        let (listeners, hooks) = {
            let mut inner = self.inner.lock();
            if inner.state.contains(FutureState::CANCELED)
                || inner.state.contains(FutureState::FINISHED)
            {
                return;
            }
            inner.state.insert(FutureState::CANCELED);
            (inner.listeners(), inner.cancel_hooks.clone())
        };
        tracing::debug!(target: targets::FUTURE, "cancel requested");
        self.fire(listeners, FutureEvent::Canceled);
        for hook in hooks {
            hook();
        }
    }

    pub(crate) fn add_cancel_hook(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.inner.lock().cancel_hooks.push(Arc::new(hook));
    }

    pub(crate) fn add_listener(&self, listener: Listener<T>) -> ListenerId {
        self.inner.lock().listeners.insert(listener)
    }

    pub(crate) fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.lock().listeners.remove(id).is_some()
    }

    /// Register a listener and capture the state it starts from, atomically.
    pub(crate) fn add_listener_with_snapshot(
        &self,
        listener: Listener<T>,
    ) -> (ListenerId, FutureState, usize, ProgressInfo) {
        let mut inner = self.inner.lock();
        let id = inner.listeners.insert(listener);
        (id, inner.state, inner.ready, inner.progress.clone())
    }

    /// Queue a continuation. It runs when the future finishes, or is
    /// scheduled on the executor if the future already has.
    pub(crate) fn enqueue_continuation(self: &Arc<Self>, continuation: Continuation<T>) {
        let mut inner = self.inner.lock();
        inner.continuations.push_back(continuation);
        if inner.state.contains(FutureState::FINISHED) && !inner.draining {
            inner.draining = true;
            drop(inner);
            let this = self.clone();
            self.executor
                .execute(Box::new(move || this.drain_continuations()));
        }
    }

    fn drain_continuations(self: &Arc<Self>) {
        let _span = tracing::trace_span!(target: targets::FUTURE, span_names::CONTINUATIONS).entered();
        loop {
            let continuation = {
                let mut inner = self.inner.lock();
                match inner.continuations.pop_front() {
                    Some(continuation) => continuation,
                    None => {
                        inner.draining = false;
                        return;
                    }
                }
            };
            let future = Future::from_shared(self.clone());
            if catch_unwind(AssertUnwindSafe(move || continuation(future))).is_err() {
                tracing::error!(target: targets::FUTURE, "continuation panicked");
            }
        }
    }

    pub(crate) fn wait(&self) {
        let mut inner = self.inner.lock();
        while !inner.state.contains(FutureState::FINISHED) {
            self.changed.wait(&mut inner);
        }
    }

    pub(crate) fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        while !inner.state.contains(FutureState::FINISHED) {
            if self.changed.wait_until(&mut inner, deadline).timed_out() {
                return inner.state.contains(FutureState::FINISHED);
            }
        }
        true
    }

    pub(crate) fn snapshot_from(&self, from: usize) -> ResultsSnapshot<T>
    where
        T: Clone,
    {
        let inner = self.inner.lock();
        let end = inner.ready;
        let values = if from < end {
            inner.results[from..end].iter().flatten().cloned().collect()
        } else {
            Vec::new()
        };
        ResultsSnapshot {
            values,
            finished: inner.state.contains(FutureState::FINISHED),
            canceled: inner.state.contains(FutureState::CANCELED),
            error: inner.error.clone(),
        }
    }

    /// Block until result `index` is available or the future finishes.
    pub(crate) fn result(&self, index: usize) -> Result<T, FutureError>
    where
        T: Clone,
    {
        let mut inner = self.inner.lock();
        while index >= inner.ready && !inner.state.contains(FutureState::FINISHED) {
            self.changed.wait(&mut inner);
        }
        if let Some(error) = &inner.error {
            return Err(FutureError::Task(error.clone()));
        }
        inner
            .results
            .get(index)
            .and_then(Option::as_ref)
            .cloned()
            .ok_or(FutureError::NoResultAvailable)
    }

    /// Block until finished, then return every available result in index order.
    pub(crate) fn results(&self) -> Result<Vec<T>, FutureError>
    where
        T: Clone,
    {
        self.wait();
        let inner = self.inner.lock();
        if let Some(error) = &inner.error {
            return Err(FutureError::Task(error.clone()));
        }
        Ok(inner.results.iter().flatten().cloned().collect())
    }
}

impl<T> fmt::Debug for SharedState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("SharedState")
            .field("state", &inner.state)
            .field("ready", &inner.ready)
            .field("error", &inner.error)
            .field("continuations", &inner.continuations.len())
            .field("listeners", &inner.listeners.len())
            .finish()
    }
}
