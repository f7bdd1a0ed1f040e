//! Executors: where continuation and task bodies actually run.
//!
//! Every place in the engine that schedules work takes an explicit
//! [`SharedExecutor`]. The available executors are:
//!
//! - [`ThreadPool`](crate::ThreadPool): a rayon work-stealing pool.
//! - [`InlineExecutor`]: runs the job on the calling thread.
//! - [`EventQueue`]: a FIFO drained by whichever thread owns the queue,
//!   typically the UI thread.
//! - `TokioExecutor` (feature `tokio`): blocking jobs on a tokio runtime.
//!
//! # Example
//!
//! ```
//! use amlm_core::executor::{EventQueue, Executor};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! let queue = EventQueue::new();
//! let executor = queue.executor();
//! let hits = Arc::new(AtomicUsize::new(0));
//!
//! let h = hits.clone();
//! executor.execute(Box::new(move || {
//!     h.fetch_add(1, Ordering::SeqCst);
//! }));
//!
//! // Nothing runs until the owning thread drains the queue.
//! assert_eq!(hits.load(Ordering::SeqCst), 0);
//! assert_eq!(queue.process_pending(), 1);
//! assert_eq!(hits.load(Ordering::SeqCst), 1);
//! ```

use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, unbounded};

use crate::logging::targets;
use crate::threadpool::ThreadPool;

/// A boxed unit of work.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Something that can run jobs.
pub trait Executor: Send + Sync {
    /// Run `job` at some point, possibly on another thread.
    fn execute(&self, job: Job);
}

/// A reference-counted executor handle.
pub type SharedExecutor = Arc<dyn Executor>;

/// The executor used when none is given explicitly: the global thread pool.
pub fn default_executor() -> SharedExecutor {
    static DEFAULT: OnceLock<SharedExecutor> = OnceLock::new();
    DEFAULT
        .get_or_init(|| Arc::new(GlobalPoolExecutor) as SharedExecutor)
        .clone()
}

/// Forwards to [`ThreadPool::global`], resolved lazily at first use.
struct GlobalPoolExecutor;

impl Executor for GlobalPoolExecutor {
    fn execute(&self, job: Job) {
        ThreadPool::global().execute(job);
    }
}

/// Runs every job immediately on the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineExecutor;

impl InlineExecutor {
    /// Create a shared inline executor.
    pub fn shared() -> SharedExecutor {
        Arc::new(Self)
    }
}

impl Executor for InlineExecutor {
    fn execute(&self, job: Job) {
        job();
    }
}

/// A multi-producer queue of jobs drained by a single owning thread.
///
/// Posting from any thread is cheap. The owning thread calls
/// [`process_pending`](Self::process_pending) from its loop, or blocks in
/// [`process_until`](Self::process_until).
pub struct EventQueue {
    sender: Sender<Job>,
    receiver: Receiver<Job>,
}

impl EventQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    /// A handle that posts jobs into this queue.
    pub fn executor(&self) -> SharedExecutor {
        Arc::new(QueueExecutor {
            sender: self.sender.clone(),
        })
    }

    /// Number of jobs waiting.
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    /// Run all jobs queued so far, including jobs they post. Returns the count.
    pub fn process_pending(&self) -> usize {
        let mut count = 0;
        loop {
            match self.receiver.try_recv() {
                Ok(job) => {
                    job();
                    count += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return count,
            }
        }
    }

    /// Block running jobs until `done` returns true or `timeout` elapses.
    ///
    /// Returns `true` if `done` was satisfied.
    pub fn process_until(&self, timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.process_pending();
            if done() {
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            match self.receiver.recv_timeout(remaining) {
                Ok(job) => job(),
                Err(RecvTimeoutError::Timeout) => return done(),
                Err(RecvTimeoutError::Disconnected) => return done(),
            }
        }
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventQueue")
            .field("pending", &self.pending())
            .finish()
    }
}

struct QueueExecutor {
    sender: Sender<Job>,
}

impl Executor for QueueExecutor {
    fn execute(&self, job: Job) {
        if self.sender.send(job).is_err() {
            tracing::warn!(target: targets::THREADPOOL, "event queue dropped, job discarded");
        }
    }
}

/// Runs jobs with `spawn_blocking` on a tokio runtime.
#[cfg(feature = "tokio")]
#[derive(Debug, Clone)]
pub struct TokioExecutor {
    handle: tokio::runtime::Handle,
}

#[cfg(feature = "tokio")]
impl TokioExecutor {
    /// Wrap a runtime handle.
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Wrap the runtime of the current context, if any.
    pub fn try_current() -> Option<Self> {
        tokio::runtime::Handle::try_current().ok().map(Self::new)
    }
}

#[cfg(feature = "tokio")]
impl Executor for TokioExecutor {
    fn execute(&self, job: Job) {
        drop(self.handle.spawn_blocking(job));
    }
}

static_assertions::assert_impl_all!(EventQueue: Send, Sync);
static_assertions::assert_impl_all!(InlineExecutor: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_inline_executor_runs_immediately() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        InlineExecutor.execute(Box::new(move || {
            h.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_event_queue_is_fifo() {
        let queue = EventQueue::new();
        let executor = queue.executor();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..5 {
            let order = order.clone();
            executor.execute(Box::new(move || order.lock().push(i)));
        }

        assert_eq!(queue.pending(), 5);
        assert_eq!(queue.process_pending(), 5);
        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_event_queue_cross_thread_post() {
        let queue = EventQueue::new();
        let executor = queue.executor();
        let hits = Arc::new(AtomicUsize::new(0));

        let h = hits.clone();
        let poster = std::thread::spawn(move || {
            for _ in 0..10 {
                let h = h.clone();
                executor.execute(Box::new(move || {
                    h.fetch_add(1, Ordering::SeqCst);
                }));
            }
        });
        poster.join().unwrap();

        let done = queue.process_until(Duration::from_secs(1), || {
            hits.load(Ordering::SeqCst) == 10
        });
        assert!(done);
    }

    #[test]
    fn test_process_until_times_out() {
        let queue = EventQueue::new();
        assert!(!queue.process_until(Duration::from_millis(20), || false));
    }

    #[test]
    fn test_default_executor_runs_job() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        default_executor().execute(Box::new(move || {
            tx.send(7).unwrap();
        }));
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 7);
    }
}
