//! Concurrency core for the AMLM media library manager.
//!
//! This crate provides the building blocks background work is expressed in:
//!
//! - **Futures**: [`Promise`]/[`Future`] pairs with streaming results,
//!   progress, cooperative cancellation and continuations (`then`, `tap`)
//! - **Task Runner**: runs cancellable, progress-reporting work and funnels
//!   its outcome, errors and panics included, into a future
//! - **Executors**: a rayon [`ThreadPool`], an inline executor and an
//!   [`EventQueue`](executor::EventQueue) drained by a UI thread
//! - **Watchers**: re-emit a future's events as throttled [`Signal`]s
//! - **Signal/Slot System**: type-safe notifications, also used by the tree model
//!
//! # Example
//!
//! ```
//! use amlm_core::{Promise, TaskError, TaskRunner};
//!
//! // Scan "directories" on the pool; every hit is streamed as a result.
//! let scan = TaskRunner::global().start(|promise: &Promise<String>| -> Result<(), TaskError> {
//!     for dir in ["Albums", "Singles"] {
//!         promise.report_result(format!("/music/{dir}"));
//!     }
//!     Ok(())
//! });
//!
//! let count = scan
//!     .tap(|dir| println!("found {dir}"))
//!     .then(|f| f.result_count());
//!
//! assert_eq!(count.get().unwrap(), 2);
//! ```

mod error;
pub mod executor;
pub mod future;
pub mod logging;
pub mod progress;
pub mod signal;
pub mod task;
pub mod threadpool;
pub mod watcher;

pub use error::{CoreError, FutureError, Result, TaskError, ThreadPoolError};
pub use executor::{Executor, InlineExecutor, SharedExecutor};
pub use future::{
    Future, FutureEvent, FutureState, ListenerId, Promise, make_canceled_future,
    make_exceptional_future, make_ready_future, make_ready_future_from, make_started_only_future,
    when_all, when_any,
};
pub use logging::PerfSpan;
pub use progress::{ProgressInfo, ProgressThrottle};
pub use signal::{ConnectionId, Signal};
pub use task::{Task, TaskId, TaskRunner};
pub use threadpool::{ThreadPool, ThreadPoolConfig};
pub use watcher::{FutureWatcher, WatcherConfig, WatcherSignals};
