//! Futures with progress, streaming results and continuations.
//!
//! A [`Promise`] is the producer side of an asynchronous computation and a
//! [`Future`] the consumer side. Unlike `std::future::Future`, these are
//! thread-blocking handles designed for worker threads and UI observers:
//!
//! - a future can carry many results, delivered as they are reported;
//! - the producer reports progress (range, value and text);
//! - cancellation is cooperative and flows from consumers back to producers;
//! - continuations ([`Future::then`], [`Future::tap`]) are chained without
//!   blocking.
//!
//! # Lifecycle
//!
//! ```text
//! NONE --report_started--> STARTED|RUNNING --report_finished--> STARTED|FINISHED
//!                                 |
//!                           cancel() / report_canceled() adds CANCELED
//! ```
//!
//! # Example
//!
//! ```
//! use amlm_core::Promise;
//!
//! let promise = Promise::<String>::new();
//! let lengths = promise
//!     .future()
//!     .then(|f| f.results().map(|r| r.iter().map(String::len).sum::<usize>()));
//!
//! promise.report_started();
//! promise.report_result("alpha".to_string());
//! promise.report_result("beta".to_string());
//! promise.report_finished();
//!
//! assert_eq!(lengths.get().unwrap().unwrap(), 9);
//! ```

mod combinators;
mod continuation;
mod handle;
mod make;
mod promise;
mod state;

pub use combinators::{when_all, when_any};
pub use handle::Future;
pub use make::{
    make_canceled_future, make_exceptional_future, make_ready_future, make_ready_future_from,
    make_started_only_future,
};
pub use promise::Promise;
pub use state::{FutureEvent, FutureState, ListenerId};

pub(crate) use state::{Listener, SharedState};

static_assertions::assert_impl_all!(Future<i32>: Send, Sync, Clone);
static_assertions::assert_impl_all!(Promise<i32>: Send, Sync);
