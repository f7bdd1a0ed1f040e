//! Error types for the AMLM concurrency core.

use std::any::Any;
use std::fmt;

/// The main error type for core setup operations.
#[derive(Debug)]
pub enum CoreError {
    /// Thread pool related error.
    ThreadPool(ThreadPoolError),
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ThreadPool(err) => write!(f, "Thread pool error: {err}"),
        }
    }
}

impl std::error::Error for CoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ThreadPool(err) => Some(err),
        }
    }
}

impl From<ThreadPoolError> for CoreError {
    fn from(err: ThreadPoolError) -> Self {
        Self::ThreadPool(err)
    }
}

/// Thread pool specific errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadPoolError {
    /// The global pool was already initialized.
    AlreadyInitialized,
    /// The underlying pool could not be built.
    CreationFailed(String),
}

impl fmt::Display for ThreadPoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyInitialized => write!(f, "Global thread pool is already initialized"),
            Self::CreationFailed(msg) => write!(f, "Failed to create thread pool: {msg}"),
        }
    }
}

impl std::error::Error for ThreadPoolError {}

/// An error captured from a unit of work and carried by a future.
///
/// Task errors are `Clone` so that every consumer of a failed future can be
/// handed its own copy from a blocking accessor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// The task body panicked. Holds the panic message when it was a string.
    Panicked(String),
    /// The task body returned an error.
    Failed(String),
    /// The work was canceled and gave up.
    Canceled,
    /// The promise was dropped before it was finished.
    BrokenPromise,
}

impl TaskError {
    /// Create a failure from any displayable error.
    pub fn failed(err: impl fmt::Display) -> Self {
        Self::Failed(err.to_string())
    }

    /// Convert a payload caught by `catch_unwind` into a task error.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::Panicked(message)
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Panicked(msg) => write!(f, "Task panicked: {msg}"),
            Self::Failed(msg) => write!(f, "Task failed: {msg}"),
            Self::Canceled => write!(f, "Task was canceled"),
            Self::BrokenPromise => write!(f, "Promise dropped before it was finished"),
        }
    }
}

impl std::error::Error for TaskError {}

/// Errors returned by the blocking accessors of a [`Future`](crate::Future).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FutureError {
    /// The future finished without the requested result.
    NoResultAvailable,
    /// The producer captured an error.
    Task(TaskError),
}

impl fmt::Display for FutureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoResultAvailable => write!(f, "No result available"),
            Self::Task(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for FutureError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Task(err) => Some(err),
            Self::NoResultAvailable => None,
        }
    }
}

impl From<TaskError> for FutureError {
    fn from(err: TaskError) -> Self {
        Self::Task(err)
    }
}

/// A specialized Result type for core setup operations.
pub type Result<T> = std::result::Result<T, CoreError>;
