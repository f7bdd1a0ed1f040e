//! Logging facilities for the AMLM core.
//!
//! The core uses the `tracing` crate for instrumentation. Nothing is printed
//! unless the host application installs a subscriber:
//!
//! ```ignore
//! tracing_subscriber::fmt()
//!     .with_env_filter("amlm_core::future=debug,amlm_model=info")
//!     .init();
//! ```
//!
//! Every event emitted by this workspace uses one of the [`targets`] below so
//! subsystems can be filtered independently.

/// Span names used throughout the workspace.
pub mod span_names {
    /// Execution of one task body on a pool thread.
    pub const TASK_RUN: &str = "amlm::task_run";
    /// Draining of a future's continuation queue.
    pub const CONTINUATIONS: &str = "amlm::continuations";
    /// A structural tree mutation.
    pub const TREE_MUTATION: &str = "amlm::tree_mutation";
}

/// Target names for log filtering.
pub mod targets {
    /// Core crate target.
    pub const CORE: &str = "amlm_core";
    /// Future/promise shared state.
    pub const FUTURE: &str = "amlm_core::future";
    /// Task runner.
    pub const TASK: &str = "amlm_core::task";
    /// Signal emission.
    pub const SIGNAL: &str = "amlm_core::signal";
    /// Thread pool and executors.
    pub const THREADPOOL: &str = "amlm_core::threadpool";
    /// Future watchers and progress throttling.
    pub const WATCHER: &str = "amlm_core::watcher";
    /// Tree model mutations.
    pub const TREE: &str = "amlm_model::tree";
    /// Undo/redo bookkeeping.
    pub const UNDO: &str = "amlm_model::undo";
}

/// A guard that keeps a tracing span entered until dropped.
///
/// Useful for timing an operation without threading a span through it.
#[derive(Debug)]
pub struct PerfSpan {
    #[allow(dead_code)]
    span: tracing::span::EnteredSpan,
}

impl PerfSpan {
    /// Enter a new performance span for `name`.
    pub fn new(name: &'static str) -> Self {
        let span = tracing::info_span!(target: "amlm::perf", "perf", operation = name);
        Self {
            span: span.entered(),
        }
    }
}
