//! Error types for the tree model.

use crate::id::NodeId;

/// Result type alias for model operations.
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors returned by tree model mutations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    /// The parent is unknown, detached, or belongs to another tree.
    #[error("invalid parent {0}")]
    InvalidParent(NodeId),

    /// The node is not registered in this tree.
    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    /// A row index is past the end of the parent's children.
    #[error("row {row} out of range under {parent} ({row_count} rows)")]
    RowOutOfRange {
        parent: NodeId,
        row: usize,
        row_count: usize,
    },

    /// Header items only live at the root.
    #[error("a header item cannot be inserted under {0}")]
    HeaderBelowRoot(NodeId),

    /// The calling thread is delivering a removal announcement for this
    /// tree and cannot mutate it until the removal completes.
    #[error("tree is busy announcing a removal on this thread")]
    RemovalInProgress,

    /// A document could not be turned into a tree.
    #[error(transparent)]
    Document(#[from] DocumentError),
}

impl ModelError {
    /// Create a row-out-of-range error.
    pub fn row_out_of_range(parent: NodeId, row: usize, row_count: usize) -> Self {
        Self::RowOutOfRange {
            parent,
            row,
            row_count,
        }
    }
}

/// Errors reading a serialized tree document.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DocumentError {
    /// A node is not a map.
    #[error("expected a map for {context}")]
    NotAMap { context: String },

    /// A required key is absent.
    #[error("missing key '{key}' in {context}")]
    MissingKey { key: String, context: String },

    /// A key holds a value of the wrong kind.
    #[error("key '{key}' in {context} should be {expected}")]
    WrongType {
        key: String,
        context: String,
        expected: &'static str,
    },

    /// The `class` tag names no known node kind.
    #[error("unknown node class '{0}'")]
    UnknownClass(String),

    /// The top-level node is not a header.
    #[error("document root must be of class 'header', found '{0}'")]
    BadRoot(String),
}

impl DocumentError {
    /// Create a missing-key error.
    pub fn missing_key(key: impl Into<String>, context: impl Into<String>) -> Self {
        Self::MissingKey {
            key: key.into(),
            context: context.into(),
        }
    }

    /// Create a wrong-type error.
    pub fn wrong_type(
        key: impl Into<String>,
        context: impl Into<String>,
        expected: &'static str,
    ) -> Self {
        Self::WrongType {
            key: key.into(),
            context: context.into(),
            expected,
        }
    }
}

/// A broken structural invariant found by
/// [`TreeStorage::check_consistency`](crate::TreeStorage::check_consistency).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConsistencyError {
    /// The root is missing or has a parent.
    #[error("root {0} is missing or has a parent")]
    BadRoot(NodeId),

    /// A child id is not registered.
    #[error("{parent} lists unregistered child {child}")]
    Unregistered { parent: NodeId, child: NodeId },

    /// A node is reachable twice.
    #[error("node {0} reachable more than once")]
    Duplicate(NodeId),

    /// A child's parent link does not point back.
    #[error("{child} is listed under {parent} but its parent is {actual}")]
    ParentMismatch {
        child: NodeId,
        parent: NodeId,
        actual: NodeId,
    },

    /// A depth does not equal parent depth + 1.
    #[error("{node} has depth {actual}, expected {expected}")]
    BadDepth {
        node: NodeId,
        expected: usize,
        actual: usize,
    },

    /// A reachable node is flagged detached.
    #[error("{0} is reachable but not attached")]
    Detached(NodeId),

    /// Registered nodes that cannot be reached from the root.
    #[error("{0} registered node(s) unreachable from the root")]
    Unreachable(usize),
}
