//! Stable node identities.
//!
//! Every tree node gets a [`NodeId`] when it is created. Ids are unique for
//! the lifetime of the process, strictly increasing, never reused, and never
//! equal to [`NodeId::NULL`]. They are decoupled from row positions, so an
//! observer can hold on to an id across inserts, moves and removals and
//! resolve it later (a removed node simply stops resolving).

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Identifier of a tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u64);

/// Counter for generating unique node IDs. 0 is reserved for `NodeId::NULL`.
static NODE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

impl NodeId {
    /// The "no node" sentinel. Never returned by [`NodeId::next`].
    pub const NULL: NodeId = NodeId(0);

    /// Issue a fresh id.
    ///
    /// # Panics
    ///
    /// Panics if the 64-bit counter is exhausted.
    pub fn next() -> Self {
        let raw = NODE_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        assert!(raw != u64::MAX, "NodeId counter overflow");
        NodeId(raw)
    }

    /// Whether this is the null sentinel.
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Get the raw u64 value of this node ID.
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "#null")
        } else {
            write!(f, "#{}", self.0)
        }
    }
}

/// Issue a fresh id. Same as [`NodeId::next`].
pub fn create_id() -> NodeId {
    NodeId::next()
}

/// Whether `id` is the null sentinel.
pub fn is_null(id: NodeId) -> bool {
    id.is_null()
}
