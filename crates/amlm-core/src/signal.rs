//! Signal/slot system used for model and watcher notifications.
//!
//! A [`Signal<Args>`] holds any number of connected slots (closures). Emitting
//! the signal invokes every slot with a reference to the arguments.
//!
//! # Delivery
//!
//! - [`Signal::connect`]: the slot runs on the emitting thread, before `emit`
//!   returns.
//! - [`Signal::connect_via`]: the slot is posted to an explicit
//!   [`Executor`](crate::executor::Executor), for example an
//!   [`EventQueue`](crate::executor::EventQueue) drained by the UI thread. The
//!   arguments are cloned for each queued delivery.
//!
//! Slots are invoked with the connection table unlocked, so a slot may connect
//! or disconnect slots on the same signal.
//!
//! # Example
//!
//! ```
//! use amlm_core::Signal;
//!
//! let rows_inserted = Signal::<(u64, usize, usize)>::new();
//!
//! let conn_id = rows_inserted.connect(|(parent, first, last)| {
//!     println!("rows {first}..={last} inserted under {parent}");
//! });
//!
//! rows_inserted.emit((1, 0, 0));
//! rows_inserted.disconnect(conn_id);
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use slotmap::{SlotMap, new_key_type};

use crate::executor::SharedExecutor;
use crate::logging::targets;

new_key_type! {
    /// A unique identifier for a signal-slot connection.
    ///
    /// Use this ID to disconnect a specific connection via [`Signal::disconnect`].
    pub struct ConnectionId;
}

type Slot<Args> = Arc<dyn Fn(&Args) + Send + Sync>;

/// Internal storage for a single connection.
struct Connection<Args> {
    slot: Slot<Args>,
    /// `None` for direct delivery.
    executor: Option<SharedExecutor>,
}

impl<Args> Clone for Connection<Args> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
            executor: self.executor.clone(),
        }
    }
}

/// A type-safe signal that can have multiple connected slots.
///
/// # Type Parameter
///
/// - `Args`: The argument type passed to connected slots. Use `()` for signals
///   with no arguments, or a tuple like `(NodeId, usize, usize)` for several.
///
/// # Thread Safety
///
/// `Signal<Args>` is `Send + Sync` and can be shared between threads. Slots
/// are invoked in connection order.
pub struct Signal<Args> {
    connections: Mutex<SlotMap<ConnectionId, Connection<Args>>>,
    blocked: AtomicBool,
}

impl<Args: Clone + Send + 'static> Default for Signal<Args> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Args: Clone + Send + 'static> Signal<Args> {
    /// Create a new signal with no connections.
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(SlotMap::with_key()),
            blocked: AtomicBool::new(false),
        }
    }

    /// Connect a slot that runs on the emitting thread.
    ///
    /// Returns a `ConnectionId` that can be used to disconnect the slot later.
    pub fn connect<F>(&self, slot: F) -> ConnectionId
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        self.insert(Connection {
            slot: Arc::new(slot),
            executor: None,
        })
    }

    /// Connect a slot whose invocations are posted to `executor`.
    ///
    /// # Example
    ///
    /// ```
    /// use amlm_core::Signal;
    /// use amlm_core::executor::EventQueue;
    ///
    /// let ui_queue = EventQueue::new();
    /// let progress = Signal::<i64>::new();
    /// progress.connect_via(ui_queue.executor(), |value| println!("{value}"));
    ///
    /// progress.emit(10);
    /// // The slot runs when the UI thread drains its queue.
    /// assert_eq!(ui_queue.process_pending(), 1);
    /// ```
    pub fn connect_via<F>(&self, executor: SharedExecutor, slot: F) -> ConnectionId
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        self.insert(Connection {
            slot: Arc::new(slot),
            executor: Some(executor),
        })
    }

    fn insert(&self, connection: Connection<Args>) -> ConnectionId {
        self.connections.lock().insert(connection)
    }

    /// Disconnect a specific slot by its connection ID.
    ///
    /// Returns `true` if the connection was found and removed, `false` otherwise.
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        self.connections.lock().remove(id).is_some()
    }

    /// Disconnect all slots from this signal.
    pub fn disconnect_all(&self) {
        self.connections.lock().clear();
    }

    /// Get the number of connected slots.
    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    /// Block signal emission temporarily.
    ///
    /// While blocked, calls to `emit()` do nothing.
    pub fn set_blocked(&self, blocked: bool) {
        self.blocked.store(blocked, Ordering::SeqCst);
    }

    /// Check if signal emission is currently blocked.
    pub fn is_blocked(&self) -> bool {
        self.blocked.load(Ordering::SeqCst)
    }

    /// Emit the signal, invoking all connected slots.
    #[tracing::instrument(skip_all, target = "amlm_core::signal", level = "trace")]
    pub fn emit(&self, args: Args) {
        if self.is_blocked() {
            tracing::trace!(target: targets::SIGNAL, "signal blocked, skipping emit");
            return;
        }

        let connections: Vec<Connection<Args>> =
            self.connections.lock().values().cloned().collect();
        tracing::trace!(target: targets::SIGNAL, connection_count = connections.len(), "emitting signal");

        for conn in connections {
            match conn.executor {
                None => (conn.slot)(&args),
                Some(executor) => {
                    let slot = conn.slot;
                    let args = args.clone();
                    executor.execute(Box::new(move || slot(&args)));
                }
            }
        }
    }
}

impl<Args> std::fmt::Debug for Signal<Args> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("connections", &self.connections.lock().len())
            .field("blocked", &self.blocked.load(Ordering::SeqCst))
            .finish()
    }
}

static_assertions::assert_impl_all!(Signal<String>: Send, Sync);
