//! Thread-safe tree model.
//!
//! [`ThreadsafeTreeModel`] is a cloneable handle to a [`TreeStorage`] behind
//! a `parking_lot::RwLock`. Reads take the read lock, mutations the write
//! lock, and signals are delivered once the lock has been released, so a
//! slot may call back into the model.
//!
//! # Removal
//!
//! [`delete_subtree`](ThreadsafeTreeModel::delete_subtree) holds an
//! upgradable read lock from planning the removal until the rows are gone.
//! The removal is announced under that lock: observers can still resolve
//! every announced id through the model, and no other writer can touch the
//! tree before the rows are detached. A slot that tries to mutate the model
//! from such an announcement is refused with
//! [`ModelError::RemovalInProgress`].
//!
//! # Batches
//!
//! The lock is not recursive. To run several mutations atomically, take a
//! [`WriteContext`] with [`write`](ThreadsafeTreeModel::write): it holds the
//! write guard, offers the same verbs, and delivers the queued signals when
//! it is dropped. Do not block on a future while holding one.
//!
//! # Undo
//!
//! The `request_*` verbs perform an edit and fold its reverse into
//! caller-owned undo/redo slots (see [`crate::undo`]). The state needed to
//! reverse an edit is read under the same lock that performs it. Undoing a
//! removal re-inserts the nodes under fresh ids; the model remembers which
//! old id became which new one so that older steps still find their nodes.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};

use parking_lot::{Mutex, RwLock, RwLockUpgradableReadGuard, RwLockWriteGuard};

use amlm_core::logging::{span_names, targets};

use crate::column::TreeModelConfig;
use crate::error::{ConsistencyError, ModelError, Result};
use crate::id::NodeId;
use crate::item::TreeItem;
use crate::signals::ModelSignals;
use crate::storage::{DetachedSubtree, ModelEvent, RemovalPlan, TreeNode, TreeStorage};
use crate::undo::{UndoFn, update_undo_redo};
use crate::variant::Variant;

struct Shared {
    storage: RwLock<TreeStorage>,
    signals: ModelSignals,
    /// Old id to the id the node was re-created under.
    aliases: Mutex<HashMap<NodeId, NodeId>>,
    /// Thread delivering a removal announcement, if any.
    announcing: Mutex<Option<ThreadId>>,
}

impl Shared {
    fn announcing_here(&self) -> bool {
        *self.announcing.lock() == Some(thread::current().id())
    }

    /// Deliver `events` with the current thread marked as announcing.
    fn announce(&self, events: Vec<ModelEvent>) {
        struct Reset<'a>(&'a Mutex<Option<ThreadId>>);
        impl Drop for Reset<'_> {
            fn drop(&mut self) {
                *self.0.lock() = None;
            }
        }

        *self.announcing.lock() = Some(thread::current().id());
        let _reset = Reset(&self.announcing);
        self.signals.dispatch_all(events);
    }
}

/// A tree model shared between threads.
///
/// # Example
///
/// ```
/// use amlm_model::{ThreadsafeTreeModel, TreeModelConfig, Variant};
/// use amlm_model::undo::noop;
///
/// let model = ThreadsafeTreeModel::new(TreeModelConfig::with_column_names(["Name"]));
/// let root = model.root();
///
/// let (mut undo, mut redo) = (noop(), noop());
/// let album = model
///     .request_append_child(root, vec![Variant::from("Album")], &mut undo, &mut redo)
///     .unwrap();
/// assert_eq!(model.row_count(root), 1);
///
/// assert!(undo());
/// assert!(model.get_by_id(album).is_none());
/// assert!(redo());
/// assert_eq!(model.data(model.resolve(album), 0), Variant::from("Album"));
/// ```
#[derive(Clone)]
pub struct ThreadsafeTreeModel {
    shared: Arc<Shared>,
}

impl ThreadsafeTreeModel {
    /// A model with just a root holding the configured columns.
    pub fn new(config: TreeModelConfig) -> Self {
        Self::from_storage(TreeStorage::new(config))
    }

    /// Wrap existing storage.
    pub fn from_storage(storage: TreeStorage) -> Self {
        Self {
            shared: Arc::new(Shared {
                storage: RwLock::new(storage),
                signals: ModelSignals::new(),
                aliases: Mutex::new(HashMap::new()),
                announcing: Mutex::new(None),
            }),
        }
    }

    /// Read a model from a document.
    pub fn from_document(document: &Variant) -> Result<Self> {
        TreeStorage::from_document(document).map(Self::from_storage)
    }

    fn from_weak(weak: &Weak<Shared>) -> Option<Self> {
        weak.upgrade().map(|shared| Self { shared })
    }

    /// The model's signals.
    pub fn signals(&self) -> &ModelSignals {
        &self.shared.signals
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    // Reads are recursive so that slots receiving a removal announcement,
    // delivered under the upgradable lock, can still look at the tree.

    /// Run `f` with the storage read-locked.
    pub fn with_storage<R>(&self, f: impl FnOnce(&TreeStorage) -> R) -> R {
        f(&self.shared.storage.read_recursive())
    }

    /// Run `f` on node `id` with the storage read-locked.
    pub fn with_node<R>(&self, id: NodeId, f: impl FnOnce(&TreeNode) -> R) -> Option<R> {
        self.shared.storage.read_recursive().get_by_id(id).map(f)
    }

    /// A snapshot of node `id`.
    pub fn get_by_id(&self, id: NodeId) -> Option<TreeNode> {
        self.with_node(id, TreeNode::clone)
    }

    pub fn root(&self) -> NodeId {
        self.with_storage(TreeStorage::root)
    }

    pub fn node_count(&self) -> usize {
        self.with_storage(TreeStorage::node_count)
    }

    pub fn row_count(&self, id: NodeId) -> usize {
        self.with_storage(|s| s.row_count(id))
    }

    pub fn column_count(&self, id: NodeId) -> usize {
        self.with_storage(|s| s.column_count(id))
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.with_storage(|s| s.children(id).to_vec())
    }

    pub fn child_at(&self, parent: NodeId, row: usize) -> Option<NodeId> {
        self.with_storage(|s| s.child_at(parent, row))
    }

    pub fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        self.with_storage(|s| s.parent_of(id))
    }

    pub fn row_of(&self, id: NodeId) -> Option<usize> {
        self.with_storage(|s| s.row_of(id))
    }

    pub fn depth(&self, id: NodeId) -> Option<usize> {
        self.with_storage(|s| s.depth(id))
    }

    pub fn data(&self, id: NodeId, column: usize) -> Variant {
        self.with_storage(|s| s.data(id, column))
    }

    pub fn header_data(&self, section: usize) -> Variant {
        self.with_storage(|s| s.header_data(section))
    }

    pub fn to_document(&self) -> Variant {
        self.with_storage(TreeStorage::to_document)
    }

    pub fn check_consistency(&self) -> std::result::Result<(), ConsistencyError> {
        self.with_storage(TreeStorage::check_consistency)
    }

    /// The id a node lives under now, following re-creations done by undo
    /// and redo. Ids that were never re-created resolve to themselves.
    pub fn resolve(&self, id: NodeId) -> NodeId {
        let aliases = self.shared.aliases.lock();
        let mut current = id;
        while let Some(&next) = aliases.get(&current) {
            current = next;
        }
        current
    }

    fn rebind(&self, old: NodeId, new: NodeId) {
        let terminal = self.resolve(old);
        if terminal != new {
            tracing::trace!(target: targets::UNDO, %old, %new, "node re-created");
            self.shared.aliases.lock().insert(terminal, new);
        }
    }

    // -------------------------------------------------------------------------
    // Mutations
    // -------------------------------------------------------------------------

    /// Take the write lock for a batch of mutations.
    ///
    /// Fails with [`ModelError::RemovalInProgress`] when called from a slot
    /// that is receiving a removal announcement of this model.
    pub fn write(&self) -> Result<WriteContext<'_>> {
        if self.shared.announcing_here() {
            return Err(ModelError::RemovalInProgress);
        }
        Ok(WriteContext {
            guard: Some(self.shared.storage.write()),
            events: Vec::new(),
            shared: &self.shared,
        })
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut TreeStorage, &mut Vec<ModelEvent>) -> R) -> Result<R> {
        if self.shared.announcing_here() {
            tracing::warn!(target: targets::TREE, "mutation refused during a removal announcement");
            return Err(ModelError::RemovalInProgress);
        }
        let mut events = Vec::new();
        let result = {
            let _span = tracing::trace_span!(target: targets::TREE, span_names::TREE_MUTATION).entered();
            let mut storage = self.shared.storage.write();
            f(&mut storage, &mut events)
        };
        self.shared.signals.dispatch_all(events);
        Ok(result)
    }

    pub fn append_child(&self, parent: NodeId, values: Vec<Variant>) -> Result<NodeId> {
        self.mutate(|s, events| s.append_child(parent, values, &mut |e| events.push(e)))?
    }

    pub fn append_item(&self, parent: NodeId, item: TreeItem) -> Result<NodeId> {
        self.mutate(|s, events| s.append_item(parent, item, &mut |e| events.push(e)))?
    }

    pub fn insert_item(&self, parent: NodeId, row: usize, item: TreeItem) -> Result<NodeId> {
        self.mutate(|s, events| s.insert_item(parent, row, item, &mut |e| events.push(e)))?
    }

    /// Re-insert a detached subtree under fresh ids. Returns old-to-new ids.
    pub fn insert_subtree(
        &self,
        parent: NodeId,
        row: usize,
        subtree: DetachedSubtree,
    ) -> Result<HashMap<NodeId, NodeId>> {
        self.mutate(|s, events| s.insert_subtree(parent, row, subtree, &mut |e| events.push(e)))?
    }

    pub fn change_parent(&self, node: NodeId, new_parent: NodeId) -> bool {
        self.mutate(|s, events| s.change_parent(node, new_parent, &mut |e| events.push(e)))
            .unwrap_or(false)
    }

    pub fn move_item(&self, node: NodeId, dest_parent: NodeId, dest_row: usize) -> bool {
        self.mutate(|s, events| s.move_item(node, dest_parent, dest_row, &mut |e| events.push(e)))
            .unwrap_or(false)
    }

    pub fn delete_subtree(&self, node: NodeId) -> bool {
        self.remove(node, None).is_some()
    }

    pub fn remove_child(&self, parent: NodeId, node: NodeId) -> bool {
        self.remove(node, Some(parent)).is_some()
    }

    /// Remove `node` and its descendants and hand them back.
    pub fn take_subtree(&self, node: NodeId) -> Option<DetachedSubtree> {
        self.remove(node, None).map(|(_, subtree)| subtree)
    }

    /// Plan, announce and detach under one upgradable lock. Returns the plan
    /// the removal followed and the detached nodes.
    fn remove(
        &self,
        node: NodeId,
        expected_parent: Option<NodeId>,
    ) -> Option<(RemovalPlan, DetachedSubtree)> {
        if self.shared.announcing_here() {
            tracing::warn!(target: targets::TREE, %node, "removal refused during a removal announcement");
            return None;
        }
        let _span = tracing::trace_span!(target: targets::TREE, span_names::TREE_MUTATION).entered();
        let storage = self.shared.storage.upgradable_read();
        let plan = storage.plan_removal(node)?;
        if expected_parent.is_some_and(|parent| parent != plan.parent) {
            return None;
        }
        self.shared.announce(vec![plan.announcement()]);

        let mut events = Vec::new();
        let taken = {
            let mut storage = RwLockUpgradableReadGuard::upgrade(storage);
            storage.detach(&plan, &mut |e| events.push(e))
        };
        self.shared.signals.dispatch_all(events);
        taken.map(|subtree| (plan, subtree))
    }

    pub fn set_data(&self, id: NodeId, column: usize, value: Variant) -> bool {
        self.mutate(|s, events| s.set_data(id, column, value, &mut |e| events.push(e)))
            .unwrap_or(false)
    }

    pub fn set_header_data(&self, section: usize, name: impl Into<String>) -> bool {
        self.mutate(|s, events| s.set_header_data(section, name, &mut |e| events.push(e)))
            .unwrap_or(false)
    }

    pub fn insert_columns(&self, position: usize, count: usize) -> bool {
        self.mutate(|s, events| s.insert_columns(position, count, &mut |e| events.push(e)))
            .unwrap_or(false)
    }

    pub fn remove_columns(&self, position: usize, count: usize) -> bool {
        self.mutate(|s, events| s.remove_columns(position, count, &mut |e| events.push(e)))
            .unwrap_or(false)
    }

    pub fn clear(&self) {
        if self.mutate(|s, events| s.clear(&mut |e| events.push(e))).is_ok() {
            self.shared.aliases.lock().clear();
        }
    }

    /// Put `node` back at `row` under `parent`. Succeeds if it is already there.
    fn restore_position(&self, node: NodeId, parent: NodeId, row: usize) -> bool {
        let Ok(mut ctx) = self.write() else {
            return false;
        };
        let storage = ctx.storage();
        match (storage.parent_of(node), storage.row_of(node)) {
            (Some(p), Some(r)) if p == parent && r == row => true,
            (Some(p), Some(r)) => {
                let dest_row = if p == parent && r < row { row + 1 } else { row };
                ctx.move_item(node, parent, dest_row)
            }
            _ => false,
        }
    }

    // -------------------------------------------------------------------------
    // Undoable mutations
    // -------------------------------------------------------------------------

    /// [`append_child`](Self::append_child), recording the reverse step.
    pub fn request_append_child(
        &self,
        parent: NodeId,
        values: Vec<Variant>,
        undo: &mut UndoFn,
        redo: &mut UndoFn,
    ) -> Result<NodeId> {
        self.request_append_item(parent, TreeItem::Generic(values), undo, redo)
    }

    /// [`append_item`](Self::append_item), recording the reverse step.
    pub fn request_append_item(
        &self,
        parent: NodeId,
        item: TreeItem,
        undo: &mut UndoFn,
        redo: &mut UndoFn,
    ) -> Result<NodeId> {
        let id = self.append_item(parent, item.clone())?;
        let weak = Arc::downgrade(&self.shared);

        let operation: UndoFn = {
            let weak = weak.clone();
            Arc::new(move || {
                let Some(model) = Self::from_weak(&weak) else {
                    return false;
                };
                match model.append_item(model.resolve(parent), item.clone()) {
                    Ok(new_id) => {
                        model.rebind(id, new_id);
                        true
                    }
                    Err(err) => {
                        tracing::warn!(target: targets::UNDO, %err, "re-appending row failed");
                        false
                    }
                }
            })
        };
        let reverse: UndoFn = Arc::new(move || {
            Self::from_weak(&weak).is_some_and(|model| model.delete_subtree(model.resolve(id)))
        });

        update_undo_redo(operation, reverse, undo, redo);
        Ok(id)
    }

    /// [`delete_subtree`](Self::delete_subtree), recording the reverse step.
    pub fn request_delete_subtree(
        &self,
        node: NodeId,
        undo: &mut UndoFn,
        redo: &mut UndoFn,
    ) -> bool {
        let Some((plan, taken)) = self.remove(node, None) else {
            return false;
        };
        let (parent, row) = (plan.parent, plan.row);
        let stash = Arc::new(Mutex::new(Some(taken)));
        let weak = Arc::downgrade(&self.shared);

        let operation: UndoFn = {
            let weak = weak.clone();
            let stash = stash.clone();
            Arc::new(move || {
                let Some(model) = Self::from_weak(&weak) else {
                    return false;
                };
                match model.take_subtree(model.resolve(node)) {
                    Some(subtree) => {
                        *stash.lock() = Some(subtree);
                        true
                    }
                    None => false,
                }
            })
        };
        let reverse: UndoFn = Arc::new(move || {
            let Some(model) = Self::from_weak(&weak) else {
                return false;
            };
            let Some(subtree) = stash.lock().take() else {
                return false;
            };
            match model.insert_subtree(model.resolve(parent), row, subtree) {
                Ok(mapping) => {
                    for (old, new) in mapping {
                        model.rebind(old, new);
                    }
                    true
                }
                Err(err) => {
                    tracing::warn!(target: targets::UNDO, %err, "restoring removed rows failed");
                    false
                }
            }
        });

        update_undo_redo(operation, reverse, undo, redo);
        true
    }

    /// [`change_parent`](Self::change_parent), recording the reverse step.
    pub fn request_change_parent(
        &self,
        node: NodeId,
        new_parent: NodeId,
        undo: &mut UndoFn,
        redo: &mut UndoFn,
    ) -> bool {
        let moved = self.locked_move(node, |ctx| ctx.change_parent(node, new_parent));
        let Some((old_parent, old_row)) = moved else {
            return false;
        };
        let weak = Arc::downgrade(&self.shared);

        let operation: UndoFn = {
            let weak = weak.clone();
            Arc::new(move || {
                Self::from_weak(&weak).is_some_and(|model| {
                    model.change_parent(model.resolve(node), model.resolve(new_parent))
                })
            })
        };
        let reverse: UndoFn = Arc::new(move || {
            Self::from_weak(&weak).is_some_and(|model| {
                model.restore_position(model.resolve(node), model.resolve(old_parent), old_row)
            })
        });

        update_undo_redo(operation, reverse, undo, redo);
        true
    }

    /// [`move_item`](Self::move_item), recording the reverse step.
    pub fn request_move_item(
        &self,
        node: NodeId,
        dest_parent: NodeId,
        dest_row: usize,
        undo: &mut UndoFn,
        redo: &mut UndoFn,
    ) -> bool {
        let moved = self.locked_move(node, |ctx| ctx.move_item(node, dest_parent, dest_row));
        let Some((old_parent, old_row)) = moved else {
            return false;
        };
        let weak = Arc::downgrade(&self.shared);

        let operation: UndoFn = {
            let weak = weak.clone();
            Arc::new(move || {
                Self::from_weak(&weak).is_some_and(|model| {
                    model.move_item(model.resolve(node), model.resolve(dest_parent), dest_row)
                })
            })
        };
        let reverse: UndoFn = Arc::new(move || {
            Self::from_weak(&weak).is_some_and(|model| {
                model.restore_position(model.resolve(node), model.resolve(old_parent), old_row)
            })
        });

        update_undo_redo(operation, reverse, undo, redo);
        true
    }

    /// Run a structural move on `node` and return where it was, all under
    /// one write lock.
    fn locked_move(
        &self,
        node: NodeId,
        f: impl FnOnce(&mut WriteContext<'_>) -> bool,
    ) -> Option<(NodeId, usize)> {
        let mut ctx = self.write().ok()?;
        let storage = ctx.storage();
        let position = (storage.parent_of(node)?, storage.row_of(node)?);
        f(&mut ctx).then_some(position)
    }

    /// [`set_data`](Self::set_data), recording the reverse step.
    pub fn request_set_data(
        &self,
        id: NodeId,
        column: usize,
        value: Variant,
        undo: &mut UndoFn,
        redo: &mut UndoFn,
    ) -> bool {
        let old = {
            let Ok(mut ctx) = self.write() else {
                return false;
            };
            let old = ctx.storage().data(id, column);
            if !ctx.set_data(id, column, value.clone()) {
                return false;
            }
            old
        };
        let weak = Arc::downgrade(&self.shared);

        let operation: UndoFn = {
            let weak = weak.clone();
            Arc::new(move || {
                Self::from_weak(&weak)
                    .is_some_and(|model| model.set_data(model.resolve(id), column, value.clone()))
            })
        };
        let reverse: UndoFn = Arc::new(move || {
            Self::from_weak(&weak)
                .is_some_and(|model| model.set_data(model.resolve(id), column, old.clone()))
        });

        update_undo_redo(operation, reverse, undo, redo);
        true
    }
}

impl Default for ThreadsafeTreeModel {
    fn default() -> Self {
        Self::new(TreeModelConfig::default())
    }
}

impl std::fmt::Debug for ThreadsafeTreeModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadsafeTreeModel")
            .field("nodes", &self.node_count())
            .finish_non_exhaustive()
    }
}

/// Exclusive access to a [`ThreadsafeTreeModel`] for a batch of mutations.
///
/// Signals produced inside the context are queued and delivered, in order,
/// when the context is dropped or [`flush`](Self::flush)ed, with the lock
/// released.
///
/// Removals are the exception: before the rows are detached, the queued
/// signals and the removal announcement are delivered with the lock
/// downgraded to an upgradable read. Slots can read the model but not
/// change it, and other writers stay out until the context is dropped.
pub struct WriteContext<'a> {
    /// Only empty while a removal is being announced.
    guard: Option<RwLockWriteGuard<'a, TreeStorage>>,
    events: Vec<ModelEvent>,
    shared: &'a Shared,
}

impl WriteContext<'_> {
    /// The locked storage, for reads.
    pub fn storage(&self) -> &TreeStorage {
        match self.guard.as_deref() {
            Some(storage) => storage,
            None => unreachable!("write guard is restored after each announcement"),
        }
    }

    fn parts(&mut self) -> (&mut TreeStorage, &mut Vec<ModelEvent>) {
        match self.guard.as_deref_mut() {
            Some(storage) => (storage, &mut self.events),
            None => unreachable!("write guard is restored after each announcement"),
        }
    }

    /// Number of signals waiting for delivery.
    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    /// Deliver the queued signals now, releasing the lock while they run.
    pub fn flush(&mut self) {
        if self.events.is_empty() {
            return;
        }
        let events = std::mem::take(&mut self.events);
        let signals = &self.shared.signals;
        if let Some(guard) = self.guard.as_mut() {
            RwLockWriteGuard::unlocked(guard, || signals.dispatch_all(events));
        }
    }

    pub fn append_child(&mut self, parent: NodeId, values: Vec<Variant>) -> Result<NodeId> {
        let (storage, events) = self.parts();
        storage.append_child(parent, values, &mut |e| events.push(e))
    }

    pub fn append_item(&mut self, parent: NodeId, item: TreeItem) -> Result<NodeId> {
        let (storage, events) = self.parts();
        storage.append_item(parent, item, &mut |e| events.push(e))
    }

    pub fn insert_item(&mut self, parent: NodeId, row: usize, item: TreeItem) -> Result<NodeId> {
        let (storage, events) = self.parts();
        storage.insert_item(parent, row, item, &mut |e| events.push(e))
    }

    pub fn change_parent(&mut self, node: NodeId, new_parent: NodeId) -> bool {
        let (storage, events) = self.parts();
        storage.change_parent(node, new_parent, &mut |e| events.push(e))
    }

    pub fn move_item(&mut self, node: NodeId, dest_parent: NodeId, dest_row: usize) -> bool {
        let (storage, events) = self.parts();
        storage.move_item(node, dest_parent, dest_row, &mut |e| events.push(e))
    }

    pub fn delete_subtree(&mut self, node: NodeId) -> bool {
        self.take_subtree(node).is_some()
    }

    pub fn remove_child(&mut self, parent: NodeId, node: NodeId) -> bool {
        if self.storage().parent_of(node) != Some(parent) {
            return false;
        }
        self.delete_subtree(node)
    }

    /// Remove `node` and its descendants and hand them back.
    pub fn take_subtree(&mut self, node: NodeId) -> Option<DetachedSubtree> {
        let plan = self.storage().plan_removal(node)?;
        let mut events = std::mem::take(&mut self.events);
        events.push(plan.announcement());

        let guard = self.guard.take()?;
        let upgradable = RwLockWriteGuard::downgrade_to_upgradable(guard);
        self.shared.announce(events);
        self.guard = Some(RwLockUpgradableReadGuard::upgrade(upgradable));

        let (storage, events) = self.parts();
        storage.detach(&plan, &mut |e| events.push(e))
    }

    pub fn set_data(&mut self, id: NodeId, column: usize, value: Variant) -> bool {
        let (storage, events) = self.parts();
        storage.set_data(id, column, value, &mut |e| events.push(e))
    }

    pub fn set_header_data(&mut self, section: usize, name: impl Into<String>) -> bool {
        let (storage, events) = self.parts();
        storage.set_header_data(section, name, &mut |e| events.push(e))
    }

    pub fn insert_columns(&mut self, position: usize, count: usize) -> bool {
        let (storage, events) = self.parts();
        storage.insert_columns(position, count, &mut |e| events.push(e))
    }

    pub fn remove_columns(&mut self, position: usize, count: usize) -> bool {
        let (storage, events) = self.parts();
        storage.remove_columns(position, count, &mut |e| events.push(e))
    }

    pub fn clear(&mut self) {
        let (storage, events) = self.parts();
        storage.clear(&mut |e| events.push(e))
    }
}

impl Drop for WriteContext<'_> {
    fn drop(&mut self) {
        self.flush();
    }
}

static_assertions::assert_impl_all!(ThreadsafeTreeModel: Send, Sync, Clone);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::undo::noop;

    fn model() -> ThreadsafeTreeModel {
        ThreadsafeTreeModel::new(TreeModelConfig::with_column_names(["Name"]))
    }

    fn name(s: &str) -> Vec<Variant> {
        vec![Variant::from(s)]
    }

    #[test]
    fn test_slots_can_read_the_model() {
        let model = model();
        let root = model.root();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let m = model.clone();
        let s = seen.clone();
        model.signals().rows_inserted.connect(move |(parent, first, _)| {
            let child = m.child_at(*parent, *first).unwrap();
            s.lock().push(m.data(child, 0));
        });

        model.append_child(root, name("a")).unwrap();
        assert_eq!(*seen.lock(), vec![Variant::from("a")]);
    }

    #[test]
    fn test_removal_announced_while_rows_resolve() {
        let model = model();
        let root = model.root();
        let a = model.append_child(root, name("a")).unwrap();
        let b = model.append_child(a, name("b")).unwrap();

        let resolved = Arc::new(Mutex::new(Vec::new()));
        let m = model.clone();
        let r = resolved.clone();
        model
            .signals()
            .rows_about_to_be_removed
            .connect(move |(_, _, _, ids)| {
                for id in ids {
                    r.lock().push(m.data(*id, 0));
                }
            });

        assert!(model.delete_subtree(a));
        assert_eq!(*resolved.lock(), vec![Variant::from("a"), Variant::from("b")]);
        assert!(model.get_by_id(b).is_none());
    }

    #[test]
    fn test_write_context_queues_signals() {
        let model = model();
        let root = model.root();
        let count = Arc::new(Mutex::new(0));
        let c = count.clone();
        model.signals().rows_inserted.connect(move |_| *c.lock() += 1);

        {
            let mut ctx = model.write().unwrap();
            let a = ctx.append_child(root, name("a")).unwrap();
            ctx.append_child(a, name("b")).unwrap();
            assert_eq!(ctx.storage().node_count(), 3);
            assert_eq!(ctx.pending_events(), 4);
            assert_eq!(*count.lock(), 0);
        }
        assert_eq!(*count.lock(), 2);
    }

    #[test]
    fn test_removal_from_announcement_slot_is_refused() {
        let model = model();
        let root = model.root();
        let a = model.append_child(root, name("a")).unwrap();

        let announced = Arc::new(Mutex::new(0));
        let removed = Arc::new(Mutex::new(0));
        let nested = Arc::new(Mutex::new(Vec::new()));
        let m = model.clone();
        let (an, ne) = (announced.clone(), nested.clone());
        model.signals().rows_about_to_be_removed.connect(move |_| {
            *an.lock() += 1;
            ne.lock().push(m.delete_subtree(a));
            ne.lock().push(m.set_data(a, 0, Variant::from("x")));
            assert_eq!(m.append_child(root, name("b")), Err(ModelError::RemovalInProgress));
            assert!(m.write().is_err());
        });
        let re = removed.clone();
        model.signals().rows_removed.connect(move |_| *re.lock() += 1);

        assert!(model.delete_subtree(a));
        assert_eq!(*announced.lock(), 1);
        assert_eq!(*removed.lock(), 1);
        assert_eq!(*nested.lock(), vec![false, false]);
        assert_eq!(model.row_count(root), 0);

        // Mutations work again once the removal is over.
        model.append_child(root, name("c")).unwrap();
    }

    #[test]
    fn test_remove_child_checks_parent() {
        let model = model();
        let root = model.root();
        let a = model.append_child(root, name("a")).unwrap();
        let b = model.append_child(a, name("b")).unwrap();
        assert!(!model.remove_child(root, b));
        assert!(model.remove_child(a, b));
        assert_eq!(model.row_count(a), 0);
    }

    #[test]
    fn test_write_context_announces_removal_before_detach() {
        let model = model();
        let root = model.root();
        let log = Arc::new(Mutex::new(Vec::new()));

        let l = log.clone();
        model
            .signals()
            .rows_inserted
            .connect(move |(_, first, _)| l.lock().push(format!("inserted {first}")));
        let (m, l) = (model.clone(), log.clone());
        model
            .signals()
            .rows_about_to_be_removed
            .connect(move |(_, _, _, ids)| {
                let names: Vec<_> = ids.iter().map(|id| m.data(*id, 0)).collect();
                l.lock().push(format!("about-remove {names:?}"));
                assert!(m.append_child(root, name("late")).is_err());
            });
        let l = log.clone();
        model
            .signals()
            .rows_removed
            .connect(move |(_, first, _)| l.lock().push(format!("removed {first}")));

        {
            let mut ctx = model.write().unwrap();
            let a = ctx.append_child(root, name("a")).unwrap();
            ctx.append_child(a, name("b")).unwrap();
            assert!(ctx.delete_subtree(a));
            assert_eq!(ctx.storage().node_count(), 1);
            assert_eq!(ctx.pending_events(), 1);
        }

        let expected_names = vec![Variant::from("a"), Variant::from("b")];
        assert_eq!(
            *log.lock(),
            vec![
                "inserted 0".to_string(),
                "inserted 0".to_string(),
                format!("about-remove {expected_names:?}"),
                "removed 0".to_string(),
            ]
        );
        assert!(model.check_consistency().is_ok());
    }

    #[test]
    fn test_request_set_data_records_value_under_lock() {
        let model = model();
        let root = model.root();
        let a = model.append_child(root, name("a")).unwrap();

        // A slot that edits the cell again runs after the request is done,
        // so the recorded reverse step still holds the value it replaced.
        let m = model.clone();
        model.signals().data_changed.connect(move |(id, _, _)| {
            if m.data(*id, 0) == Variant::from("b") {
                m.set_data(*id, 0, Variant::from("c"));
            }
        });

        let (mut undo, mut redo) = (noop(), noop());
        assert!(model.request_set_data(a, 0, Variant::from("b"), &mut undo, &mut redo));
        assert_eq!(model.data(a, 0), Variant::from("c"));
        assert!(undo());
        assert_eq!(model.data(a, 0), Variant::from("a"));
    }

    #[test]
    fn test_undo_delete_rebinds_ids() {
        let model = model();
        let root = model.root();
        let a = model.append_child(root, name("a")).unwrap();
        let b = model.append_child(a, name("b")).unwrap();

        let (mut undo, mut redo) = (noop(), noop());
        assert!(model.request_set_data(b, 0, Variant::from("b2"), &mut undo, &mut redo));
        assert!(model.request_delete_subtree(a, &mut undo, &mut redo));
        assert_eq!(model.row_count(root), 0);

        // Reverses the delete (fresh ids), then the edit through the alias.
        assert!(undo());
        let new_b = model.resolve(b);
        assert_ne!(new_b, b);
        assert_eq!(model.data(new_b, 0), Variant::from("b"));
        assert!(model.check_consistency().is_ok());

        assert!(redo());
        assert_eq!(model.row_count(root), 0);
    }

    #[test]
    fn test_undo_after_model_dropped_fails() {
        let model = model();
        let root = model.root();
        let (mut undo, mut redo) = (noop(), noop());
        model.request_append_child(root, name("a"), &mut undo, &mut redo).unwrap();
        drop(model);
        assert!(!undo());
    }
}
