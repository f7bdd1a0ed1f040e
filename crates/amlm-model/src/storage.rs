//! Arena storage for tree nodes.
//!
//! [`TreeStorage`] owns every node of one tree in a map keyed by [`NodeId`].
//! It knows nothing about locking or signal delivery: each mutation takes an
//! event sink and reports what it does as [`ModelEvent`]s, "about to" events
//! before the change and "done" events after it. [`TreeModel`] forwards the
//! events straight to its signals; [`ThreadsafeTreeModel`] queues them until
//! its lock is released.
//!
//! [`TreeModel`]: crate::TreeModel
//! [`ThreadsafeTreeModel`]: crate::ThreadsafeTreeModel

use std::collections::{HashMap, HashSet, VecDeque};

use amlm_core::logging::targets;

use crate::column::{ColumnSpec, TreeModelConfig};
use crate::error::{ConsistencyError, ModelError, Result};
use crate::id::NodeId;
use crate::item::TreeItem;
use crate::variant::Variant;

/// One row of the tree.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    id: NodeId,
    parent: NodeId,
    children: Vec<NodeId>,
    depth: usize,
    attached: bool,
    item: TreeItem,
}

impl TreeNode {
    fn new(parent: NodeId, depth: usize, item: TreeItem) -> Self {
        Self {
            id: NodeId::next(),
            parent,
            children: Vec::new(),
            depth,
            attached: true,
            item,
        }
    }

    /// The node's id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The parent's id, [`NodeId::NULL`] for the root.
    pub fn parent(&self) -> NodeId {
        self.parent
    }

    /// Child ids in row order.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Distance from the root.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Whether the node is part of a tree.
    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// The node's payload.
    pub fn item(&self) -> &TreeItem {
        &self.item
    }

    /// The value shown in `column`.
    pub fn data(&self, column: usize) -> Variant {
        self.item.data(column)
    }

    /// Number of columns the node renders.
    pub fn column_count(&self) -> usize {
        self.item.column_count()
    }
}

/// A structural or data change reported by a storage mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelEvent {
    /// Rows `first..=last` are about to appear under `parent`.
    RowsAboutToBeInserted { parent: NodeId, first: usize, last: usize },
    /// Rows `first..=last` appeared under `parent`.
    RowsInserted { parent: NodeId, first: usize, last: usize },
    /// Rows are about to be removed. `ids` lists every node of the removed
    /// subtrees in preorder; they still resolve when this is delivered.
    RowsAboutToBeRemoved {
        parent: NodeId,
        first: usize,
        last: usize,
        ids: Vec<NodeId>,
    },
    /// Rows were removed.
    RowsRemoved { parent: NodeId, first: usize, last: usize },
    /// Rows are about to move. `dest_row` is in pre-move coordinates.
    RowsAboutToBeMoved {
        source_parent: NodeId,
        first: usize,
        last: usize,
        dest_parent: NodeId,
        dest_row: usize,
    },
    /// Rows moved.
    RowsMoved {
        source_parent: NodeId,
        first: usize,
        last: usize,
        dest_parent: NodeId,
        dest_row: usize,
    },
    /// Columns `first..=last` are about to be inserted.
    ColumnsAboutToBeInserted { first: usize, last: usize },
    /// Columns were inserted.
    ColumnsInserted { first: usize, last: usize },
    /// Columns `first..=last` are about to be removed.
    ColumnsAboutToBeRemoved { first: usize, last: usize },
    /// Columns were removed.
    ColumnsRemoved { first: usize, last: usize },
    /// Cells `first_column..=last_column` of `node` changed.
    DataChanged {
        node: NodeId,
        first_column: usize,
        last_column: usize,
    },
    /// Header sections `first..=last` changed.
    HeaderDataChanged { first: usize, last: usize },
    /// Every non-root node is about to go.
    ModelAboutToReset,
    /// The tree was reset.
    ModelReset,
}

/// A subtree taken out of a tree.
///
/// The nodes keep their old ids but are no longer attached; re-inserting the
/// subtree with [`TreeStorage::insert_subtree`] issues fresh ids.
#[derive(Debug, Clone, PartialEq)]
pub struct DetachedSubtree {
    root: NodeId,
    nodes: HashMap<NodeId, TreeNode>,
}

impl DetachedSubtree {
    /// Old id of the subtree's top node.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of nodes in the subtree.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the subtree is empty. Never true for a taken subtree.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// A node of the subtree, by its old id.
    pub fn get(&self, id: NodeId) -> Option<&TreeNode> {
        self.nodes.get(&id)
    }
}

/// What removing a subtree will do, computed before the removal.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RemovalPlan {
    pub(crate) node: NodeId,
    pub(crate) parent: NodeId,
    pub(crate) row: usize,
    pub(crate) ids: Vec<NodeId>,
}

impl RemovalPlan {
    pub(crate) fn announcement(&self) -> ModelEvent {
        ModelEvent::RowsAboutToBeRemoved {
            parent: self.parent,
            first: self.row,
            last: self.row,
            ids: self.ids.clone(),
        }
    }
}

/// The nodes of one tree.
#[derive(Debug, Clone)]
pub struct TreeStorage {
    nodes: HashMap<NodeId, TreeNode>,
    root: NodeId,
}

impl Default for TreeStorage {
    fn default() -> Self {
        Self::new(TreeModelConfig::default())
    }
}

impl TreeStorage {
    /// A tree holding only a root with the configured header columns.
    pub fn new(config: TreeModelConfig) -> Self {
        let root = TreeNode::new(NodeId::NULL, 0, TreeItem::Header(config.columns));
        let root_id = root.id;
        let mut nodes = HashMap::new();
        nodes.insert(root_id, root);
        Self { nodes, root: root_id }
    }

    /// The hidden root's id.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of registered nodes, root included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// The header columns.
    pub fn columns(&self) -> &[ColumnSpec] {
        self.nodes
            .get(&self.root)
            .and_then(|root| root.item.columns())
            .unwrap_or(&[])
    }

    // -------------------------------------------------------------------------
    // Lookups
    // -------------------------------------------------------------------------

    /// The node with `id`, if it is registered.
    pub fn get_by_id(&self, id: NodeId) -> Option<&TreeNode> {
        self.nodes.get(&id)
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Number of children of `id`; 0 for unknown ids.
    pub fn row_count(&self, id: NodeId) -> usize {
        self.nodes.get(&id).map_or(0, |n| n.children.len())
    }

    /// Number of columns `id` renders; 0 for unknown ids.
    pub fn column_count(&self, id: NodeId) -> usize {
        self.nodes.get(&id).map_or(0, TreeNode::column_count)
    }

    /// Child ids of `id` in row order; empty for unknown ids.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes.get(&id).map_or(&[], |n| n.children.as_slice())
    }

    /// The child of `parent` at `row`.
    pub fn child_at(&self, parent: NodeId, row: usize) -> Option<NodeId> {
        self.children(parent).get(row).copied()
    }

    /// The parent of `id`. `None` for the root and unknown ids.
    pub fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        self.nodes
            .get(&id)
            .map(|n| n.parent)
            .filter(|parent| !parent.is_null())
    }

    /// The row of `id` under its parent. `None` for the root and unknown ids.
    pub fn row_of(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent_of(id)?;
        self.children(parent).iter().position(|&child| child == id)
    }

    /// Depth of `id`, 0 for the root.
    pub fn depth(&self, id: NodeId) -> Option<usize> {
        self.nodes.get(&id).map(|n| n.depth)
    }

    /// The value of `column` in node `id`; `Variant::Null` if either is unknown.
    pub fn data(&self, id: NodeId, column: usize) -> Variant {
        self.nodes
            .get(&id)
            .map(|n| n.data(column))
            .unwrap_or_default()
    }

    /// Header text of `section`; `Variant::Null` past the last column.
    pub fn header_data(&self, section: usize) -> Variant {
        self.columns()
            .get(section)
            .map(|c| Variant::from(c.display_name.as_str()))
            .unwrap_or_default()
    }

    /// Ids of `id` and all its descendants in preorder.
    pub fn subtree_ids(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get(&current) {
                out.push(current);
                stack.extend(node.children.iter().rev());
            }
        }
        out
    }

    /// Whether `ancestor` is `id` or one of its ancestors.
    fn is_ancestor_or_self(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut current = id;
        while !current.is_null() {
            if current == ancestor {
                return true;
            }
            current = self.nodes.get(&current).map_or(NodeId::NULL, |n| n.parent);
        }
        false
    }

    fn set_depths(&mut self, id: NodeId, depth: usize) {
        let mut stack = vec![(id, depth)];
        while let Some((current, depth)) = stack.pop() {
            if let Some(node) = self.nodes.get_mut(&current) {
                node.depth = depth;
                stack.extend(node.children.iter().map(|&child| (child, depth + 1)));
            }
        }
    }

    // -------------------------------------------------------------------------
    // Insertion
    // -------------------------------------------------------------------------

    /// Append a generic node holding `values` as the last child of `parent`.
    pub fn append_child(
        &mut self,
        parent: NodeId,
        values: Vec<Variant>,
        emit: &mut impl FnMut(ModelEvent),
    ) -> Result<NodeId> {
        self.append_item(parent, TreeItem::Generic(values), emit)
    }

    /// Append `item` as the last child of `parent`.
    pub fn append_item(
        &mut self,
        parent: NodeId,
        item: TreeItem,
        emit: &mut impl FnMut(ModelEvent),
    ) -> Result<NodeId> {
        let row = self.row_count(parent);
        self.insert_item(parent, row, item, emit)
    }

    /// Insert `item` under `parent` at `row`.
    pub fn insert_item(
        &mut self,
        parent: NodeId,
        row: usize,
        item: TreeItem,
        emit: &mut impl FnMut(ModelEvent),
    ) -> Result<NodeId> {
        let parent_depth = self.check_insert(parent, row)?;
        if matches!(item, TreeItem::Header(_)) {
            return Err(ModelError::HeaderBelowRoot(parent));
        }

        emit(ModelEvent::RowsAboutToBeInserted {
            parent,
            first: row,
            last: row,
        });
        let node = TreeNode::new(parent, parent_depth + 1, item);
        let id = node.id;
        self.nodes.insert(id, node);
        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            parent_node.children.insert(row, id);
        }
        tracing::trace!(target: targets::TREE, %parent, row, node = %id, "inserted row");
        emit(ModelEvent::RowsInserted {
            parent,
            first: row,
            last: row,
        });
        Ok(id)
    }

    /// Re-insert a detached subtree under `parent` at `row`.
    ///
    /// Every node gets a fresh id. Returns the mapping from old to new ids.
    pub fn insert_subtree(
        &mut self,
        parent: NodeId,
        row: usize,
        subtree: DetachedSubtree,
        emit: &mut impl FnMut(ModelEvent),
    ) -> Result<HashMap<NodeId, NodeId>> {
        let parent_depth = self.check_insert(parent, row)?;
        if subtree.nodes.values().any(|n| matches!(n.item, TreeItem::Header(_))) {
            return Err(ModelError::HeaderBelowRoot(parent));
        }
        let DetachedSubtree { root, mut nodes } = subtree;

        emit(ModelEvent::RowsAboutToBeInserted {
            parent,
            first: row,
            last: row,
        });

        let mut mapping = HashMap::with_capacity(nodes.len());
        let mut stack = vec![(root, parent, parent_depth + 1)];
        while let Some((old_id, new_parent, depth)) = stack.pop() {
            let Some(old) = nodes.remove(&old_id) else {
                continue;
            };
            let mut node = TreeNode::new(new_parent, depth, old.item);
            let new_id = node.id;
            node.children.reserve(old.children.len());
            self.nodes.insert(new_id, node);
            mapping.insert(old_id, new_id);

            if let Some(parent_node) = self.nodes.get_mut(&new_parent) {
                if old_id == root {
                    parent_node.children.insert(row, new_id);
                } else {
                    parent_node.children.push(new_id);
                }
            }
            stack.extend(old.children.iter().rev().map(|&child| (child, new_id, depth + 1)));
        }

        tracing::debug!(target: targets::TREE, %parent, row, nodes = mapping.len(), "re-inserted subtree");
        emit(ModelEvent::RowsInserted {
            parent,
            first: row,
            last: row,
        });
        Ok(mapping)
    }

    /// Validates an insertion point and returns the parent's depth.
    fn check_insert(&self, parent: NodeId, row: usize) -> Result<usize> {
        let parent_node = self
            .nodes
            .get(&parent)
            .filter(|n| n.attached)
            .ok_or(ModelError::InvalidParent(parent))?;
        let row_count = parent_node.children.len();
        if row > row_count {
            return Err(ModelError::row_out_of_range(parent, row, row_count));
        }
        Ok(parent_node.depth)
    }

    // -------------------------------------------------------------------------
    // Reparenting
    // -------------------------------------------------------------------------

    /// Make `node` the last child of `new_parent`.
    ///
    /// Returns `false` without changing anything if either id is unknown,
    /// `node` is the root, or `new_parent` is `node` or one of its
    /// descendants. Emits the removal pair, then the insertion pair.
    pub fn change_parent(
        &mut self,
        node: NodeId,
        new_parent: NodeId,
        emit: &mut impl FnMut(ModelEvent),
    ) -> bool {
        if !self.can_reparent(node, new_parent) {
            return false;
        }
        let (Some(old_parent), Some(old_row)) = (self.parent_of(node), self.row_of(node)) else {
            return false;
        };

        emit(ModelEvent::RowsAboutToBeRemoved {
            parent: old_parent,
            first: old_row,
            last: old_row,
            ids: self.subtree_ids(node),
        });
        if let Some(parent_node) = self.nodes.get_mut(&old_parent) {
            parent_node.children.remove(old_row);
        }
        emit(ModelEvent::RowsRemoved {
            parent: old_parent,
            first: old_row,
            last: old_row,
        });

        let new_row = self.row_count(new_parent);
        emit(ModelEvent::RowsAboutToBeInserted {
            parent: new_parent,
            first: new_row,
            last: new_row,
        });
        let new_depth = self.depth(new_parent).unwrap_or(0) + 1;
        if let Some(parent_node) = self.nodes.get_mut(&new_parent) {
            parent_node.children.push(node);
        }
        if let Some(moved) = self.nodes.get_mut(&node) {
            moved.parent = new_parent;
        }
        self.set_depths(node, new_depth);
        tracing::debug!(target: targets::TREE, %node, from = %old_parent, to = %new_parent, "changed parent");
        emit(ModelEvent::RowsInserted {
            parent: new_parent,
            first: new_row,
            last: new_row,
        });
        true
    }

    /// Move `node` under `dest_parent` so it lands before the row currently
    /// at `dest_row`.
    ///
    /// Same-parent moves are allowed. Returns `false` without changing
    /// anything when [`change_parent`](Self::change_parent) would, when
    /// `dest_row` is past the end, or when the move would leave the node
    /// where it is.
    pub fn move_item(
        &mut self,
        node: NodeId,
        dest_parent: NodeId,
        dest_row: usize,
        emit: &mut impl FnMut(ModelEvent),
    ) -> bool {
        if !self.can_reparent(node, dest_parent) || dest_row > self.row_count(dest_parent) {
            return false;
        }
        let (Some(source_parent), Some(row)) = (self.parent_of(node), self.row_of(node)) else {
            return false;
        };
        let same_parent = source_parent == dest_parent;
        if same_parent && (dest_row == row || dest_row == row + 1) {
            return false;
        }

        emit(ModelEvent::RowsAboutToBeMoved {
            source_parent,
            first: row,
            last: row,
            dest_parent,
            dest_row,
        });
        if let Some(parent_node) = self.nodes.get_mut(&source_parent) {
            parent_node.children.remove(row);
        }
        let insert_at = if same_parent && dest_row > row { dest_row - 1 } else { dest_row };
        let new_depth = self.depth(dest_parent).unwrap_or(0) + 1;
        if let Some(parent_node) = self.nodes.get_mut(&dest_parent) {
            parent_node.children.insert(insert_at, node);
        }
        if let Some(moved) = self.nodes.get_mut(&node) {
            moved.parent = dest_parent;
        }
        self.set_depths(node, new_depth);
        tracing::debug!(target: targets::TREE, %node, to = %dest_parent, row = insert_at, "moved row");
        emit(ModelEvent::RowsMoved {
            source_parent,
            first: row,
            last: row,
            dest_parent,
            dest_row,
        });
        true
    }

    fn can_reparent(&self, node: NodeId, new_parent: NodeId) -> bool {
        if node.is_null() || new_parent.is_null() || node == self.root {
            return false;
        }
        if !self.contains(node) || !self.nodes.get(&new_parent).is_some_and(|n| n.attached) {
            return false;
        }
        if self.is_ancestor_or_self(node, new_parent) {
            tracing::debug!(target: targets::TREE, %node, %new_parent, "refusing to create a cycle");
            return false;
        }
        true
    }

    // -------------------------------------------------------------------------
    // Removal
    // -------------------------------------------------------------------------

    /// Remove `node` and its descendants. Returns `false` for unknown ids and
    /// the root.
    pub fn delete_subtree(&mut self, node: NodeId, emit: &mut impl FnMut(ModelEvent)) -> bool {
        self.take_subtree(node, emit).is_some()
    }

    /// Remove `node` if it is a child of `parent`.
    pub fn remove_child(
        &mut self,
        parent: NodeId,
        node: NodeId,
        emit: &mut impl FnMut(ModelEvent),
    ) -> bool {
        if self.parent_of(node) != Some(parent) {
            return false;
        }
        self.delete_subtree(node, emit)
    }

    /// Remove `node` and its descendants and hand them back.
    pub fn take_subtree(
        &mut self,
        node: NodeId,
        emit: &mut impl FnMut(ModelEvent),
    ) -> Option<DetachedSubtree> {
        let plan = self.plan_removal(node)?;
        emit(plan.announcement());
        self.detach(&plan, emit)
    }

    /// Work out what removing `node` involves, without removing it.
    pub(crate) fn plan_removal(&self, node: NodeId) -> Option<RemovalPlan> {
        let parent = self.parent_of(node)?;
        let row = self.row_of(node)?;
        Some(RemovalPlan {
            node,
            parent,
            row,
            ids: self.subtree_ids(node),
        })
    }

    /// Carry out a removal announced earlier. Fails if the node moved since
    /// the plan was made. Emits only the "done" event.
    pub(crate) fn detach(
        &mut self,
        plan: &RemovalPlan,
        emit: &mut impl FnMut(ModelEvent),
    ) -> Option<DetachedSubtree> {
        if self.parent_of(plan.node) != Some(plan.parent)
            || self.row_of(plan.node) != Some(plan.row)
        {
            tracing::warn!(target: targets::TREE, node = %plan.node, "subtree changed before it could be removed");
            return None;
        }

        if let Some(parent_node) = self.nodes.get_mut(&plan.parent) {
            parent_node.children.remove(plan.row);
        }
        let mut nodes = HashMap::with_capacity(plan.ids.len());
        for id in self.subtree_ids(plan.node) {
            if let Some(mut removed) = self.nodes.remove(&id) {
                removed.attached = false;
                nodes.insert(id, removed);
            }
        }
        tracing::debug!(target: targets::TREE, node = %plan.node, removed = nodes.len(), "removed subtree");
        emit(ModelEvent::RowsRemoved {
            parent: plan.parent,
            first: plan.row,
            last: plan.row,
        });
        Some(DetachedSubtree {
            root: plan.node,
            nodes,
        })
    }

    /// Remove every node except the root.
    pub fn clear(&mut self, emit: &mut impl FnMut(ModelEvent)) {
        emit(ModelEvent::ModelAboutToReset);
        let root = self.root;
        self.nodes.retain(|&id, _| id == root);
        if let Some(root_node) = self.nodes.get_mut(&root) {
            root_node.children.clear();
        }
        tracing::debug!(target: targets::TREE, "tree cleared");
        emit(ModelEvent::ModelReset);
    }

    // -------------------------------------------------------------------------
    // Data and columns
    // -------------------------------------------------------------------------

    /// Set one cell. Returns `false` if the node is unknown or the cell is
    /// not editable.
    pub fn set_data(
        &mut self,
        id: NodeId,
        column: usize,
        value: Variant,
        emit: &mut impl FnMut(ModelEvent),
    ) -> bool {
        let Some(node) = self.nodes.get_mut(&id) else {
            return false;
        };
        if !node.item.set_data(column, value) {
            return false;
        }
        emit(ModelEvent::DataChanged {
            node: id,
            first_column: column,
            last_column: column,
        });
        true
    }

    /// Rename header `section`.
    pub fn set_header_data(
        &mut self,
        section: usize,
        name: impl Into<String>,
        emit: &mut impl FnMut(ModelEvent),
    ) -> bool {
        let root = self.root;
        let Some(spec) = self
            .nodes
            .get_mut(&root)
            .and_then(|n| n.item.columns_mut())
            .and_then(|columns| columns.get_mut(section))
        else {
            return false;
        };
        spec.display_name = name.into();
        emit(ModelEvent::HeaderDataChanged {
            first: section,
            last: section,
        });
        true
    }

    /// Insert `count` unnamed columns at `position`.
    ///
    /// Generic nodes get empty values in the new columns.
    pub fn insert_columns(
        &mut self,
        position: usize,
        count: usize,
        emit: &mut impl FnMut(ModelEvent),
    ) -> bool {
        let column_count = self.columns().len();
        if count == 0 || position > column_count {
            return false;
        }
        let last = position + count - 1;

        emit(ModelEvent::ColumnsAboutToBeInserted { first: position, last });
        let root = self.root;
        for node in self.nodes.values_mut() {
            if node.id == root {
                if let Some(columns) = node.item.columns_mut() {
                    let added = std::iter::repeat_n(ColumnSpec::default(), count);
                    columns.splice(position..position, added);
                }
            } else {
                node.item.insert_columns(position, count);
            }
        }
        emit(ModelEvent::ColumnsInserted { first: position, last });
        emit(ModelEvent::HeaderDataChanged {
            first: position,
            last: column_count + count - 1,
        });
        true
    }

    /// Remove columns `position..position + count`.
    pub fn remove_columns(
        &mut self,
        position: usize,
        count: usize,
        emit: &mut impl FnMut(ModelEvent),
    ) -> bool {
        let column_count = self.columns().len();
        if count == 0 || position + count > column_count {
            return false;
        }
        let last = position + count - 1;

        emit(ModelEvent::ColumnsAboutToBeRemoved { first: position, last });
        let root = self.root;
        for node in self.nodes.values_mut() {
            if node.id == root {
                if let Some(columns) = node.item.columns_mut() {
                    columns.drain(position..position + count);
                }
            } else {
                node.item.remove_columns(position, count);
            }
        }
        emit(ModelEvent::ColumnsRemoved { first: position, last });
        if position < column_count - count {
            emit(ModelEvent::HeaderDataChanged {
                first: position,
                last: column_count - count - 1,
            });
        }
        true
    }

    // -------------------------------------------------------------------------
    // Validation
    // -------------------------------------------------------------------------

    /// Walk the tree breadth-first from the root and check every structural
    /// invariant.
    pub fn check_consistency(&self) -> std::result::Result<(), ConsistencyError> {
        let root = self
            .nodes
            .get(&self.root)
            .filter(|n| n.parent.is_null())
            .ok_or(ConsistencyError::BadRoot(self.root))?;
        if root.depth != 0 {
            return Err(ConsistencyError::BadDepth {
                node: self.root,
                expected: 0,
                actual: root.depth,
            });
        }

        let mut seen = HashSet::with_capacity(self.nodes.len());
        let mut queue = VecDeque::new();
        seen.insert(self.root);
        queue.push_back(self.root);

        while let Some(id) = queue.pop_front() {
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            if !node.attached {
                return Err(ConsistencyError::Detached(id));
            }
            for &child_id in &node.children {
                let child = self.nodes.get(&child_id).ok_or(ConsistencyError::Unregistered {
                    parent: id,
                    child: child_id,
                })?;
                if !seen.insert(child_id) {
                    return Err(ConsistencyError::Duplicate(child_id));
                }
                if child.parent != id {
                    return Err(ConsistencyError::ParentMismatch {
                        child: child_id,
                        parent: id,
                        actual: child.parent,
                    });
                }
                if child.depth != node.depth + 1 {
                    return Err(ConsistencyError::BadDepth {
                        node: child_id,
                        expected: node.depth + 1,
                        actual: child.depth,
                    });
                }
                queue.push_back(child_id);
            }
        }

        if seen.len() != self.nodes.len() {
            return Err(ConsistencyError::Unreachable(self.nodes.len() - seen.len()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ignore(_: ModelEvent) {}

    fn storage() -> TreeStorage {
        TreeStorage::new(TreeModelConfig::with_column_names(["A", "B"]))
    }

    fn row(a: &str, b: i64) -> Vec<Variant> {
        vec![Variant::from(a), Variant::from(b)]
    }

    #[test]
    fn test_new_has_root() {
        let s = storage();
        assert_eq!(s.node_count(), 1);
        assert_eq!(s.depth(s.root()), Some(0));
        assert_eq!(s.header_data(1), Variant::from("B"));
        assert_eq!(s.header_data(2), Variant::Null);
        assert!(s.check_consistency().is_ok());
    }

    #[test]
    fn test_append_emits_pair() {
        let mut s = storage();
        let mut events = Vec::new();
        let root = s.root();
        let a = s.append_child(root, row("a", 1), &mut |e| events.push(e)).unwrap();
        assert_eq!(
            events,
            vec![
                ModelEvent::RowsAboutToBeInserted { parent: root, first: 0, last: 0 },
                ModelEvent::RowsInserted { parent: root, first: 0, last: 0 },
            ]
        );
        assert_eq!(s.depth(a), Some(1));
        assert_eq!(s.data(a, 0), Variant::from("a"));
    }

    #[test]
    fn test_append_to_unknown_parent_fails() {
        let mut s = storage();
        let err = s.append_child(NodeId::next(), row("x", 0), &mut ignore).unwrap_err();
        assert!(matches!(err, ModelError::InvalidParent(_)));
        assert_eq!(s.node_count(), 1);
    }

    #[test]
    fn test_insert_item_row_bounds() {
        let mut s = storage();
        let root = s.root();
        let first = s.append_child(root, row("a", 1), &mut ignore).unwrap();
        let front = s.insert_item(root, 0, TreeItem::Generic(row("b", 2)), &mut ignore).unwrap();
        assert_eq!(s.children(root), &[front, first]);

        let err = s.insert_item(root, 5, TreeItem::Generic(vec![]), &mut ignore).unwrap_err();
        assert_eq!(err, ModelError::row_out_of_range(root, 5, 2));
    }

    #[test]
    fn test_header_items_only_at_root() {
        let mut s = storage();
        let root = s.root();
        let mut events = Vec::new();

        let err = s
            .append_item(root, TreeItem::Header(vec![]), &mut |e| events.push(e))
            .unwrap_err();
        assert_eq!(err, ModelError::HeaderBelowRoot(root));
        assert!(events.is_empty());
        assert_eq!(s.row_count(root), 0);

        let a = s.append_child(root, row("a", 1), &mut ignore).unwrap();
        let err = s.insert_item(a, 0, TreeItem::Header(vec![]), &mut ignore).unwrap_err();
        assert_eq!(err, ModelError::HeaderBelowRoot(a));
        assert!(s.check_consistency().is_ok());
    }

    #[test]
    fn test_change_parent_rejects_cycles() {
        let mut s = storage();
        let root = s.root();
        let a = s.append_child(root, row("a", 1), &mut ignore).unwrap();
        let b = s.append_child(a, row("b", 2), &mut ignore).unwrap();

        let mut events = Vec::new();
        assert!(!s.change_parent(a, b, &mut |e| events.push(e)));
        assert!(!s.change_parent(a, a, &mut |e| events.push(e)));
        assert!(!s.change_parent(root, a, &mut |e| events.push(e)));
        assert!(!s.change_parent(a, NodeId::NULL, &mut |e| events.push(e)));
        assert!(events.is_empty());
        assert!(s.check_consistency().is_ok());
    }

    #[test]
    fn test_move_item_within_parent() {
        let mut s = storage();
        let root = s.root();
        let ids: Vec<_> = (0..4)
            .map(|i| s.append_child(root, row("n", i), &mut ignore).unwrap())
            .collect();

        // No-op destinations.
        assert!(!s.move_item(ids[1], root, 1, &mut ignore));
        assert!(!s.move_item(ids[1], root, 2, &mut ignore));

        assert!(s.move_item(ids[0], root, 3, &mut ignore));
        assert_eq!(s.children(root), &[ids[1], ids[2], ids[0], ids[3]]);

        assert!(s.move_item(ids[3], root, 0, &mut ignore));
        assert_eq!(s.children(root), &[ids[3], ids[1], ids[2], ids[0]]);
        assert!(s.check_consistency().is_ok());
    }

    #[test]
    fn test_take_and_reinsert_subtree() {
        let mut s = storage();
        let root = s.root();
        let a = s.append_child(root, row("a", 1), &mut ignore).unwrap();
        let b = s.append_child(a, row("b", 2), &mut ignore).unwrap();
        let c = s.append_child(b, row("c", 3), &mut ignore).unwrap();

        let mut events = Vec::new();
        let taken = s.take_subtree(a, &mut |e| events.push(e)).unwrap();
        assert_eq!(taken.len(), 3);
        assert!(!taken.get(c).unwrap().is_attached());
        assert_eq!(
            events[0],
            ModelEvent::RowsAboutToBeRemoved { parent: root, first: 0, last: 0, ids: vec![a, b, c] }
        );
        assert!(s.get_by_id(b).is_none());

        let mapping = s.insert_subtree(root, 0, taken, &mut ignore).unwrap();
        let new_c = mapping[&c];
        assert_ne!(new_c, c);
        assert_eq!(s.depth(new_c), Some(3));
        assert_eq!(s.data(new_c, 0), Variant::from("c"));
        assert!(s.check_consistency().is_ok());
    }

    #[test]
    fn test_root_cannot_be_removed() {
        let mut s = storage();
        let root = s.root();
        assert!(!s.delete_subtree(root, &mut ignore));
        assert!(!s.remove_child(NodeId::NULL, root, &mut ignore));
    }

    #[test]
    fn test_columns_adjust_generic_nodes() {
        let mut s = storage();
        let root = s.root();
        let a = s.append_child(root, row("a", 1), &mut ignore).unwrap();

        let mut events = Vec::new();
        assert!(s.insert_columns(1, 2, &mut |e| events.push(e)));
        assert_eq!(s.columns().len(), 4);
        assert_eq!(s.column_count(a), 4);
        assert_eq!(s.data(a, 3), Variant::from(1));
        assert_eq!(events.last(), Some(&ModelEvent::HeaderDataChanged { first: 1, last: 3 }));

        assert!(s.remove_columns(0, 3, &mut ignore));
        assert_eq!(s.header_data(0), Variant::from("B"));
        assert_eq!(s.data(a, 0), Variant::from(1));
        assert!(!s.remove_columns(0, 5, &mut ignore));
    }

    #[test]
    fn test_consistency_detects_bad_parent_link() {
        let mut s = storage();
        let root = s.root();
        let a = s.append_child(root, row("a", 1), &mut ignore).unwrap();
        let b = s.append_child(root, row("b", 2), &mut ignore).unwrap();
        s.nodes.get_mut(&b).unwrap().parent = a;
        assert_eq!(
            s.check_consistency(),
            Err(ConsistencyError::ParentMismatch { child: b, parent: root, actual: a })
        );
    }

    #[test]
    fn test_consistency_detects_bad_depth_and_orphans() {
        let mut s = storage();
        let root = s.root();
        let a = s.append_child(root, row("a", 1), &mut ignore).unwrap();
        s.nodes.get_mut(&a).unwrap().depth = 7;
        assert!(matches!(s.check_consistency(), Err(ConsistencyError::BadDepth { actual: 7, .. })));

        s.nodes.get_mut(&a).unwrap().depth = 1;
        s.nodes.get_mut(&root).unwrap().children.clear();
        assert_eq!(s.check_consistency(), Err(ConsistencyError::Unreachable(1)));
    }

    #[test]
    fn test_consistency_detects_duplicates_and_unregistered() {
        let mut s = storage();
        let root = s.root();
        let a = s.append_child(root, row("a", 1), &mut ignore).unwrap();
        s.nodes.get_mut(&root).unwrap().children.push(a);
        assert_eq!(s.check_consistency(), Err(ConsistencyError::Duplicate(a)));

        s.nodes.get_mut(&root).unwrap().children.pop();
        let ghost = NodeId::next();
        s.nodes.get_mut(&a).unwrap().children.push(ghost);
        assert_eq!(
            s.check_consistency(),
            Err(ConsistencyError::Unregistered { parent: a, child: ghost })
        );
    }

    #[test]
    fn test_consistency_detects_detached_node() {
        let mut s = storage();
        let root = s.root();
        let a = s.append_child(root, row("a", 1), &mut ignore).unwrap();
        s.nodes.get_mut(&a).unwrap().attached = false;
        assert_eq!(s.check_consistency(), Err(ConsistencyError::Detached(a)));
    }

    #[test]
    fn test_clear_keeps_root() {
        let mut s = storage();
        let root = s.root();
        let a = s.append_child(root, row("a", 1), &mut ignore).unwrap();
        s.append_child(a, row("b", 2), &mut ignore).unwrap();

        let mut events = Vec::new();
        s.clear(&mut |e| events.push(e));
        assert_eq!(events, vec![ModelEvent::ModelAboutToReset, ModelEvent::ModelReset]);
        assert_eq!(s.node_count(), 1);
        assert_eq!(s.row_count(root), 0);
        assert!(s.get_by_id(a).is_none());
    }
}
