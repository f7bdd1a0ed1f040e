//! Single-threaded tree model.
//!
//! [`TreeModel`] owns its [`TreeStorage`] outright. Mutations take
//! `&mut self` and emit their signals synchronously, in order, while the
//! mutation runs.

use crate::column::TreeModelConfig;
use crate::error::{ConsistencyError, Result};
use crate::id::NodeId;
use crate::item::TreeItem;
use crate::signals::ModelSignals;
use crate::storage::{DetachedSubtree, TreeNode, TreeStorage};
use crate::variant::Variant;

/// A hierarchical model owned by one thread at a time.
///
/// # Example
///
/// ```
/// use amlm_model::{TreeModel, TreeModelConfig, Variant};
///
/// let mut model = TreeModel::new(TreeModelConfig::with_column_names(["Title"]));
/// let root = model.root();
/// let album = model.append_child(root, vec![Variant::from("Album")]).unwrap();
/// let track = model.append_child(album, vec![Variant::from("Track 1")]).unwrap();
///
/// assert_eq!(model.depth(track), Some(2));
/// assert!(model.delete_subtree(album));
/// assert!(model.get_by_id(track).is_none());
/// ```
#[derive(Debug, Default)]
pub struct TreeModel {
    storage: TreeStorage,
    signals: ModelSignals,
}

impl TreeModel {
    /// A model with just a root holding the configured columns.
    pub fn new(config: TreeModelConfig) -> Self {
        Self::from_storage(TreeStorage::new(config))
    }

    /// Wrap existing storage.
    pub fn from_storage(storage: TreeStorage) -> Self {
        Self {
            storage,
            signals: ModelSignals::new(),
        }
    }

    /// Read a model from a document. See [`crate::document`].
    pub fn from_document(document: &Variant) -> Result<Self> {
        TreeStorage::from_document(document).map(Self::from_storage)
    }

    /// The model's signals.
    pub fn signals(&self) -> &ModelSignals {
        &self.signals
    }

    /// Read access to the underlying storage.
    pub fn storage(&self) -> &TreeStorage {
        &self.storage
    }

    /// Give up the model, keeping its nodes.
    pub fn into_storage(self) -> TreeStorage {
        self.storage
    }

    pub fn root(&self) -> NodeId {
        self.storage.root()
    }

    pub fn get_by_id(&self, id: NodeId) -> Option<&TreeNode> {
        self.storage.get_by_id(id)
    }

    pub fn row_count(&self, id: NodeId) -> usize {
        self.storage.row_count(id)
    }

    pub fn column_count(&self, id: NodeId) -> usize {
        self.storage.column_count(id)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.storage.children(id)
    }

    pub fn child_at(&self, parent: NodeId, row: usize) -> Option<NodeId> {
        self.storage.child_at(parent, row)
    }

    pub fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        self.storage.parent_of(id)
    }

    pub fn row_of(&self, id: NodeId) -> Option<usize> {
        self.storage.row_of(id)
    }

    pub fn depth(&self, id: NodeId) -> Option<usize> {
        self.storage.depth(id)
    }

    pub fn data(&self, id: NodeId, column: usize) -> Variant {
        self.storage.data(id, column)
    }

    pub fn header_data(&self, section: usize) -> Variant {
        self.storage.header_data(section)
    }

    pub fn to_document(&self) -> Variant {
        self.storage.to_document()
    }

    pub fn check_consistency(&self) -> std::result::Result<(), ConsistencyError> {
        self.storage.check_consistency()
    }

    // -------------------------------------------------------------------------
    // Mutations
    // -------------------------------------------------------------------------

    pub fn append_child(&mut self, parent: NodeId, values: Vec<Variant>) -> Result<NodeId> {
        let signals = &self.signals;
        self.storage.append_child(parent, values, &mut |e| signals.dispatch(e))
    }

    pub fn append_item(&mut self, parent: NodeId, item: TreeItem) -> Result<NodeId> {
        let signals = &self.signals;
        self.storage.append_item(parent, item, &mut |e| signals.dispatch(e))
    }

    pub fn insert_item(&mut self, parent: NodeId, row: usize, item: TreeItem) -> Result<NodeId> {
        let signals = &self.signals;
        self.storage.insert_item(parent, row, item, &mut |e| signals.dispatch(e))
    }

    pub fn change_parent(&mut self, node: NodeId, new_parent: NodeId) -> bool {
        let signals = &self.signals;
        self.storage.change_parent(node, new_parent, &mut |e| signals.dispatch(e))
    }

    pub fn move_item(&mut self, node: NodeId, dest_parent: NodeId, dest_row: usize) -> bool {
        let signals = &self.signals;
        self.storage.move_item(node, dest_parent, dest_row, &mut |e| signals.dispatch(e))
    }

    pub fn delete_subtree(&mut self, node: NodeId) -> bool {
        let signals = &self.signals;
        self.storage.delete_subtree(node, &mut |e| signals.dispatch(e))
    }

    pub fn remove_child(&mut self, parent: NodeId, node: NodeId) -> bool {
        let signals = &self.signals;
        self.storage.remove_child(parent, node, &mut |e| signals.dispatch(e))
    }

    pub fn take_subtree(&mut self, node: NodeId) -> Option<DetachedSubtree> {
        let signals = &self.signals;
        self.storage.take_subtree(node, &mut |e| signals.dispatch(e))
    }

    pub fn set_data(&mut self, id: NodeId, column: usize, value: Variant) -> bool {
        let signals = &self.signals;
        self.storage.set_data(id, column, value, &mut |e| signals.dispatch(e))
    }

    pub fn set_header_data(&mut self, section: usize, name: impl Into<String>) -> bool {
        let signals = &self.signals;
        self.storage.set_header_data(section, name, &mut |e| signals.dispatch(e))
    }

    pub fn insert_columns(&mut self, position: usize, count: usize) -> bool {
        let signals = &self.signals;
        self.storage.insert_columns(position, count, &mut |e| signals.dispatch(e))
    }

    pub fn remove_columns(&mut self, position: usize, count: usize) -> bool {
        let signals = &self.signals;
        self.storage.remove_columns(position, count, &mut |e| signals.dispatch(e))
    }

    pub fn clear(&mut self) {
        let signals = &self.signals;
        self.storage.clear(&mut |e| signals.dispatch(e))
    }
}
