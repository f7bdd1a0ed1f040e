//! Observer signals of a tree model.

use amlm_core::Signal;

use crate::id::NodeId;
use crate::storage::ModelEvent;

/// Collection of signals emitted by tree models.
///
/// Views connect to these signals to stay synchronized with the model.
/// Rows are addressed by the parent's [`NodeId`] and a row range, so an
/// observer can resolve them through the model while they are still there.
///
/// # Signal Usage
///
/// - **Before modifications**: `rows_about_to_be_*`, `columns_about_to_be_*`
/// - **After modifications**: `rows_*`, `columns_*`
/// - **Data changes**: `data_changed`, `header_data_changed`
/// - **Clearing**: `model_about_to_reset` then `model_reset`
pub struct ModelSignals {
    // -------------------------------------------------------------------------
    // Row modification signals
    // -------------------------------------------------------------------------
    /// Emitted just before rows are inserted.
    /// Args: (parent, first row, last row)
    pub rows_about_to_be_inserted: Signal<(NodeId, usize, usize)>,

    /// Emitted after rows have been inserted.
    /// Args: (parent, first row, last row)
    pub rows_inserted: Signal<(NodeId, usize, usize)>,

    /// Emitted just before rows are removed.
    /// Args: (parent, first row, last row, every removed id in preorder)
    pub rows_about_to_be_removed: Signal<(NodeId, usize, usize, Vec<NodeId>)>,

    /// Emitted after rows have been removed.
    /// Args: (parent, first row, last row)
    pub rows_removed: Signal<(NodeId, usize, usize)>,

    /// Emitted just before rows are moved.
    /// Args: (source parent, source first, source last, dest parent, dest row)
    pub rows_about_to_be_moved: Signal<(NodeId, usize, usize, NodeId, usize)>,

    /// Emitted after rows have been moved.
    /// Args: (source parent, source first, source last, dest parent, dest row)
    pub rows_moved: Signal<(NodeId, usize, usize, NodeId, usize)>,

    // -------------------------------------------------------------------------
    // Column modification signals
    // -------------------------------------------------------------------------
    /// Emitted just before columns are inserted.
    pub columns_about_to_be_inserted: Signal<(usize, usize)>,

    /// Emitted after columns have been inserted.
    pub columns_inserted: Signal<(usize, usize)>,

    /// Emitted just before columns are removed.
    pub columns_about_to_be_removed: Signal<(usize, usize)>,

    /// Emitted after columns have been removed.
    pub columns_removed: Signal<(usize, usize)>,

    // -------------------------------------------------------------------------
    // Data change signals
    // -------------------------------------------------------------------------
    /// Emitted when cells of a node change.
    /// Args: (node, first column, last column)
    pub data_changed: Signal<(NodeId, usize, usize)>,

    /// Emitted when header data changes.
    /// Args: (first section, last section)
    pub header_data_changed: Signal<(usize, usize)>,

    // -------------------------------------------------------------------------
    // Reset signals
    // -------------------------------------------------------------------------
    /// Emitted before the model is reset.
    pub model_about_to_reset: Signal<()>,

    /// Emitted after the model has been reset.
    pub model_reset: Signal<()>,
}

impl Default for ModelSignals {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelSignals {
    /// Creates a new set of model signals.
    pub fn new() -> Self {
        Self {
            rows_about_to_be_inserted: Signal::new(),
            rows_inserted: Signal::new(),
            rows_about_to_be_removed: Signal::new(),
            rows_removed: Signal::new(),
            rows_about_to_be_moved: Signal::new(),
            rows_moved: Signal::new(),
            columns_about_to_be_inserted: Signal::new(),
            columns_inserted: Signal::new(),
            columns_about_to_be_removed: Signal::new(),
            columns_removed: Signal::new(),
            data_changed: Signal::new(),
            header_data_changed: Signal::new(),
            model_about_to_reset: Signal::new(),
            model_reset: Signal::new(),
        }
    }

    /// Emit the signal matching `event`.
    pub fn dispatch(&self, event: ModelEvent) {
        match event {
            ModelEvent::RowsAboutToBeInserted { parent, first, last } => {
                self.rows_about_to_be_inserted.emit((parent, first, last))
            }
            ModelEvent::RowsInserted { parent, first, last } => {
                self.rows_inserted.emit((parent, first, last))
            }
            ModelEvent::RowsAboutToBeRemoved {
                parent,
                first,
                last,
                ids,
            } => self.rows_about_to_be_removed.emit((parent, first, last, ids)),
            ModelEvent::RowsRemoved { parent, first, last } => {
                self.rows_removed.emit((parent, first, last))
            }
            ModelEvent::RowsAboutToBeMoved {
                source_parent,
                first,
                last,
                dest_parent,
                dest_row,
            } => self
                .rows_about_to_be_moved
                .emit((source_parent, first, last, dest_parent, dest_row)),
            ModelEvent::RowsMoved {
                source_parent,
                first,
                last,
                dest_parent,
                dest_row,
            } => self.rows_moved.emit((source_parent, first, last, dest_parent, dest_row)),
            ModelEvent::ColumnsAboutToBeInserted { first, last } => {
                self.columns_about_to_be_inserted.emit((first, last))
            }
            ModelEvent::ColumnsInserted { first, last } => {
                self.columns_inserted.emit((first, last))
            }
            ModelEvent::ColumnsAboutToBeRemoved { first, last } => {
                self.columns_about_to_be_removed.emit((first, last))
            }
            ModelEvent::ColumnsRemoved { first, last } => self.columns_removed.emit((first, last)),
            ModelEvent::DataChanged {
                node,
                first_column,
                last_column,
            } => self.data_changed.emit((node, first_column, last_column)),
            ModelEvent::HeaderDataChanged { first, last } => {
                self.header_data_changed.emit((first, last))
            }
            ModelEvent::ModelAboutToReset => self.model_about_to_reset.emit(()),
            ModelEvent::ModelReset => self.model_reset.emit(()),
        }
    }

    /// Emit every event in order.
    pub fn dispatch_all(&self, events: impl IntoIterator<Item = ModelEvent>) {
        for event in events {
            self.dispatch(event);
        }
    }
}

impl std::fmt::Debug for ModelSignals {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelSignals")
            .field("rows_inserted", &self.rows_inserted)
            .field("rows_removed", &self.rows_removed)
            .field("data_changed", &self.data_changed)
            .finish_non_exhaustive()
    }
}

static_assertions::assert_impl_all!(ModelSignals: Send, Sync);
