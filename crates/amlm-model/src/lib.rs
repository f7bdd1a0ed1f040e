//! Hierarchical tree model for the AMLM media library manager.
//!
//! Rows live in an arena keyed by stable [`NodeId`]s, so observers can hold
//! on to a row across inserts, moves and removals. Two flavours share the
//! same [`TreeStorage`]:
//!
//! - [`TreeModel`]: owned by one thread, signals fire synchronously
//! - [`ThreadsafeTreeModel`]: a cloneable handle behind a read/write lock,
//!   signals fire with the lock released, edits can be made undoable
//!
//! Node payloads are a closed set of kinds ([`TreeItem`]); a tree serializes
//! to a [`Variant`] document tagged by kind (see [`document`]).
//!
//! # Example
//!
//! ```
//! use amlm_model::{ThreadsafeTreeModel, TreeModelConfig, Variant};
//!
//! let model = ThreadsafeTreeModel::new(TreeModelConfig::with_column_names(["Name", "Size"]));
//! let root = model.root();
//!
//! model.signals().rows_inserted.connect(|(parent, first, last)| {
//!     println!("rows {first}..={last} inserted under {parent}");
//! });
//!
//! let dir = model.append_child(root, vec![Variant::from("Albums"), Variant::from(2)]).unwrap();
//! let worker = model.clone();
//! std::thread::spawn(move || {
//!     worker.append_child(dir, vec![Variant::from("Disc 1"), Variant::from(12)]).unwrap();
//! })
//! .join()
//! .unwrap();
//!
//! assert_eq!(model.row_count(dir), 1);
//! assert!(model.check_consistency().is_ok());
//! ```

mod column;
pub mod debug;
pub mod document;
mod error;
mod id;
mod item;
mod signals;
mod storage;
mod threadsafe;
mod tree;
pub mod undo;
mod variant;

pub use column::{ColumnSpec, TreeModelConfig};
pub use error::{ConsistencyError, DocumentError, ModelError, Result};
pub use id::{NodeId, create_id, is_null};
pub use item::{DirProps, LibraryEntry, ScanResult, TreeItem, UNPOPULATED_PLACEHOLDER};
pub use signals::ModelSignals;
pub use storage::{DetachedSubtree, ModelEvent, TreeNode, TreeStorage};
pub use threadsafe::{ThreadsafeTreeModel, WriteContext};
pub use tree::TreeModel;
pub use undo::{UndoFn, UndoStack, noop, update_undo_redo};
pub use variant::{Variant, VariantMap};
