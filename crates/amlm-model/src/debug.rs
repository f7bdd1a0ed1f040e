//! Tree dumps for debugging.
//!
//! ```
//! use amlm_model::{TreeModel, TreeModelConfig, Variant};
//! use amlm_model::debug::{TreeDebug, TreeFormatOptions};
//!
//! let mut model = TreeModel::new(TreeModelConfig::with_column_names(["Title"]));
//! let album = model.append_child(model.root(), vec![Variant::from("Album")]).unwrap();
//! model.append_child(album, vec![Variant::from("Track")]).unwrap();
//!
//! let dump = TreeDebug::with_options(TreeFormatOptions::minimal()).format(model.storage());
//! assert_eq!(dump, "[Title]\n\u{2514}\u{2500}\u{2500} Album\n   \u{2514}\u{2500}\u{2500} Track\n");
//! ```

use std::fmt;

use amlm_core::logging::targets;

use crate::id::NodeId;
use crate::storage::TreeStorage;

/// Style of tree visualization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TreeStyle {
    /// ASCII characters for tree branches.
    Ascii,
    /// Unicode box-drawing characters.
    #[default]
    Unicode,
    /// Compact single-line representation.
    Compact,
}

/// Configuration for tree dumps.
#[derive(Debug, Clone)]
pub struct TreeFormatOptions {
    /// The style of tree visualization.
    pub style: TreeStyle,
    /// Whether to show node ids.
    pub show_ids: bool,
    /// Whether to show the node kind.
    pub show_kinds: bool,
    /// Maximum depth to traverse (None for unlimited).
    pub max_depth: Option<usize>,
    /// Indent size for each level.
    pub indent_size: usize,
}

impl Default for TreeFormatOptions {
    fn default() -> Self {
        Self {
            style: TreeStyle::default(),
            show_ids: true,
            show_kinds: true,
            max_depth: None,
            indent_size: 2,
        }
    }
}

impl TreeFormatOptions {
    /// Only the column values.
    pub fn minimal() -> Self {
        Self {
            show_ids: false,
            show_kinds: false,
            ..Default::default()
        }
    }
}

/// Formats a [`TreeStorage`] as an indented tree, one node per line.
#[derive(Debug, Clone, Default)]
pub struct TreeDebug {
    options: TreeFormatOptions,
}

impl TreeDebug {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: TreeFormatOptions) -> Self {
        Self { options }
    }

    /// A [`Display`](fmt::Display) adapter for the whole tree.
    pub fn display<'a>(&'a self, storage: &'a TreeStorage) -> TreeDump<'a> {
        TreeDump {
            debug: self,
            storage,
            start: storage.root(),
        }
    }

    /// Dump the whole tree.
    pub fn format(&self, storage: &TreeStorage) -> String {
        self.display(storage).to_string()
    }

    /// Dump the subtree under `id`.
    pub fn format_subtree(&self, storage: &TreeStorage, id: NodeId) -> String {
        TreeDump {
            debug: self,
            storage,
            start: id,
        }
        .to_string()
    }

    /// Write the dump to the debug log.
    pub fn log(&self, storage: &TreeStorage) {
        tracing::debug!(target: targets::TREE, nodes = storage.node_count(), "tree:\n{}", self.display(storage));
    }

    fn write_node(
        &self,
        out: &mut fmt::Formatter<'_>,
        storage: &TreeStorage,
        id: NodeId,
        depth: usize,
        ancestors_last: &mut Vec<bool>,
    ) -> fmt::Result {
        if self.options.max_depth.is_some_and(|max| depth > max) {
            return Ok(());
        }
        let Some(node) = storage.get_by_id(id) else {
            return Ok(());
        };

        self.write_prefix(out, ancestors_last)?;
        let values = node.item().values();
        if id == storage.root() {
            out.write_str("[")?;
        }
        for (i, value) in values.iter().enumerate() {
            if i > 0 {
                out.write_str(" | ")?;
            }
            write!(out, "{value}")?;
        }
        if id == storage.root() {
            out.write_str("]")?;
        }
        if self.options.show_ids {
            write!(out, " {id}")?;
        }
        if self.options.show_kinds {
            write!(out, " ({})", node.item().class())?;
        }
        out.write_str("\n")?;

        let children = node.children();
        for (i, &child) in children.iter().enumerate() {
            ancestors_last.push(i + 1 == children.len());
            self.write_node(out, storage, child, depth + 1, ancestors_last)?;
            ancestors_last.pop();
        }
        Ok(())
    }

    fn write_prefix(&self, out: &mut fmt::Formatter<'_>, ancestors_last: &[bool]) -> fmt::Result {
        let Some((&is_last, outer)) = ancestors_last.split_last() else {
            return Ok(());
        };
        let (branch, tee, corner) = match self.options.style {
            TreeStyle::Ascii => ("|", "+--", "`--"),
            TreeStyle::Unicode => (
                "\u{2502}",
                "\u{251c}\u{2500}\u{2500}",
                "\u{2514}\u{2500}\u{2500}",
            ),
            TreeStyle::Compact => ("", "-", "-"),
        };

        for &last in outer {
            if self.options.style == TreeStyle::Compact {
                out.write_str(" ")?;
                continue;
            }
            out.write_str(if last { " " } else { branch })?;
            for _ in 0..self.options.indent_size {
                out.write_str(" ")?;
            }
        }
        out.write_str(if is_last { corner } else { tee })?;
        out.write_str(" ")
    }
}

/// Output of [`TreeDebug::display`].
pub struct TreeDump<'a> {
    debug: &'a TreeDebug,
    storage: &'a TreeStorage,
    start: NodeId,
}

impl fmt::Display for TreeDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.debug
            .write_node(f, self.storage, self.start, 0, &mut Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::TreeModelConfig;
    use crate::variant::Variant;

    #[test]
    fn test_ascii_dump() {
        let mut s = TreeStorage::new(TreeModelConfig::with_column_names(["Name", "N"]));
        let root = s.root();
        let a = s
            .append_child(root, vec![Variant::from("a"), Variant::from(1)], &mut |_| {})
            .unwrap();
        s.append_child(a, vec![Variant::from("a1"), Variant::from(2)], &mut |_| {})
            .unwrap();
        s.append_child(root, vec![Variant::from("b"), Variant::from(3)], &mut |_| {})
            .unwrap();

        let debug = TreeDebug::with_options(TreeFormatOptions {
            style: TreeStyle::Ascii,
            ..TreeFormatOptions::minimal()
        });
        assert_eq!(
            debug.format(&s),
            "[Name | N]\n+-- a | 1\n|  `-- a1 | 2\n`-- b | 3\n"
        );
    }

    #[test]
    fn test_max_depth_and_ids() {
        let mut s = TreeStorage::default();
        let root = s.root();
        let a = s.append_child(root, vec![Variant::from("a")], &mut |_| {}).unwrap();
        s.append_child(a, vec![Variant::from("hidden")], &mut |_| {}).unwrap();

        let debug = TreeDebug::with_options(TreeFormatOptions {
            max_depth: Some(1),
            ..Default::default()
        });
        let dump = debug.format(&s);
        assert!(dump.contains(&format!("a {a} (generic)")));
        assert!(!dump.contains("hidden"));
        assert!(debug.format_subtree(&s, a).starts_with("a "));
    }
}
