//! Column descriptions and model configuration.

use serde::{Deserialize, Serialize};

use crate::variant::{Variant, VariantMap};

/// Describes one column of a tree model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Application-defined section identifier.
    pub section_id: i64,
    /// Header text.
    pub display_name: String,
}

impl ColumnSpec {
    /// A column with the given section id and header text.
    pub fn new(section_id: i64, display_name: impl Into<String>) -> Self {
        Self {
            section_id,
            display_name: display_name.into(),
        }
    }

    /// A column with section id 0.
    pub fn named(display_name: impl Into<String>) -> Self {
        Self::new(0, display_name)
    }

    pub(crate) fn to_variant(&self) -> Variant {
        let mut map = VariantMap::new();
        map.insert("section_id", self.section_id);
        map.insert("display_name", self.display_name.as_str());
        Variant::Map(map)
    }
}

/// Configuration of a new tree model.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TreeModelConfig {
    /// Header columns.
    pub columns: Vec<ColumnSpec>,
}

impl TreeModelConfig {
    /// Columns named after `names`, all with section id 0.
    pub fn with_column_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: names.into_iter().map(ColumnSpec::named).collect(),
        }
    }

    /// The columns a directory-scan model starts with.
    pub fn scan_results() -> Self {
        Self::with_column_names(["DirProps", "MediaURL", "SidecarCueURL"])
    }
}

impl From<Vec<ColumnSpec>> for TreeModelConfig {
    fn from(columns: Vec<ColumnSpec>) -> Self {
        Self { columns }
    }
}
