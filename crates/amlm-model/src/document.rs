//! Tree documents.
//!
//! A tree serializes to a nested [`Variant`] map. Every node carries a
//! `class` tag naming its kind; children are listed in row order. Node ids
//! are not written: reading a document issues fresh ones.
//!
//! ```text
//! header:        class, header_num_sections, header_section_list,
//!                num_child_items, child_node_list
//! generic:       class, item_data_size, item_data, num_children, children
//! scan_result:   class, dir_url, media_url, cue_url, dir_props,
//!                num_children, children
//! library_entry: class, url, file_type, is_populated, is_subtrack,
//!                offset_secs, num_children, children
//! ```

use amlm_core::logging::targets;

use crate::column::{ColumnSpec, TreeModelConfig};
use crate::error::{DocumentError, Result};
use crate::id::NodeId;
use crate::item::{DirProps, LibraryEntry, ScanResult, TreeItem};
use crate::storage::TreeStorage;
use crate::variant::{Variant, VariantMap};

const CLASS: &str = "class";
const HEADER: &str = "header";

impl TreeStorage {
    /// Serialize the whole tree.
    pub fn to_document(&self) -> Variant {
        let mut map = VariantMap::new();
        map.insert(CLASS, HEADER);
        let columns = self.columns();
        map.insert("header_num_sections", columns.len());
        map.insert(
            "header_section_list",
            columns.iter().map(ColumnSpec::to_variant).collect::<Vec<_>>(),
        );
        let children = self.children_documents(self.root());
        map.insert("num_child_items", children.len());
        map.insert("child_node_list", children);
        Variant::Map(map)
    }

    fn children_documents(&self, id: NodeId) -> Vec<Variant> {
        self.children(id)
            .iter()
            .filter_map(|&child| self.node_document(child))
            .collect()
    }

    fn node_document(&self, id: NodeId) -> Option<Variant> {
        let node = self.get_by_id(id)?;
        let item = node.item();
        let mut map = VariantMap::new();
        map.insert(CLASS, item.class());
        match item {
            TreeItem::Header(_) => {
                tracing::warn!(target: targets::TREE, node = %id, "header item below the root, skipped");
                return None;
            }
            TreeItem::Generic(values) => {
                map.insert("item_data_size", values.len());
                map.insert("item_data", values.clone());
            }
            TreeItem::ScanResult(scan) => {
                map.insert("dir_url", scan.dir_url.as_str());
                map.insert("media_url", scan.media_url.as_str());
                map.insert("cue_url", scan.cue_url.as_str());
                map.insert("dir_props", i64::from(scan.dir_props.bits()));
            }
            TreeItem::LibraryEntry(entry) => {
                map.insert("url", entry.url.as_str());
                map.insert("file_type", entry.file_type.as_str());
                map.insert("is_populated", entry.is_populated);
                map.insert("is_subtrack", entry.is_subtrack);
                map.insert("offset_secs", entry.offset_secs);
            }
        }
        let children = self.children_documents(id);
        map.insert("num_children", children.len());
        map.insert("children", children);
        Some(Variant::Map(map))
    }

    /// Build a tree from a document written by [`to_document`](Self::to_document).
    pub fn from_document(document: &Variant) -> Result<TreeStorage> {
        let root = as_map(document, "document root")?;
        let class = get_str(root, CLASS, "document root")?;
        if class != HEADER {
            return Err(DocumentError::BadRoot(class.to_string()).into());
        }

        let sections = get_list(root, "header_section_list", "header")?;
        check_count(root, "header_num_sections", sections.len(), "header");
        let columns = sections
            .iter()
            .map(read_column)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut storage = TreeStorage::new(TreeModelConfig { columns });
        let children = get_list(root, "child_node_list", "header")?;
        check_count(root, "num_child_items", children.len(), "header");

        let parent = storage.root();
        let mut pending: Vec<(NodeId, &Variant)> =
            children.iter().rev().map(|c| (parent, c)).collect();
        while let Some((parent, node)) = pending.pop() {
            let map = as_map(node, "node")?;
            let item = read_item(map)?;
            let id = storage.append_item(parent, item, &mut |_| {})?;

            let grandchildren = get_list(map, "children", "node")?;
            check_count(map, "num_children", grandchildren.len(), "node");
            pending.extend(grandchildren.iter().rev().map(|c| (id, c)));
        }

        tracing::debug!(target: targets::TREE, nodes = storage.node_count(), "tree read from document");
        Ok(storage)
    }
}

fn read_column(value: &Variant) -> std::result::Result<ColumnSpec, DocumentError> {
    let map = as_map(value, "header section")?;
    Ok(ColumnSpec {
        section_id: get_int(map, "section_id", "header section")?,
        display_name: get_str(map, "display_name", "header section")?.to_string(),
    })
}

fn read_item(map: &VariantMap) -> std::result::Result<TreeItem, DocumentError> {
    let class = get_str(map, CLASS, "node")?;
    match class {
        "generic" => {
            let values = get_list(map, "item_data", class)?;
            check_count(map, "item_data_size", values.len(), class);
            Ok(TreeItem::Generic(values.to_vec()))
        }
        "scan_result" => Ok(TreeItem::ScanResult(ScanResult {
            dir_url: get_str(map, "dir_url", class)?.to_string(),
            media_url: get_str(map, "media_url", class)?.to_string(),
            cue_url: get_str(map, "cue_url", class)?.to_string(),
            dir_props: read_dir_props(map, class)?,
        })),
        "library_entry" => Ok(TreeItem::LibraryEntry(LibraryEntry {
            url: get_str(map, "url", class)?.to_string(),
            file_type: get_str(map, "file_type", class)?.to_string(),
            is_populated: get_bool(map, "is_populated", class)?,
            is_subtrack: get_bool(map, "is_subtrack", class)?,
            offset_secs: get(map, "offset_secs", class)?
                .as_float()
                .ok_or_else(|| DocumentError::wrong_type("offset_secs", class, "a number"))?,
        })),
        HEADER => Err(DocumentError::BadRoot(format!("{HEADER} below the root"))),
        other => Err(DocumentError::UnknownClass(other.to_string())),
    }
}

fn read_dir_props(map: &VariantMap, class: &str) -> std::result::Result<DirProps, DocumentError> {
    let bits = get_int(map, "dir_props", class)?;
    u8::try_from(bits)
        .map(DirProps::from_bits_truncate)
        .map_err(|_| DocumentError::wrong_type("dir_props", class, "a flag byte"))
}

fn check_count(map: &VariantMap, key: &str, actual: usize, context: &str) {
    match map.get(key).and_then(Variant::as_int) {
        Some(count) if count == actual as i64 => {}
        Some(count) => {
            tracing::warn!(target: targets::TREE, key, count, actual, context, "count disagrees with list, using the list");
        }
        None => {
            tracing::warn!(target: targets::TREE, key, context, "count missing or not an integer");
        }
    }
}

fn as_map<'a>(
    value: &'a Variant,
    context: &str,
) -> std::result::Result<&'a VariantMap, DocumentError> {
    value.as_map().ok_or_else(|| DocumentError::NotAMap {
        context: context.to_string(),
    })
}

fn get<'a>(
    map: &'a VariantMap,
    key: &str,
    context: &str,
) -> std::result::Result<&'a Variant, DocumentError> {
    map.get(key).ok_or_else(|| DocumentError::missing_key(key, context))
}

fn get_str<'a>(
    map: &'a VariantMap,
    key: &str,
    context: &str,
) -> std::result::Result<&'a str, DocumentError> {
    get(map, key, context)?
        .as_str()
        .ok_or_else(|| DocumentError::wrong_type(key, context, "a string"))
}

fn get_int(map: &VariantMap, key: &str, context: &str) -> std::result::Result<i64, DocumentError> {
    get(map, key, context)?
        .as_int()
        .ok_or_else(|| DocumentError::wrong_type(key, context, "an integer"))
}

fn get_bool(
    map: &VariantMap,
    key: &str,
    context: &str,
) -> std::result::Result<bool, DocumentError> {
    get(map, key, context)?
        .as_bool()
        .ok_or_else(|| DocumentError::wrong_type(key, context, "a boolean"))
}

fn get_list<'a>(
    map: &'a VariantMap,
    key: &str,
    context: &str,
) -> std::result::Result<&'a [Variant], DocumentError> {
    get(map, key, context)?
        .as_list()
        .ok_or_else(|| DocumentError::wrong_type(key, context, "a list"))
}
