//! Node payloads.
//!
//! The set of node kinds is closed: [`TreeItem`] has one case per kind. Each
//! case renders its own columns and serializes under its own `class` tag.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::column::ColumnSpec;
use crate::variant::Variant;

/// Text shown for every column of a library entry whose metadata is not loaded.
pub const UNPOPULATED_PLACEHOLDER: &str = "???";

/// Properties of a scanned directory, as bit flags.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DirProps(u8);

impl DirProps {
    /// Nothing is known about the directory.
    pub const UNKNOWN: Self = Self(0x00);
    /// The directory holds exactly one album.
    pub const SINGLE_ALBUM: Self = Self(0x01);
    /// The directory holds a single audio file.
    pub const SINGLE_FILE: Self = Self(0x02);
    /// A separate cue sheet sits next to the media file.
    pub const HAS_SIDECAR_CUE_SHEET: Self = Self(0x04);
    /// The directory has album art.
    pub const HAS_ART: Self = Self(0x08);
    /// The directory is just a bunch of MP3s.
    pub const JBOD_MP3S: Self = Self(0x10);

    const NAMES: [(DirProps, &'static str); 5] = [
        (Self::SINGLE_ALBUM, "SingleAlbum"),
        (Self::SINGLE_FILE, "SingleFile"),
        (Self::HAS_SIDECAR_CUE_SHEET, "HasSidecarCueSheet"),
        (Self::HAS_ART, "HasArt"),
        (Self::JBOD_MP3S, "JbodMp3s"),
    ];

    /// Flags from raw bits. Unknown bits are dropped.
    pub const fn from_bits_truncate(bits: u8) -> Self {
        Self(bits & 0x1f)
    }

    /// Raw bits.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Whether every flag in `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Set the flags in `other`.
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

impl std::ops::BitOr for DirProps {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for DirProps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return f.write_str("Unknown");
        }
        let mut first = true;
        for (flag, name) in Self::NAMES {
            if self.contains(flag) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for DirProps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DirProps({self})")
    }
}

/// One media file found while scanning a directory.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScanResult {
    /// The directory containing the media file.
    pub dir_url: String,
    /// The media file.
    pub media_url: String,
    /// The sidecar cue sheet, empty if there is none.
    pub cue_url: String,
    /// What is known about the directory.
    pub dir_props: DirProps,
}

impl ScanResult {
    /// Columns rendered by scan results: props, media URL, cue sheet URL.
    pub const COLUMN_COUNT: usize = 3;

    /// Describe `media_url`, deriving the directory and the cue sheet URL.
    ///
    /// The cue sheet URL is the media URL with its extension replaced by
    /// `.cue`; it is kept only if `cue_exists` says the file is there.
    pub fn for_media_url(
        media_url: impl Into<String>,
        cue_exists: impl FnOnce(&str) -> bool,
    ) -> Self {
        let media_url = media_url.into();
        let dir_url = match media_url.rfind('/') {
            Some(pos) => media_url[..=pos].to_string(),
            None => String::new(),
        };

        let file_start = media_url.rfind('/').map_or(0, |pos| pos + 1);
        let stem_end = match media_url[file_start..].rfind('.') {
            Some(dot) if dot > 0 => file_start + dot,
            _ => media_url.len(),
        };
        let candidate = format!("{}.cue", &media_url[..stem_end]);

        let mut dir_props = DirProps::UNKNOWN;
        let cue_url = if cue_exists(&candidate) {
            dir_props.insert(DirProps::HAS_SIDECAR_CUE_SHEET);
            candidate
        } else {
            String::new()
        };

        Self {
            dir_url,
            media_url,
            cue_url,
            dir_props,
        }
    }
}

/// A track or file in the library.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LibraryEntry {
    /// Location of the file.
    pub url: String,
    /// File type, e.g. a MIME type.
    pub file_type: String,
    /// Whether metadata has been read.
    pub is_populated: bool,
    /// Whether this is a track inside a larger file.
    pub is_subtrack: bool,
    /// Start of a subtrack within its file, in seconds.
    pub offset_secs: f64,
}

impl LibraryEntry {
    /// Columns rendered by library entries: file name, file type.
    pub const COLUMN_COUNT: usize = 2;

    /// An unpopulated entry for `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// The last path segment of the URL.
    pub fn filename(&self) -> &str {
        self.url.rsplit('/').next().unwrap_or(&self.url)
    }
}

/// The payload of one tree node.
#[derive(Debug, Clone, PartialEq)]
pub enum TreeItem {
    /// The root: column headers.
    Header(Vec<ColumnSpec>),
    /// Plain column values.
    Generic(Vec<Variant>),
    /// A directory scan result.
    ScanResult(ScanResult),
    /// A library entry.
    LibraryEntry(LibraryEntry),
}

impl TreeItem {
    /// The `class` tag this kind is serialized under.
    pub fn class(&self) -> &'static str {
        match self {
            TreeItem::Header(_) => "header",
            TreeItem::Generic(_) => "generic",
            TreeItem::ScanResult(_) => "scan_result",
            TreeItem::LibraryEntry(_) => "library_entry",
        }
    }

    /// Number of columns this item renders.
    pub fn column_count(&self) -> usize {
        match self {
            TreeItem::Header(columns) => columns.len(),
            TreeItem::Generic(values) => values.len(),
            TreeItem::ScanResult(_) => ScanResult::COLUMN_COUNT,
            TreeItem::LibraryEntry(_) => LibraryEntry::COLUMN_COUNT,
        }
    }

    /// The value shown in `column`; `Variant::Null` past the last column.
    pub fn data(&self, column: usize) -> Variant {
        match self {
            TreeItem::Header(columns) => columns
                .get(column)
                .map(|c| Variant::from(c.display_name.as_str()))
                .unwrap_or_default(),
            TreeItem::Generic(values) => values.get(column).cloned().unwrap_or_default(),
            TreeItem::ScanResult(scan) => match column {
                0 => Variant::String(scan.dir_props.to_string()),
                1 => Variant::from(scan.media_url.as_str()),
                2 => Variant::from(scan.cue_url.as_str()),
                _ => Variant::Null,
            },
            TreeItem::LibraryEntry(entry) => {
                if column >= LibraryEntry::COLUMN_COUNT {
                    return Variant::Null;
                }
                if !entry.is_populated {
                    return Variant::from(UNPOPULATED_PLACEHOLDER);
                }
                match column {
                    0 => Variant::from(entry.filename()),
                    _ => Variant::from(entry.file_type.as_str()),
                }
            }
        }
    }

    /// Every rendered column, in order.
    pub fn values(&self) -> Vec<Variant> {
        (0..self.column_count()).map(|c| self.data(c)).collect()
    }

    /// Replace the value in `column`. Only header names and generic values
    /// are editable; returns `false` for anything else.
    pub fn set_data(&mut self, column: usize, value: Variant) -> bool {
        match self {
            TreeItem::Header(columns) => match (columns.get_mut(column), value) {
                (Some(spec), Variant::String(name)) => {
                    spec.display_name = name;
                    true
                }
                _ => false,
            },
            TreeItem::Generic(values) => match values.get_mut(column) {
                Some(slot) => {
                    *slot = value;
                    true
                }
                None => false,
            },
            TreeItem::ScanResult(_) | TreeItem::LibraryEntry(_) => false,
        }
    }

    /// Insert `count` empty columns at `position` (generic items only).
    pub(crate) fn insert_columns(&mut self, position: usize, count: usize) {
        if let TreeItem::Generic(values) = self {
            let at = position.min(values.len());
            values.splice(at..at, std::iter::repeat_n(Variant::Null, count));
        }
    }

    /// Remove columns `position..position + count` (generic items only).
    pub(crate) fn remove_columns(&mut self, position: usize, count: usize) {
        if let TreeItem::Generic(values) = self {
            let start = position.min(values.len());
            let end = (position + count).min(values.len());
            values.drain(start..end);
        }
    }

    /// The header columns, if this is the root item.
    pub fn columns(&self) -> Option<&[ColumnSpec]> {
        match self {
            TreeItem::Header(columns) => Some(columns),
            _ => None,
        }
    }

    pub(crate) fn columns_mut(&mut self) -> Option<&mut Vec<ColumnSpec>> {
        match self {
            TreeItem::Header(columns) => Some(columns),
            _ => None,
        }
    }
}

impl From<Vec<Variant>> for TreeItem {
    fn from(values: Vec<Variant>) -> Self {
        TreeItem::Generic(values)
    }
}

impl From<ScanResult> for TreeItem {
    fn from(scan: ScanResult) -> Self {
        TreeItem::ScanResult(scan)
    }
}

impl From<LibraryEntry> for TreeItem {
    fn from(entry: LibraryEntry) -> Self {
        TreeItem::LibraryEntry(entry)
    }
}
