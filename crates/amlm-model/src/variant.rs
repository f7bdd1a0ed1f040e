//! Dynamically typed values for column data and tree documents.
//!
//! [`Variant`] is the value type of a node's columns and the building block
//! of the document a tree serializes to. Maps keep insertion order so a
//! written document reads back with its keys in the same order.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A dynamically typed value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Variant {
    /// No value.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating point.
    Float(f64),
    /// Text.
    String(String),
    /// Ordered list.
    List(Vec<Variant>),
    /// Insertion-ordered map.
    Map(VariantMap),
}

impl Variant {
    /// Returns `true` if this is `Variant::Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Variant::Null)
    }

    /// Attempts to get the value as a string slice.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Variant::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Attempts to get the value as an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Variant::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Attempts to get the value as a float. Integers convert.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Variant::Float(n) => Some(*n),
            Variant::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// Attempts to get the value as a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Variant::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Attempts to get the value as a list.
    pub fn as_list(&self) -> Option<&[Variant]> {
        match self {
            Variant::List(items) => Some(items),
            _ => None,
        }
    }

    /// Attempts to get the value as a map.
    pub fn as_map(&self) -> Option<&VariantMap> {
        match self {
            Variant::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Short name of the value's kind, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Variant::Null => "null",
            Variant::Bool(_) => "bool",
            Variant::Int(_) => "int",
            Variant::Float(_) => "float",
            Variant::String(_) => "string",
            Variant::List(_) => "list",
            Variant::Map(_) => "map",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Null => Ok(()),
            Variant::Bool(b) => write!(f, "{b}"),
            Variant::Int(n) => write!(f, "{n}"),
            Variant::Float(n) => write!(f, "{n}"),
            Variant::String(s) => f.write_str(s),
            Variant::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Variant::Map(map) => {
                f.write_str("{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<String> for Variant {
    fn from(s: String) -> Self {
        Variant::String(s)
    }
}

impl From<&str> for Variant {
    fn from(s: &str) -> Self {
        Variant::String(s.to_string())
    }
}

impl From<i64> for Variant {
    fn from(n: i64) -> Self {
        Variant::Int(n)
    }
}

impl From<i32> for Variant {
    fn from(n: i32) -> Self {
        Variant::Int(n as i64)
    }
}

impl From<usize> for Variant {
    fn from(n: usize) -> Self {
        Variant::Int(n as i64)
    }
}

impl From<f64> for Variant {
    fn from(n: f64) -> Self {
        Variant::Float(n)
    }
}

impl From<bool> for Variant {
    fn from(b: bool) -> Self {
        Variant::Bool(b)
    }
}

impl From<Vec<Variant>> for Variant {
    fn from(items: Vec<Variant>) -> Self {
        Variant::List(items)
    }
}

impl From<VariantMap> for Variant {
    fn from(map: VariantMap) -> Self {
        Variant::Map(map)
    }
}

/// A string-keyed map that remembers insertion order.
///
/// Lookups are linear; document nodes carry a handful of keys.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VariantMap {
    entries: Vec<(String, Variant)>,
}

impl VariantMap {
    /// An empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace `key`. A replaced key keeps its original position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Variant>) -> Option<Variant> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Look up `key`.
    pub fn get(&self, key: &str) -> Option<&Variant> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Whether `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Remove `key`.
    pub fn remove(&mut self, key: &str) -> Option<Variant> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Variant)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }
}

impl<K: Into<String>, V: Into<Variant>> FromIterator<(K, V)> for VariantMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = VariantMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl Serialize for VariantMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for VariantMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MapVisitor;

        impl<'de> Visitor<'de> for MapVisitor {
            type Value = VariantMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map with string keys")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<VariantMap, A::Error> {
                let mut map = VariantMap::new();
                while let Some((key, value)) = access.next_entry::<String, Variant>()? {
                    map.insert(key, value);
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(MapVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_keeps_insertion_order() {
        let mut map = VariantMap::new();
        map.insert("zeta", 1);
        map.insert("alpha", 2);
        map.insert("mid", 3);
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["zeta", "alpha", "mid"]);

        // Replacing keeps position.
        assert_eq!(map.insert("zeta", 10), Some(Variant::Int(1)));
        assert_eq!(map.keys().next(), Some("zeta"));
        assert_eq!(map.get("zeta"), Some(&Variant::Int(10)));
    }

    #[test]
    fn test_map_remove() {
        let mut map: VariantMap = [("a", 1), ("b", 2)].into_iter().collect();
        assert_eq!(map.remove("a"), Some(Variant::Int(1)));
        assert!(!map.contains_key("a"));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_accessors() {
        assert_eq!(Variant::from("x").as_str(), Some("x"));
        assert_eq!(Variant::from(3).as_float(), Some(3.0));
        assert_eq!(Variant::from(true).as_bool(), Some(true));
        assert!(Variant::Null.is_null());
        assert_eq!(Variant::from(1.5).kind(), "float");
    }

    #[test]
    fn test_display() {
        let v = Variant::List(vec![Variant::from(1), Variant::from("two")]);
        assert_eq!(v.to_string(), "[1, two]");
        assert_eq!(Variant::Null.to_string(), "");
    }
}
