//! Configuration property access
//!
//! Panel configuration is a flat key/value store: each key maps to a UTF-8
//! text blob, a raw byte array, or a bare presence flag. Device trees and
//! JSON fixtures both fit this shape.
//!
//! [`PropertySource`] is the read-only interface the engine consumes.
//! [`PropertyMap`] is an owned, in-memory implementation used by tests and
//! host tooling; with the `serde` feature it deserialises from an object of
//! `key → {"text": …} | {"bytes": […]} | {"flag": true}`.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

/// Read-only access to configuration properties by key.
pub trait PropertySource {
    /// Text value for `key`, if the key holds text.
    fn text(&self, key: &str) -> Option<&str>;

    /// Raw bytes for `key`, if the key holds a byte array.
    fn bytes(&self, key: &str) -> Option<&[u8]>;

    /// `true` if `key` is present at all (any value kind).
    fn flag(&self, key: &str) -> bool;
}

impl<P: PropertySource + ?Sized> PropertySource for &P {
    fn text(&self, key: &str) -> Option<&str> {
        (**self).text(key)
    }

    fn bytes(&self, key: &str) -> Option<&[u8]> {
        (**self).bytes(key)
    }

    fn flag(&self, key: &str) -> bool {
        (**self).flag(key)
    }
}

/// One stored property value.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum PropertyValue {
    /// UTF-8 text blob.
    Text(String),
    /// Raw byte array.
    Bytes(Vec<u8>),
    /// Presence-only boolean; `false` behaves as absent.
    Flag(bool),
}

/// Owned property store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct PropertyMap {
    entries: BTreeMap<String, PropertyValue>,
}

impl PropertyMap {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a text property.
    pub fn set_text(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.entries
            .insert(key.into(), PropertyValue::Text(value.into()));
        self
    }

    /// Insert or replace a byte-array property.
    pub fn set_bytes(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> &mut Self {
        self.entries
            .insert(key.into(), PropertyValue::Bytes(value.into()));
        self
    }

    /// Insert or replace a presence flag.
    pub fn set_flag(&mut self, key: impl Into<String>) -> &mut Self {
        self.entries.insert(key.into(), PropertyValue::Flag(true));
        self
    }

    /// Remove a key, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<PropertyValue> {
        self.entries.remove(key)
    }

    /// Raw stored value.
    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.entries.get(key)
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if no keys are stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl PropertySource for PropertyMap {
    fn text(&self, key: &str) -> Option<&str> {
        match self.entries.get(key) {
            Some(PropertyValue::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    fn bytes(&self, key: &str) -> Option<&[u8]> {
        match self.entries.get(key) {
            Some(PropertyValue::Bytes(b)) => Some(b.as_slice()),
            _ => None,
        }
    }

    fn flag(&self, key: &str) -> bool {
        match self.entries.get(key) {
            Some(PropertyValue::Flag(set)) => *set,
            Some(_) => true,
            None => false,
        }
    }
}

impl<K: Into<String>> FromIterator<(K, PropertyValue)> for PropertyMap {
    fn from_iter<I: IntoIterator<Item = (K, PropertyValue)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}
