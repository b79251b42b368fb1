use serde::{Deserialize, Serialize};

use super::Tag;

/// An NBT compound that keeps its entries in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NbtCompound(Vec<(String, Tag)>);

impl NbtCompound {
    /// Creates an empty compound.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Inserts `tag` under `name`, replacing any existing entry in place.
    pub fn insert(&mut self, name: impl Into<String>, tag: Tag) {
        let name = name.into();
        if let Some(slot) = self.0.iter_mut().find(|(key, _)| *key == name) {
            slot.1 = tag;
        } else {
            self.0.push((name, tag));
        }
    }

    // Decoding keeps duplicate keys so the original bytes can be reproduced.
    pub(super) fn push(&mut self, name: String, tag: Tag) {
        self.0.push((name, tag));
    }

    /// Returns the first entry named `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Tag> {
        self.0.iter().find(|(key, _)| key == name).map(|(_, tag)| tag)
    }

    /// Returns `name` as an integer if it holds any integral tag.
    #[must_use]
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Tag::as_i64)
    }

    /// Returns `name` as a string.
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Tag::as_str)
    }

    /// Returns `name` as a nested compound.
    #[must_use]
    pub fn get_compound(&self, name: &str) -> Option<&NbtCompound> {
        self.get(name).and_then(Tag::as_compound)
    }

    /// Iterates entries in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Tag)> {
        self.0.iter().map(|(key, tag)| (key.as_str(), tag))
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the compound has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
