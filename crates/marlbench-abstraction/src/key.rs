//! Nested field keys used to address tensors inside a [`Batch`](crate::Batch).

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Root component under which next-step fields are stored.
pub const NEXT: &str = "next";

/// Root component holding auxiliary environment information.
pub const INFO: &str = "info";

/// A nested key path such as `next/agents/reward`.
///
/// Keys order lexicographically by component, so every field under a common
/// prefix is contiguous in a sorted map.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldKey(Vec<String>);

impl FieldKey {
    /// Builds a key from its components.
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    /// Returns the key components.
    pub fn parts(&self) -> &[String] {
        &self.0
    }

    /// Returns the number of components.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` for the empty (root) key.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the last component, or `""` for the root key.
    pub fn leaf(&self) -> &str {
        self.0.last().map_or("", String::as_str)
    }

    /// Returns the first component, or `""` for the root key.
    pub fn head(&self) -> &str {
        self.0.first().map_or("", String::as_str)
    }

    /// Returns `true` if `prefix` is a component-wise prefix of this key.
    pub fn starts_with(&self, prefix: &FieldKey) -> bool {
        self.0.len() >= prefix.0.len() && self.0.iter().zip(&prefix.0).all(|(a, b)| a == b)
    }

    /// Removes `prefix` from the front of this key.
    pub fn strip_prefix(&self, prefix: &FieldKey) -> Option<FieldKey> {
        self.starts_with(prefix).then(|| Self(self.0[prefix.0.len()..].to_vec()))
    }

    /// Appends a component.
    #[must_use]
    pub fn join(&self, part: impl Into<String>) -> Self {
        let mut parts = self.0.clone();
        parts.push(part.into());
        Self(parts)
    }

    /// Returns this key with its leaf replaced.
    #[must_use]
    pub fn with_leaf(&self, leaf: impl Into<String>) -> Self {
        let mut parts = self.0.clone();
        parts.pop();
        parts.push(leaf.into());
        Self(parts)
    }

    /// Returns `true` if this key lives under the `next` root.
    pub fn is_next(&self) -> bool {
        self.head() == NEXT
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

impl From<&str> for FieldKey {
    fn from(path: &str) -> Self {
        Self(path.split('/').filter(|p| !p.is_empty()).map(str::to_string).collect())
    }
}

impl From<String> for FieldKey {
    fn from(path: String) -> Self {
        Self::from(path.as_str())
    }
}

impl<const N: usize> From<[&str; N]> for FieldKey {
    fn from(parts: [&str; N]) -> Self {
        Self::new(parts)
    }
}

impl Serialize for FieldKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for FieldKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let path = String::deserialize(deserializer)?;
        Ok(Self::from(path))
    }
}
