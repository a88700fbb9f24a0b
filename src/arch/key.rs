use std::{borrow::Borrow, fmt};

/// Separates a key's kind from its per-kind counter.
pub const SEPARATOR: char = '-';

/// The key of the pseudo-activation that stands for a network's input.
pub const INPUT_KEY: &str = "input";

/// A stable, human-readable identifier of a layer inside a container, shaped as `kind-index`
/// (`conv-0`, `relu-3`) or, for nested architectures, `parent-path-kind-index`
/// (`features-conv-2`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerKey(String);

impl LayerKey {
    /// Creates a new `LayerKey` from its parts.
    ///
    /// # Arguments
    /// * `kind` - The kind (or prefixed kind) of the layer.
    /// * `index` - The per-kind counter.
    ///
    /// # Returns
    /// The `kind-index` key.
    pub fn new(kind: &str, index: usize) -> Self {
        Self(format!("{kind}{SEPARATOR}{index}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Splits the key on its last separator.
    ///
    /// # Returns
    /// The `(kind, index)` pair, or `None` if the key has no numeric counter.
    pub fn parse(&self) -> Option<(&str, usize)> {
        let (kind, index) = self.0.rsplit_once(SEPARATOR)?;
        let index = index.parse().ok()?;
        Some((kind, index))
    }

    /// Returns the kind component of the key, or the whole key if it has no counter.
    pub fn kind(&self) -> &str {
        self.parse().map_or(self.as_str(), |(kind, _)| kind)
    }

    /// Returns the counter component of the key.
    pub fn index(&self) -> Option<usize> {
        self.parse().map(|(_, index)| index)
    }
}

impl fmt::Display for LayerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LayerKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for LayerKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&LayerKey> for LayerKey {
    fn from(value: &LayerKey) -> Self {
        value.clone()
    }
}

impl Borrow<str> for LayerKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for LayerKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for LayerKey {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for LayerKey {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}
