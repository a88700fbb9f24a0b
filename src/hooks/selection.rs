use std::collections::BTreeSet;

use crate::arch::LayerKey;

/// Which layers are observed on the following passes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Selection {
    /// Every layer of the container.
    #[default]
    All,
    /// Only the given layers.
    Keys(BTreeSet<LayerKey>),
    /// No layer at all.
    Nothing,
}

impl Selection {
    /// Whether the layer with `key` is selected.
    pub fn contains(&self, key: &str) -> bool {
        match self {
            Self::All => true,
            Self::Keys(keys) => keys.contains(key),
            Self::Nothing => false,
        }
    }

    /// The explicitly selected keys, empty for `All` and `Nothing`.
    pub fn keys(&self) -> impl Iterator<Item = &LayerKey> {
        let keys = match self {
            Self::Keys(keys) => Some(keys.iter()),
            _ => None,
        };
        keys.into_iter().flatten()
    }
}

/// `None` selects every layer, as in "no restriction".
impl<K: Into<LayerKey>> From<Option<Vec<K>>> for Selection {
    fn from(value: Option<Vec<K>>) -> Self {
        match value {
            None => Self::All,
            Some(keys) => Self::Keys(keys.into_iter().map(Into::into).collect()),
        }
    }
}

impl<K: Into<LayerKey>> FromIterator<K> for Selection {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        Self::Keys(iter.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn membership_per_variant() {
        let some: Selection = ["conv-0", "relu-0"].into_iter().collect();

        assert!(Selection::All.contains("pool-3"));
        assert!(!Selection::Nothing.contains("conv-0"));
        assert!(some.contains("relu-0"));
        assert!(!some.contains("relu-1"));
    }

    #[test]
    fn none_selects_everything() {
        assert_eq!(Selection::from(None::<Vec<LayerKey>>), Selection::All);
        assert_eq!(
            Selection::from(Some(vec!["conv-0"])),
            Selection::Keys(BTreeSet::from([LayerKey::from("conv-0")]))
        );
    }
}
