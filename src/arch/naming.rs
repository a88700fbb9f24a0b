use std::{collections::HashMap, fmt};

use super::{key::LayerKey, layers::Layer};

/// The semantic category of a layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LayerKind {
    Conv,
    Relu,
    Pool,
    BatchNorm,
    AvgPool,
    Dropout,
    Linear,
    Flatten,
    Normalization,
    ContentLoss,
    StyleLoss,
    Other(String),
}

/// Canonical short names of the supported layer kinds. Kept stable so keys survive changes
/// to the concrete layer types.
const KIND_NAMES: [(LayerKind, &str); 11] = [
    (LayerKind::Conv, "conv"),
    (LayerKind::Relu, "relu"),
    (LayerKind::Pool, "pool"),
    (LayerKind::BatchNorm, "bn"),
    (LayerKind::AvgPool, "avgpool"),
    (LayerKind::Dropout, "dropout"),
    (LayerKind::Linear, "linear"),
    (LayerKind::Flatten, "flatten"),
    (LayerKind::Normalization, "normalization"),
    (LayerKind::ContentLoss, "content_loss"),
    (LayerKind::StyleLoss, "style_loss"),
];

impl LayerKind {
    /// Returns the canonical name of this kind.
    pub fn as_str(&self) -> &str {
        if let LayerKind::Other(name) = self {
            return name;
        }

        KIND_NAMES
            .iter()
            .find(|(kind, _)| kind == self)
            .map_or("", |(_, name)| *name)
    }

    /// Classifies a layer.
    pub fn of(layer: &Layer) -> Self {
        layer.kind()
    }

    /// Looks a kind up by its canonical name, any unknown name being an `Other` kind.
    pub fn from_name(name: &str) -> Self {
        KIND_NAMES
            .iter()
            .find(|(_, n)| *n == name)
            .map_or_else(|| LayerKind::Other(name.to_string()), |(kind, _)| kind.clone())
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pairs each layer with the name of its kind.
pub fn kind_names<I>(layers: I) -> Vec<(String, Layer)>
where
    I: IntoIterator<Item = Layer>,
{
    layers
        .into_iter()
        .map(|layer| (LayerKind::of(&layer).to_string(), layer))
        .collect()
}

/// Turns a sequence of named items into uniquely keyed items by appending a running per-name
/// counter starting at 0, preserving the input order.
///
/// # Arguments
/// * `named` - The `(name, item)` pairs, in order.
///
/// # Returns
/// The `(name-counter, item)` pairs, in the same order.
pub fn enumerate_keys<I, T>(named: I) -> Vec<(LayerKey, T)>
where
    I: IntoIterator<Item = (String, T)>,
{
    let mut counters: HashMap<String, usize> = HashMap::new();

    named
        .into_iter()
        .map(|(name, item)| {
            let counter = counters.entry(name.clone()).or_default();
            let key = LayerKey::new(&name, *counter);
            *counter += 1;
            (key, item)
        })
        .collect()
}

/// Returns the dotted path of a module's parent, empty for top level modules.
pub fn parent_name(path: &str) -> &str {
    path.rsplit_once('.').map_or("", |(parent, _)| parent)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(names: &[&str]) -> Vec<(String, usize)> {
        names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.to_string(), i))
            .collect()
    }

    #[test]
    fn repeated_kinds_get_increasing_counters() {
        let keys = enumerate_keys(named(&["conv", "conv", "conv"]));
        let keys: Vec<_> = keys.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["conv-0", "conv-1", "conv-2"]);
    }

    #[test]
    fn counters_are_per_kind_and_keep_order() {
        let keys = enumerate_keys(named(&["conv", "relu", "conv", "relu", "pool"]));
        let (keys, items): (Vec<_>, Vec<_>) = keys.into_iter().unzip();

        assert_eq!(keys, ["conv-0", "relu-0", "conv-1", "relu-1", "pool-0"]);
        assert_eq!(items, [0, 1, 2, 3, 4]);
    }

    #[test]
    fn canonical_names_round_trip() {
        assert_eq!(LayerKind::BatchNorm.as_str(), "bn");
        assert_eq!(LayerKind::from_name("avgpool"), LayerKind::AvgPool);
        assert_eq!(
            LayerKind::from_name("lambda"),
            LayerKind::Other("lambda".into())
        );
        assert_eq!(LayerKind::Other("lambda".into()).as_str(), "lambda");
    }

    #[test]
    fn parent_name_of_nested_and_top_level_paths() {
        assert_eq!(parent_name("features.0"), "features");
        assert_eq!(parent_name("a.b.c"), "a.b");
        assert_eq!(parent_name("avgpool"), "");
    }
}
