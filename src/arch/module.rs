use super::layers::Layer;

/// The declared structure of a network: a tree whose leaves are layers and whose inner nodes
/// are named groups of children, evaluated in declaration order.
#[derive(Debug, Clone)]
pub enum Module {
    Leaf(Layer),
    Seq(Vec<(String, Module)>),
}

impl Module {
    /// Creates a group with explicitly named children.
    pub fn seq<I, S>(children: I) -> Self
    where
        I: IntoIterator<Item = (S, Module)>,
        S: Into<String>,
    {
        Self::Seq(
            children
                .into_iter()
                .map(|(name, child)| (name.into(), child))
                .collect(),
        )
    }

    /// Creates a group of layers named by their position: `"0"`, `"1"`, ...
    pub fn sequential<I>(layers: I) -> Self
    where
        I: IntoIterator<Item = Layer>,
    {
        Self::Seq(
            layers
                .into_iter()
                .enumerate()
                .map(|(i, layer)| (i.to_string(), Self::Leaf(layer)))
                .collect(),
        )
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Leaf(_))
    }

    /// The immediate children of this module, empty for leaves.
    pub fn children(&self) -> &[(String, Module)] {
        match self {
            Self::Leaf(_) => &[],
            Self::Seq(children) => children,
        }
    }

    pub fn layer(&self) -> Option<&Layer> {
        match self {
            Self::Leaf(layer) => Some(layer),
            Self::Seq(_) => None,
        }
    }

    /// Looks a descendant up by its dotted path, e.g. `"features.0"`.
    pub fn get(&self, path: &str) -> Option<&Module> {
        path.split('.').try_fold(self, |module, name| {
            module
                .children()
                .iter()
                .find_map(|(n, child)| (n == name).then_some(child))
        })
    }

    /// Every leaf layer with its dotted path, in declaration order.
    pub fn named_layers(&self) -> Vec<(String, &Layer)> {
        let mut out = Vec::new();
        self.collect_layers("", &mut out);
        out
    }

    fn collect_layers<'a>(&'a self, path: &str, out: &mut Vec<(String, &'a Layer)>) {
        match self {
            Self::Leaf(layer) => out.push((path.to_string(), layer)),
            Self::Seq(children) => {
                for (name, child) in children {
                    child.collect_layers(&join(path, name), out);
                }
            }
        }
    }

    /// Every leaf layer with its dotted path, in declaration order.
    pub fn named_layers_mut(&mut self) -> Vec<(String, &mut Layer)> {
        let mut out = Vec::new();
        self.collect_layers_mut("", &mut out);
        out
    }

    fn collect_layers_mut<'a>(&'a mut self, path: &str, out: &mut Vec<(String, &'a mut Layer)>) {
        match self {
            Self::Leaf(layer) => out.push((path.to_string(), layer)),
            Self::Seq(children) => {
                for (name, child) in children {
                    child.collect_layers_mut(&join(path, name), out);
                }
            }
        }
    }
}

impl From<Layer> for Module {
    fn from(value: Layer) -> Self {
        Self::Leaf(value)
    }
}

/// Appends `name` to a dotted path.
pub(crate) fn join(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{path}.{name}")
    }
}
