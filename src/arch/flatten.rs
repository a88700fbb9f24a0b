use std::collections::HashSet;

use super::{
    key::{LayerKey, SEPARATOR},
    layers::Layer,
    module::{Module, join},
    naming::{enumerate_keys, kind_names, parent_name},
};
use crate::{Result, StyleErr};

/// Flattens a network whose immediate children are all layers.
///
/// # Arguments
/// * `module` - The network, consumed.
/// * `prepended` - Layers placed before the network's first child, e.g. an input normalization.
///
/// # Returns
/// The keyed layers in forward order, or an `UnsupportedStructure` error if any child is a
/// group or the children's names are not unique.
pub fn flat_layers(module: Module, prepended: Vec<Layer>) -> Result<Vec<(LayerKey, Layer)>> {
    let Module::Seq(children) = module else {
        return Err(StyleErr::UnsupportedStructure {
            path: String::new(),
            reason: "a single layer has no children to flatten",
        });
    };

    check_siblings("", &children)?;

    let mut layers = prepended;
    for (name, child) in children {
        match child {
            Module::Leaf(layer) => layers.push(layer),
            Module::Seq(_) => {
                return Err(StyleErr::UnsupportedStructure {
                    path: name,
                    reason: "flat networks can't have nested groups",
                });
            }
        }
    }

    Ok(enumerate_keys(kind_names(layers.into_iter().map(clean_layer))))
}

/// Flattens an arbitrarily nested network into its leaf layers.
///
/// Each leaf is keyed by its parent's path, dash separated, followed by its kind and a counter
/// that runs per (parent, kind): the first conv of `features` is `features-conv-0`.
pub fn nested_layers(module: Module) -> Result<Vec<(LayerKey, Layer)>> {
    let mut leaves = Vec::new();
    collect_leaves(module, "", &mut leaves)?;

    let named = leaves.into_iter().map(|(path, layer)| {
        let layer = clean_layer(layer);
        let parent = parent_name(&path).replace('.', &SEPARATOR.to_string());
        let kind = layer.kind();

        let name = if parent.is_empty() {
            kind.to_string()
        } else {
            format!("{parent}{SEPARATOR}{kind}")
        };
        (name, layer)
    });

    Ok(enumerate_keys(named))
}

fn collect_leaves(module: Module, path: &str, out: &mut Vec<(String, Layer)>) -> Result<()> {
    match module {
        Module::Leaf(layer) => out.push((path.to_string(), layer)),
        Module::Seq(children) => {
            check_siblings(path, &children)?;
            for (name, child) in children {
                collect_leaves(child, &join(path, &name), out)?;
            }
        }
    }

    Ok(())
}

fn check_siblings(path: &str, children: &[(String, Module)]) -> Result<()> {
    let mut seen = HashSet::new();

    for (name, _) in children {
        if name.is_empty() || name.contains('.') {
            return Err(StyleErr::UnsupportedStructure {
                path: join(path, name),
                reason: "child names must be non-empty and can't contain '.'",
            });
        }
        if !seen.insert(name.as_str()) {
            return Err(StyleErr::UnsupportedStructure {
                path: join(path, name),
                reason: "duplicate child name",
            });
        }
    }

    Ok(())
}

fn clean_layer(mut layer: Layer) -> Layer {
    layer.make_non_mutating();
    layer
}
