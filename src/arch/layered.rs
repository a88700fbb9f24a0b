use std::collections::{HashMap, HashSet};

use log::debug;

use super::{
    flatten::{flat_layers, nested_layers},
    key::LayerKey,
    layers::{Layer, Param},
    module::Module,
};
use crate::{
    Result, StyleErr, Tensor,
    hooks::{HookHandle, HookRegistry, Selection},
    math::one_hot,
};

/// The key of the flatten that AlexNet performs implicitly between its stages.
const ALEXNET_FLATTEN_ANCHOR: &str = "avgpool-0";

/// An ordered, keyed sequence of layers evaluated one after the other.
///
/// Observation is delegated to a [`HookRegistry`]: the outputs and parameter gradients of the
/// selected layers are captured on every pass and, when `hook_to_activations` is on, so are the
/// gradients flowing into the input and every layer's output.
#[derive(Debug)]
pub struct LayeredNetwork {
    layers: Vec<(LayerKey, Layer)>,
    hooks: HookRegistry,
    hook_to_activations: bool,
    flat_keys: bool,
}

impl LayeredNetwork {
    /// Creates a new `LayeredNetwork` with every layer hooked.
    ///
    /// # Arguments
    /// * `layers` - The keyed layers, in forward order.
    ///
    /// # Returns
    /// A new `LayeredNetwork` or `DuplicateKey` if two layers share a key.
    pub fn new<I>(layers: I) -> Result<Self>
    where
        I: IntoIterator<Item = (LayerKey, Layer)>,
    {
        let layers: Vec<_> = layers.into_iter().collect();

        let mut seen = HashSet::new();
        for (key, _) in &layers {
            if !seen.insert(key.as_str()) {
                return Err(StyleErr::DuplicateKey {
                    key: key.to_string(),
                });
            }
        }

        let mut network = Self {
            layers,
            hooks: HookRegistry::new(),
            hook_to_activations: false,
            flat_keys: true,
        };
        network.set_hooked_layers(Selection::All)?;

        Ok(network)
    }

    /// Converts a flat network into a `LayeredNetwork`, keys being inferred from its layers.
    ///
    /// # Arguments
    /// * `module` - A network whose children are all layers.
    /// * `prepended` - Layers to run before the network's first child.
    pub fn from_cnn(module: Module, prepended: Vec<Layer>) -> Result<Self> {
        Self::new(flat_layers(module, prepended)?)
    }

    /// Converts an AlexNet-shaped network into a `LayeredNetwork` with nested keys, adding the
    /// flatten between its feature extractor and its classifier.
    pub fn from_alexnet(module: Module) -> Result<Self> {
        let mut network = Self::new(nested_layers(module)?)?;
        network.flat_keys = false;
        network.insert_after(
            ALEXNET_FLATTEN_ANCHOR,
            LayerKey::new("flatten", 0),
            Layer::flatten(),
        )?;

        Ok(network)
    }

    /// Whether the keys are plain `kind-index` keys rather than nested ones.
    pub fn flat_keys(&self) -> bool {
        self.flat_keys
    }

    pub fn hook_to_activations(&self) -> bool {
        self.hook_to_activations
    }

    /// Enables or disables capturing the gradients flowing into every activation, from the next
    /// forward pass on.
    pub fn set_hook_to_activations(&mut self, enabled: bool) {
        self.hook_to_activations = enabled;
    }

    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &LayerKey> {
        self.layers.iter().map(|(key, _)| key)
    }

    pub fn layers(&self) -> impl Iterator<Item = (&LayerKey, &Layer)> {
        self.layers.iter().map(|(key, layer)| (key, layer))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.layers.iter().position(|(k, _)| k == key)
    }

    fn find(&self, key: &str) -> Result<usize> {
        self.position(key)
            .ok_or_else(|| StyleErr::key_not_found(key))
    }

    /// Makes a forward pass through every layer.
    ///
    /// # Arguments
    /// * `x` - The input of the first layer.
    ///
    /// # Returns
    /// The output of the last layer.
    pub fn forward(&mut self, mut x: Tensor) -> Result<Tensor> {
        let mut session = self.hooks.forward_session(self.hook_to_activations);

        for (key, layer) in self.layers.iter_mut() {
            x = layer.forward(x)?;
            session.layer_output(key.as_str(), &x);
        }

        let captures = session.into_captures();
        self.hooks.commit_forward(captures);
        Ok(x)
    }

    /// Makes a backward pass through every layer, in reverse order, accumulating the gradients
    /// of their parameters.
    ///
    /// Hooked parameters capture their accumulated gradient right after their layer's step.
    ///
    /// # Arguments
    /// * `seed` - The gradient of the objective with respect to the network's output.
    ///
    /// # Returns
    /// The gradient with respect to the network's input.
    pub fn backward(&mut self, seed: Tensor) -> Result<Tensor> {
        let mut session = self.hooks.backward_session();
        let mut d = seed;

        for (key, layer) in self.layers.iter_mut().rev() {
            session.activation_gradient(key.as_str(), &d);
            d = layer.backward(d)?;

            for (name, param) in layer.params() {
                session.param_gradient(&param_name(key, name), param.grad());
            }
        }

        session.input_gradient(&d);
        let captures = session.into_captures();
        self.hooks.commit_backward(captures);
        Ok(d)
    }

    /// Splices a layer right after another one.
    ///
    /// # Arguments
    /// * `anchor` - The key of the layer after which to insert.
    /// * `key` - The key of the new layer.
    /// * `layer` - The new layer.
    ///
    /// # Returns
    /// `KeyNotFound` if `anchor` is missing or `DuplicateKey` if `key` is already taken.
    pub fn insert_after(&mut self, anchor: &str, key: LayerKey, layer: Layer) -> Result<()> {
        let pos = self.find(anchor)?;
        if self.contains_key(key.as_str()) {
            return Err(StyleErr::DuplicateKey {
                key: key.to_string(),
            });
        }

        debug!("inserting {key} after {anchor}");
        self.layers.insert(pos + 1, (key, layer));
        Ok(())
    }

    /// Drops every layer after `last`, keeping `last` itself.
    pub fn delete_all_after(&mut self, last: &str) -> Result<()> {
        let pos = self.find(last)?;
        let removed = self.layers.len() - pos - 1;

        debug!(removed = removed; "deleting every layer after {last}");
        self.layers.truncate(pos + 1);
        Ok(())
    }

    /// Chooses which layers are observed from the next pass on. Whatever was hooked before is
    /// detached, together with its captures.
    ///
    /// # Arguments
    /// * `selection` - The layers to observe, `None` meaning every layer.
    ///
    /// # Returns
    /// The handle of the new registration, or `KeyNotFound` if a selected key is missing.
    pub fn set_hooked_layers<S: Into<Selection>>(&mut self, selection: S) -> Result<HookHandle> {
        let selection = selection.into();
        if let Some(missing) = selection.keys().find(|key| !self.contains_key(key.as_str())) {
            return Err(StyleErr::key_not_found(missing.as_str()));
        }

        let names: Vec<_> = self
            .layers
            .iter()
            .flat_map(|(key, layer)| {
                layer
                    .params()
                    .into_iter()
                    .map(move |(name, _)| (key.as_str(), param_name(key, name)))
            })
            .collect();
        let keys = self.layers.iter().map(|(key, _)| key.as_str());

        Ok(self.hooks.attach(selection, keys, names))
    }

    /// Detaches every hook and drops every capture.
    pub fn clear_hooks(&mut self) {
        debug!("clearing hooks");
        self.hooks.clear();
    }

    /// Detaches the hooks of the registration identified by `handle`. Stale handles are ignored.
    pub fn detach_hooks(&mut self, handle: HookHandle) -> bool {
        self.hooks.detach(handle)
    }

    /// Every layer whose key has `kind` as its kind component, in order.
    pub fn get_modules(&self, kind: &str) -> Vec<&Layer> {
        self.layers
            .iter()
            .filter(|(key, _)| key.kind() == kind)
            .map(|(_, layer)| layer)
            .collect()
    }

    pub(crate) fn get_modules_mut(&mut self, kind: &str) -> Vec<&mut Layer> {
        self.layers
            .iter_mut()
            .filter(|(key, _)| key.kind() == kind)
            .map(|(_, layer)| layer)
            .collect()
    }

    pub fn get_module(&self, key: &str) -> Result<&Layer> {
        let pos = self.find(key)?;
        Ok(&self.layers[pos].1)
    }

    pub fn get_module_mut(&mut self, key: &str) -> Result<&mut Layer> {
        let pos = self.find(key)?;
        Ok(&mut self.layers[pos].1)
    }

    /// The output of the layer with `key` on the last forward pass.
    pub fn get_layer_output(&self, key: &str) -> Result<&Tensor> {
        self.hooks.layer_output(key)
    }

    /// The gradients of the hooked parameters on the last backward pass.
    pub fn parameter_gradients(&self) -> Result<&HashMap<String, Tensor>> {
        self.hooks.param_gradients()
    }

    /// Computes how the score of `target_class` depends on the input and on every activation.
    ///
    /// # Arguments
    /// * `input` - A batch of samples.
    /// * `target_class` - The class whose score is backpropagated.
    ///
    /// # Returns
    /// The gradients under `"input"` and under every layer key.
    pub fn get_gradients_for_sample(
        &mut self,
        input: Tensor,
        target_class: usize,
    ) -> Result<HashMap<String, Tensor>> {
        self.eval();

        let previous = self.hook_to_activations;
        self.hook_to_activations = true;
        let result = self.backprop_class(input, target_class);
        self.hook_to_activations = previous;

        result?;
        Ok(self.hooks.activation_gradients()?.clone())
    }

    fn backprop_class(&mut self, input: Tensor, target_class: usize) -> Result<()> {
        let output = self.forward(input)?;

        self.zero_grad();
        let seed = one_hot(output.shape(), target_class)?;
        self.backward(seed)?;

        Ok(())
    }

    pub fn zero_grad(&mut self) {
        for (_, layer) in self.layers.iter_mut() {
            layer.zero_grad();
        }
    }

    pub fn train(&mut self) {
        self.set_training(true);
    }

    pub fn eval(&mut self) {
        self.set_training(false);
    }

    fn set_training(&mut self, training: bool) {
        for (_, layer) in self.layers.iter_mut() {
            layer.set_training(training);
        }
    }

    /// Every learnable parameter under its `"<layer key>.<param>"` name, in order.
    pub fn named_parameters(&self) -> Vec<(String, &Param)> {
        self.layers
            .iter()
            .flat_map(|(key, layer)| {
                layer
                    .params()
                    .into_iter()
                    .map(move |(name, param)| (param_name(key, name), param))
            })
            .collect()
    }
}

fn param_name(key: &LayerKey, name: &str) -> String {
    format!("{key}.{name}")
}
