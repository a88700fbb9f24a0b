use std::collections::HashMap;

use super::HookDict;
use crate::{Tensor, arch::INPUT_KEY};

/// The captures of a single forward or backward pass.
///
/// A session is opened by the [`HookRegistry`](super::HookRegistry) right before a pass, fed by
/// the container as each layer completes and committed back into the registry when the pass
/// ends. Nothing is visible to readers until then.
#[derive(Debug)]
pub struct CaptureSession<'a> {
    outputs: &'a HookDict,
    params: &'a HookDict,
    activations: bool,

    captured_outputs: HashMap<String, Tensor>,
    captured_params: HashMap<String, Tensor>,
    captured_activations: HashMap<String, Tensor>,
}

impl<'a> CaptureSession<'a> {
    pub(super) fn new(outputs: &'a HookDict, params: &'a HookDict, activations: bool) -> Self {
        Self {
            outputs,
            params,
            activations,
            captured_outputs: HashMap::new(),
            captured_params: HashMap::new(),
            captured_activations: HashMap::new(),
        }
    }

    /// Records the output of the layer with `key`, if it's hooked.
    pub fn layer_output(&mut self, key: &str, output: &Tensor) {
        if self.outputs.is_armed(key) {
            self.captured_outputs
                .insert(key.to_string(), output.clone());
        }
    }

    /// Records the gradient of a named parameter, if it's hooked.
    pub fn param_gradient(&mut self, name: &str, grad: &Tensor) {
        if self.params.is_armed(name) {
            self.captured_params.insert(name.to_string(), grad.clone());
        }
    }

    /// Records the gradient flowing into the activation with `key`, when activation gradients
    /// are being captured on this pass.
    pub fn activation_gradient(&mut self, key: &str, grad: &Tensor) {
        if self.activations {
            self.captured_activations
                .insert(key.to_string(), grad.clone());
        }
    }

    /// Records the gradient with respect to the input of the network.
    pub fn input_gradient(&mut self, grad: &Tensor) {
        self.activation_gradient(INPUT_KEY, grad);
    }

    pub(crate) fn into_captures(self) -> Captures {
        Captures {
            outputs: self.captured_outputs,
            params: self.captured_params,
            activations: self.activations.then_some(self.captured_activations),
        }
    }
}

/// The owned result of a finished [`CaptureSession`].
#[derive(Debug)]
pub struct Captures {
    pub(super) outputs: HashMap<String, Tensor>,
    pub(super) params: HashMap<String, Tensor>,
    pub(super) activations: Option<HashMap<String, Tensor>>,
}
