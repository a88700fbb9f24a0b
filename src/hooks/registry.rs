use std::collections::HashMap;

use log::debug;

use super::{CaptureSession, Captures, HookDict, HookHandle, Selection};
use crate::{Result, StyleErr, Tensor};

/// Owns every observation point of a container: layer outputs, parameter gradients and, when
/// enabled, the gradients flowing into each activation.
///
/// Layers never see the registry. The container opens a [`CaptureSession`] per pass, feeds it
/// and commits it back, so readers only ever observe whole passes.
#[derive(Debug)]
pub struct HookRegistry {
    selection: Selection,
    outputs: HookDict,
    params: HookDict,

    activations: Option<HashMap<String, Tensor>>,
    // The last forward pass asked for activation gradients
    activations_pending: bool,
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self {
            selection: Selection::Nothing,
            outputs: HookDict::new(),
            params: HookDict::new(),
            activations: None,
            activations_pending: false,
        }
    }
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Arms the layer-output and parameter-gradient hooks of the selected layers. Any previous
    /// registration is fully detached first.
    ///
    /// # Arguments
    /// * `selection` - The layers to observe.
    /// * `layer_keys` - The keys of every layer of the container.
    /// * `param_names` - Every `(layer key, "<layer key>.<param>")` pair of the container.
    ///
    /// # Returns
    /// The handle of the new registration.
    pub fn attach<'a, L, P>(&mut self, selection: Selection, layer_keys: L, param_names: P) -> HookHandle
    where
        L: IntoIterator<Item = &'a str>,
        P: IntoIterator<Item = (&'a str, String)>,
    {
        self.clear();

        let handle = self
            .outputs
            .attach(layer_keys.into_iter().filter(|key| selection.contains(key)));
        self.params.attach(
            param_names
                .into_iter()
                .filter(|(owner, _)| selection.contains(owner))
                .map(|(_, name)| name),
        );

        debug!(
            outputs = self.outputs.armed_keys().count(),
            params = self.params.armed_keys().count();
            "hooks attached"
        );

        self.selection = selection;
        handle
    }

    /// Removes every observation point and stored capture of the registration identified by
    /// `handle`.
    ///
    /// # Returns
    /// Whether anything was detached. Stale handles and repeated calls are no-ops.
    pub fn detach(&mut self, handle: HookHandle) -> bool {
        if !self.outputs.detach(handle) {
            return false;
        }

        self.clear();
        true
    }

    /// Removes every observation point and stored capture.
    pub fn clear(&mut self) {
        self.outputs.clear();
        self.params.clear();
        self.activations = None;
        self.activations_pending = false;
        self.selection = Selection::Nothing;
    }

    /// Opens the session of a forward pass.
    pub fn forward_session(&self, capture_activations: bool) -> CaptureSession<'_> {
        CaptureSession::new(&self.outputs, &self.params, capture_activations)
    }

    /// Opens the session of a backward pass. Activation gradients are captured only if the
    /// preceding forward pass asked for them.
    pub fn backward_session(&self) -> CaptureSession<'_> {
        CaptureSession::new(&self.outputs, &self.params, self.activations_pending)
    }

    pub fn commit_forward(&mut self, captures: Captures) {
        self.outputs.commit(captures.outputs);

        self.activations_pending = captures.activations.is_some();
        if self.activations_pending {
            self.activations = None;
        }
    }

    pub fn commit_backward(&mut self, captures: Captures) {
        self.params.commit(captures.params);

        if let Some(activations) = captures.activations {
            self.activations = Some(activations);
        }
    }

    /// The output of the layer with `key` on the last forward pass.
    pub fn layer_output(&self, key: &str) -> Result<&Tensor> {
        self.outputs.get_stored(key)
    }

    pub fn layer_outputs(&self) -> Result<&HashMap<String, Tensor>> {
        self.outputs.stored()
    }

    /// The gradient of the parameter `name` (`"<layer key>.<param>"`) on the last backward pass.
    pub fn param_gradient(&self, name: &str) -> Result<&Tensor> {
        self.params.get_stored(name)
    }

    pub fn param_gradients(&self) -> Result<&HashMap<String, Tensor>> {
        self.params.stored()
    }

    /// The gradients flowing into `"input"` and into every layer's output on the last backward
    /// pass.
    pub fn activation_gradients(&self) -> Result<&HashMap<String, Tensor>> {
        self.activations.as_ref().ok_or_else(|| {
            StyleErr::hook_state("activation gradients were not captured on the last backward pass")
        })
    }
}
