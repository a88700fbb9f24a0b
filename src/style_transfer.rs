use log::{info, warn};

use crate::{
    Result, Tensor,
    arch::{
        Layer, LayerKey, LayerKind, LayeredNetwork,
        loss::{ContentLoss, StyleLoss, total_variation_loss},
    },
    hooks::Selection,
    optimization::{Evaluation, Optimizer},
};

/// Evaluations between two progress log lines.
const LOG_EVERY: usize = 50;

/// The knobs of an optimization run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunOptions {
    /// The maximum number of objective evaluations.
    pub num_steps: usize,
    pub style_weight: f32,
    pub content_weight: f32,
    pub tv_weight: f32,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            num_steps: 300,
            style_weight: 1e6,
            content_weight: 1.,
            tv_weight: 1e-3,
        }
    }
}

/// Receives `(iteration, image, style_score, content_score)` after every evaluation.
pub type ProgressCallback<'a> = dyn FnMut(usize, &Tensor, f32, f32) + 'a;

/// A network turned into a style transfer objective: content and style loss layers are spliced
/// after the requested layers and everything past the last of them is dropped.
///
/// The network can't be restructured once the transfer is built, only read.
#[derive(Debug)]
pub struct StyleTransfer {
    network: LayeredNetwork,
}

impl StyleTransfer {
    /// Creates a new `StyleTransfer`.
    ///
    /// # Arguments
    /// * `network` - The pretrained network whose activations define the objective.
    /// * `content_target` - The image whose content is kept.
    /// * `content_keys` - The layers at which content is compared.
    /// * `style_target` - The image whose style is transferred.
    /// * `style_keys` - The layers at which style is compared.
    ///
    /// # Returns
    /// A new `StyleTransfer`, `KeyNotFound` if a key doesn't exist in the network or
    /// `DuplicateKey` if two loss layers of a kind end up with the same key. With nested keys a
    /// loss layer takes the counter of its anchor, so anchors sharing a counter collide.
    pub fn new(
        mut network: LayeredNetwork,
        content_target: Option<&Tensor>,
        content_keys: Option<&[LayerKey]>,
        style_target: Option<&Tensor>,
        style_keys: Option<&[LayerKey]>,
    ) -> Result<Self> {
        network.eval();

        if let (Some(target), Some(keys)) = (content_target, content_keys) {
            insert_loss_layers(&mut network, LayerKind::ContentLoss, target, keys, |output| {
                Ok(ContentLoss::new(output.clone()).into())
            })?;
        }
        if let (Some(target), Some(keys)) = (style_target, style_keys) {
            insert_loss_layers(&mut network, LayerKind::StyleLoss, target, keys, |output| {
                Ok(StyleLoss::new(output.view())?.into())
            })?;
        }

        let last = network
            .layers()
            .filter(|(_, layer)| layer.is_loss())
            .last()
            .map(|(key, _)| key.clone());

        match last {
            Some(last) => network.delete_all_after(last.as_str())?,
            None => warn!("no loss layer was inserted, the network is kept whole"),
        }

        network.clear_hooks();
        Ok(Self { network })
    }

    pub fn network(&self) -> &LayeredNetwork {
        &self.network
    }

    pub fn into_network(self) -> LayeredNetwork {
        self.network
    }

    /// Optimizes an image against the style transfer objective.
    ///
    /// Each evaluation clamps the image to `[0, 1]` before scoring it. The value handed to the
    /// optimizer is the weighted style plus content score, the total variation term only
    /// contributes its gradient.
    ///
    /// # Arguments
    /// * `input` - The starting image, left untouched.
    /// * `optimizer_factory` - Builds the optimizer from the image being optimized.
    /// * `options` - The number of evaluations and the weights of each term.
    /// * `progress` - Called after every evaluation.
    ///
    /// # Returns
    /// The optimized image, clamped to `[0, 1]`.
    pub fn run<F>(
        &mut self,
        input: &Tensor,
        optimizer_factory: F,
        options: RunOptions,
        mut progress: Option<&mut ProgressCallback<'_>>,
    ) -> Result<Tensor>
    where
        F: FnOnce(&Tensor) -> Box<dyn Optimizer>,
    {
        let mut image = input.clone();
        let mut optimizer = optimizer_factory(&image);

        self.set_loss_weights(options.style_weight, options.content_weight);

        let network = &mut self.network;
        let mut run = 0;

        info!("optimizing...");
        while run < options.num_steps {
            optimizer.step(&mut image, &mut |image: &mut Tensor| -> Result<Evaluation> {
                image.mapv_inplace(|v| v.clamp(0., 1.));

                network.zero_grad();
                let output = network.forward(image.clone())?;

                let style_score = options.style_weight * total_loss(network, LayerKind::StyleLoss);
                let content_score =
                    options.content_weight * total_loss(network, LayerKind::ContentLoss);
                let (_, tv_grad) = total_variation_loss(image.view())?;

                // The loss layers seed their own gradients, nothing flows from the output
                let mut grad = network.backward(Tensor::zeros(output.raw_dim()))?;
                grad.scaled_add(options.tv_weight, &tv_grad);

                if let Some(progress) = progress.as_deref_mut() {
                    progress(run, image, style_score, content_score);
                }

                run += 1;
                if run % LOG_EVERY == 0 {
                    info!("run {run}: style loss {style_score:.4} content loss {content_score:.4}");
                }

                Ok(Evaluation {
                    loss: style_score + content_score,
                    grad,
                })
            })?;
        }

        image.mapv_inplace(|v| v.clamp(0., 1.));
        Ok(image)
    }

    fn set_loss_weights(&mut self, style_weight: f32, content_weight: f32) {
        for layer in self.network.get_modules_mut(LayerKind::StyleLoss.as_str()) {
            if let Layer::StyleLoss(l) = layer {
                l.set_weight(style_weight);
            }
        }
        for layer in self.network.get_modules_mut(LayerKind::ContentLoss.as_str()) {
            if let Layer::ContentLoss(l) = layer {
                l.set_weight(content_weight);
            }
        }
    }
}

/// Captures the activations of `target` at `keys` and splices a loss layer built from each
/// of them right after its layer.
///
/// With flat keys the n-th inserted layer gets counter n, with nested keys it takes the counter
/// of the layer it follows.
fn insert_loss_layers<F>(
    network: &mut LayeredNetwork,
    kind: LayerKind,
    target: &Tensor,
    keys: &[LayerKey],
    make_loss: F,
) -> Result<()>
where
    F: Fn(&Tensor) -> Result<Layer>,
{
    network.set_hooked_layers(keys.iter().cloned().collect::<Selection>())?;
    network.forward(target.clone())?;

    let losses = keys
        .iter()
        .map(|key| make_loss(network.get_layer_output(key.as_str())?))
        .collect::<Result<Vec<_>>>()?;

    for (i, (anchor, loss)) in keys.iter().zip(losses).enumerate() {
        let nth = match network.flat_keys() {
            true => i,
            false => anchor.index().unwrap_or(i),
        };
        network.insert_after(anchor.as_str(), LayerKey::new(kind.as_str(), nth), loss)?;
    }

    network.clear_hooks();
    Ok(())
}

fn total_loss(network: &LayeredNetwork, kind: LayerKind) -> f32 {
    network
        .get_modules(kind.as_str())
        .iter()
        .filter_map(|layer| layer.loss())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        StyleErr,
        arch::{layers::Conv2d, zoo},
        optimization::{Closure, GradientDescent},
    };
    use ndarray::{IxDyn, array};
    use rand::{SeedableRng, rngs::StdRng};
    use std::{cell::RefCell, rc::Rc};

    fn conv(w: f32) -> Layer {
        Conv2d::from_params(
            Tensor::from_elem(IxDyn(&[1, 1, 1, 1]), w),
            Tensor::zeros(IxDyn(&[1])),
            1,
            0,
        )
        .unwrap()
        .into()
    }

    fn network() -> LayeredNetwork {
        LayeredNetwork::new([
            (LayerKey::from("conv-0"), conv(1.0)),
            (LayerKey::from("relu-0"), Layer::relu()),
            (LayerKey::from("conv-1"), conv(1.0)),
        ])
        .unwrap()
    }

    fn nested_network() -> LayeredNetwork {
        let mut rng = StdRng::seed_from_u64(0);
        let features = vec![
            Layer::conv(3, 4, 3, 1, 1, &mut rng),
            Layer::relu(),
            Layer::conv(4, 4, 3, 1, 1, &mut rng),
            Layer::relu(),
        ];
        let classifier = vec![Layer::linear((4 * 6 * 6, 2), &mut rng)];

        LayeredNetwork::from_alexnet(zoo::alexnet_from_parts(features, classifier)).unwrap()
    }

    /// Evaluates the objective once and never moves the image.
    struct Recorder(Rc<RefCell<Vec<Evaluation>>>);

    impl Optimizer for Recorder {
        fn step(&mut self, param: &mut Tensor, closure: &mut Closure<'_>) -> Result<f32> {
            let evaluation = closure(param)?;
            let loss = evaluation.loss;
            self.0.borrow_mut().push(evaluation);
            Ok(loss)
        }
    }

    fn keys(transfer: &StyleTransfer) -> Vec<&str> {
        transfer.network().keys().map(LayerKey::as_str).collect()
    }

    #[test]
    fn content_loss_is_inserted_and_the_tail_pruned() {
        let target = array![[[[0.5f32, 0.25]]]].into_dyn();

        let transfer = StyleTransfer::new(
            network(),
            Some(&target),
            Some(&[LayerKey::from("relu-0")]),
            None,
            None,
        )
        .unwrap();

        assert_eq!(keys(&transfer), ["conv-0", "relu-0", "content_loss-0"]);
    }

    #[test]
    fn flat_keys_number_losses_by_insertion_order() {
        let target = array![[[[0.5f32, 0.25]]]].into_dyn();

        let transfer = StyleTransfer::new(
            network(),
            None,
            None,
            Some(&target),
            Some(&[LayerKey::from("conv-0"), LayerKey::from("conv-1")]),
        )
        .unwrap();

        assert_eq!(
            keys(&transfer),
            ["conv-0", "style_loss-0", "relu-0", "conv-1", "style_loss-1"]
        );
    }

    #[test]
    fn hooks_are_cleared_after_construction() {
        let target = array![[[[0.5f32]]]].into_dyn();

        let transfer = StyleTransfer::new(
            network(),
            Some(&target),
            Some(&[LayerKey::from("conv-0")]),
            None,
            None,
        )
        .unwrap();

        assert!(transfer.network().get_layer_output("conv-0").is_err());
    }

    #[test]
    fn without_losses_nothing_is_pruned() {
        let transfer = StyleTransfer::new(network(), None, None, None, None).unwrap();
        assert_eq!(keys(&transfer), ["conv-0", "relu-0", "conv-1"]);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let target = array![[[[0.5f32]]]].into_dyn();

        let result = StyleTransfer::new(
            network(),
            Some(&target),
            Some(&[LayerKey::from("conv-9")]),
            None,
            None,
        );

        assert!(result.is_err());
    }

    #[test]
    fn run_moves_the_image_towards_the_content() {
        let target = array![[[[0.8f32, 0.2], [0.6, 0.4]]]].into_dyn();
        let mut transfer = StyleTransfer::new(
            network(),
            Some(&target),
            Some(&[LayerKey::from("conv-0")]),
            None,
            None,
        )
        .unwrap();

        let input = Tensor::from_elem(IxDyn(&[1, 1, 2, 2]), 0.5);
        let options = RunOptions {
            num_steps: 20,
            style_weight: 0.,
            content_weight: 1.,
            tv_weight: 0.,
        };

        let mut scores = Vec::new();
        let mut record = |_: usize, _: &Tensor, _: f32, content: f32| scores.push(content);
        let output = transfer
            .run(
                &input,
                |_| Box::new(GradientDescent::new(0.5)),
                options,
                Some(&mut record),
            )
            .unwrap();

        assert_eq!(scores.len(), 20);
        assert!(scores[19] < scores[0]);
        assert!(output.iter().all(|&v| (0. ..=1.).contains(&v)));
        assert_eq!(input, Tensor::from_elem(IxDyn(&[1, 1, 2, 2]), 0.5));
    }

    #[test]
    fn nested_keys_number_losses_by_their_anchor() {
        let target = Tensor::from_elem(IxDyn(&[1, 3, 6, 6]), 0.5);

        let transfer = StyleTransfer::new(
            nested_network(),
            Some(&target),
            Some(&[LayerKey::from("features-relu-1")]),
            Some(&target),
            Some(&[LayerKey::from("features-conv-1")]),
        )
        .unwrap();

        assert_eq!(
            keys(&transfer),
            [
                "features-conv-0",
                "features-relu-0",
                "features-conv-1",
                "style_loss-1",
                "features-relu-1",
                "content_loss-1",
            ]
        );
    }

    #[test]
    fn nested_anchors_sharing_a_counter_collide() {
        let target = Tensor::from_elem(IxDyn(&[1, 3, 6, 6]), 0.5);

        let result = StyleTransfer::new(
            nested_network(),
            Some(&target),
            Some(&[
                LayerKey::from("features-conv-0"),
                LayerKey::from("features-relu-0"),
            ]),
            None,
            None,
        );

        assert!(matches!(result, Err(StyleErr::DuplicateKey { key }) if key == "content_loss-0"));
    }

    fn evaluate_once(tv_weight: f32) -> (Evaluation, Tensor, f32, f32) {
        let content = array![[[[0.8f32, 0.2, 0.4], [0.6, 0.4, 0.9]]]].into_dyn();
        let style = array![[[[0.1f32, 0.9, 0.3], [0.5, 0.7, 0.2]]]].into_dyn();
        let mut transfer = StyleTransfer::new(
            network(),
            Some(&content),
            Some(&[LayerKey::from("relu-0")]),
            Some(&style),
            Some(&[LayerKey::from("conv-1")]),
        )
        .unwrap();

        let input = array![[[[-0.5f32, 0.3, 1.5], [0.7, 2.0, 0.1]]]].into_dyn();
        let options = RunOptions {
            num_steps: 1,
            style_weight: 10.,
            content_weight: 2.,
            tv_weight,
        };

        let evaluations = Rc::new(RefCell::new(Vec::new()));
        let recorded = Rc::clone(&evaluations);
        let mut seen = None;
        let mut record = |_: usize, image: &Tensor, style: f32, content: f32| {
            seen = Some((image.clone(), style, content));
        };
        transfer
            .run(
                &input,
                move |_| Box::new(Recorder(recorded)),
                options,
                Some(&mut record),
            )
            .unwrap();

        let evaluation = evaluations.borrow_mut().remove(0);
        let (image, style_score, content_score) = seen.unwrap();
        (evaluation, image, style_score, content_score)
    }

    #[test]
    fn evaluations_score_the_clamped_image() {
        let (evaluation, image, style_score, content_score) = evaluate_once(0.);

        assert_eq!(
            image,
            array![[[[0.0f32, 0.3, 1.0], [0.7, 1.0, 0.1]]]].into_dyn()
        );
        assert!(style_score > 0. && content_score > 0.);
        assert_eq!(evaluation.loss, style_score + content_score);
    }

    #[test]
    fn total_variation_adds_to_the_gradient_but_not_the_loss() {
        let tv_weight = 0.5;
        let (plain, _, _, _) = evaluate_once(0.);
        let (smoothed, image, _, _) = evaluate_once(tv_weight);

        let (_, tv_grad) = total_variation_loss(image.view()).unwrap();
        let added = &smoothed.grad - &plain.grad;

        assert_eq!(smoothed.loss, plain.loss);
        assert!(tv_grad.iter().any(|&g| g != 0.));
        for (got, expected) in added.iter().zip(tv_grad.iter()) {
            assert!((got - tv_weight * expected).abs() < 1e-3);
        }
    }
}
