use ndarray::IxDyn;
use ndarray_rand::RandomExt;
use rand::{SeedableRng, distr::StandardUniform, rngs::StdRng};

use neural_style::{
    Tensor,
    arch::{
        LayerKey, LayeredNetwork,
        layers::Normalization,
        zoo::{self, VggBlock},
    },
    optimization::Adam,
    style_transfer::{RunOptions, StyleTransfer},
};

fn image(rng: &mut StdRng) -> Tensor {
    Tensor::random_using(IxDyn(&[1, 3, 4, 4]), StandardUniform, rng)
}

fn network(rng: &mut StdRng) -> LayeredNetwork {
    let features = zoo::vgg_features(
        &[VggBlock::Conv(4), VggBlock::Pool, VggBlock::Conv(4)],
        3,
        rng,
    );
    LayeredNetwork::from_cnn(features, vec![Normalization::imagenet().into()]).unwrap()
}

#[test]
fn losses_are_spliced_and_the_network_pruned() {
    let mut rng = StdRng::seed_from_u64(11);
    let content = image(&mut rng);
    let style = image(&mut rng);

    let transfer = StyleTransfer::new(
        network(&mut rng),
        Some(&content),
        Some(&[LayerKey::from("conv-1")]),
        Some(&style),
        Some(&[LayerKey::from("conv-0"), LayerKey::from("conv-1")]),
    )
    .unwrap();

    let keys: Vec<_> = transfer.network().keys().map(LayerKey::as_str).collect();
    assert_eq!(
        keys,
        [
            "normalization-0",
            "conv-0",
            "style_loss-0",
            "relu-0",
            "pool-0",
            "conv-1",
            "style_loss-1",
            "content_loss-0",
        ]
    );
}

#[test]
fn run_reports_every_evaluation_and_stays_in_range() {
    let mut rng = StdRng::seed_from_u64(5);
    let content = image(&mut rng);
    let style = image(&mut rng);

    let mut transfer = StyleTransfer::new(
        network(&mut rng),
        Some(&content),
        Some(&[LayerKey::from("conv-1")]),
        Some(&style),
        Some(&[LayerKey::from("conv-0")]),
    )
    .unwrap();

    let options = RunOptions {
        num_steps: 12,
        style_weight: 1e3,
        ..RunOptions::default()
    };
    let mut seen = Vec::new();
    let mut progress = |run: usize, _: &Tensor, style: f32, content: f32| {
        assert!(style.is_finite() && content.is_finite());
        seen.push(run);
    };

    let output = transfer
        .run(
            &content,
            |_| Box::new(Adam::new(0.01, 0.9, 0.999, 1e-8)),
            options,
            Some(&mut progress),
        )
        .unwrap();

    assert_eq!(seen, (0..12).collect::<Vec<_>>());
    assert_eq!(output.shape(), content.shape());
    assert!(output.iter().all(|&v| (0. ..=1.).contains(&v)));
}
