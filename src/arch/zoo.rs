//! Statically declared architectures, laid out like their torchvision counterparts so that
//! pretrained weights exported from there load by name.

use rand::Rng;

use super::{
    layers::{Layer, Relu},
    module::Module,
};

/// One entry of a VGG feature extractor: a 3x3 convolution to `Conv(n)` channels followed by a
/// relu, or a 2x2 max pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VggBlock {
    Conv(usize),
    Pool,
}
use VggBlock::*;

/// The feature extractor of VGG-19, configuration "E" of the paper.
pub const VGG19: [VggBlock; 21] = [
    Conv(64),
    Conv(64),
    Pool,
    Conv(128),
    Conv(128),
    Pool,
    Conv(256),
    Conv(256),
    Conv(256),
    Conv(256),
    Pool,
    Conv(512),
    Conv(512),
    Conv(512),
    Conv(512),
    Pool,
    Conv(512),
    Conv(512),
    Conv(512),
    Conv(512),
    Pool,
];

/// Builds a VGG feature extractor as a flat group of layers named by position.
///
/// # Arguments
/// * `cfg` - The blocks of the extractor.
/// * `in_channels` - The channels of the input images.
/// * `rng` - The random number generator used for the weights.
pub fn vgg_features<R: Rng + ?Sized>(cfg: &[VggBlock], in_channels: usize, rng: &mut R) -> Module {
    let mut layers = Vec::new();
    let mut channels = in_channels;

    for block in cfg {
        match *block {
            Conv(out) => {
                layers.push(Layer::conv(channels, out, 3, 1, 1, rng));
                layers.push(Layer::Relu(Relu::with_inplace(true)));
                channels = out;
            }
            Pool => layers.push(Layer::max_pool(2, 2)),
        }
    }

    Module::sequential(layers)
}

/// The feature extractor of VGG-19, the part style transfer works with.
pub fn vgg19_features<R: Rng + ?Sized>(rng: &mut R) -> Module {
    vgg_features(&VGG19, 3, rng)
}

/// The whole VGG-19 classifier for the 1000 ImageNet classes.
pub fn vgg19<R: Rng + ?Sized>(rng: &mut R) -> Module {
    let features = vgg19_features(rng);
    let classifier = Module::sequential([
        Layer::linear((512 * 7 * 7, 4096), rng),
        Layer::Relu(Relu::with_inplace(true)),
        Layer::dropout(0.5, rng.random()),
        Layer::linear((4096, 4096), rng),
        Layer::Relu(Relu::with_inplace(true)),
        Layer::dropout(0.5, rng.random()),
        Layer::linear((4096, 1000), rng),
    ]);

    Module::seq([
        ("features", features),
        ("avgpool", Layer::avg_pool((7, 7)).into()),
        ("classifier", classifier),
    ])
}

/// Assembles an AlexNet shaped network: `features`, a 6x6 adaptive average pool and a
/// `classifier`, the flatten between the last two being implicit.
pub fn alexnet_from_parts(features: Vec<Layer>, classifier: Vec<Layer>) -> Module {
    Module::seq([
        ("features", Module::sequential(features)),
        ("avgpool", Layer::avg_pool((6, 6)).into()),
        ("classifier", Module::sequential(classifier)),
    ])
}

/// AlexNet, as in "One weird trick for parallelizing convolutional neural networks".
pub fn alexnet<R: Rng + ?Sized>(num_classes: usize, rng: &mut R) -> Module {
    let relu = || Layer::Relu(Relu::with_inplace(true));

    let features = vec![
        Layer::conv(3, 64, 11, 4, 2, rng),
        relu(),
        Layer::max_pool(3, 2),
        Layer::conv(64, 192, 5, 1, 2, rng),
        relu(),
        Layer::max_pool(3, 2),
        Layer::conv(192, 384, 3, 1, 1, rng),
        relu(),
        Layer::conv(384, 256, 3, 1, 1, rng),
        relu(),
        Layer::conv(256, 256, 3, 1, 1, rng),
        relu(),
        Layer::max_pool(3, 2),
    ];
    let classifier = vec![
        Layer::dropout(0.5, rng.random()),
        Layer::linear((256 * 6 * 6, 4096), rng),
        relu(),
        Layer::dropout(0.5, rng.random()),
        Layer::linear((4096, 4096), rng),
        relu(),
        Layer::linear((4096, num_classes), rng),
    ];

    alexnet_from_parts(features, classifier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::LayeredNetwork;
    use rand::{SeedableRng, rngs::StdRng};

    #[test]
    fn vgg19_has_sixteen_convs_and_five_pools() {
        let convs = VGG19.iter().filter(|b| matches!(b, Conv(_))).count();
        let pools = VGG19.iter().filter(|b| matches!(b, Pool)).count();

        assert_eq!((convs, pools), (16, 5));
    }

    #[test]
    fn vgg_features_are_keyed_like_torchvision_indices() {
        let mut rng = StdRng::seed_from_u64(0);
        let features = vgg_features(&[Conv(4), Pool, Conv(8)], 3, &mut rng);

        let names: Vec<_> = features
            .named_layers()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, ["0", "1", "2", "3", "4"]);

        let network = LayeredNetwork::from_cnn(features, Vec::new()).unwrap();
        let keys: Vec<_> = network.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, ["conv-0", "relu-0", "pool-0", "conv-1", "relu-1"]);
    }

    #[test]
    fn alexnet_layout_gets_nested_keys_and_a_flatten() {
        let mut rng = StdRng::seed_from_u64(0);
        let net = alexnet_from_parts(
            vec![Layer::conv(3, 4, 3, 1, 1, &mut rng), Layer::relu()],
            vec![Layer::dropout(0.5, 0), Layer::linear((4 * 6 * 6, 2), &mut rng)],
        );

        let network = LayeredNetwork::from_alexnet(net).unwrap();
        let keys: Vec<_> = network.keys().map(|k| k.as_str()).collect();

        assert!(!network.flat_keys());
        assert_eq!(
            keys,
            [
                "features-conv-0",
                "features-relu-0",
                "avgpool-0",
                "flatten-0",
                "classifier-dropout-0",
                "classifier-linear-0",
            ]
        );
    }
}
