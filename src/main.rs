use std::env;

use anyhow::{Context, Result, bail};
use log::{info, warn};
use ndarray_rand::RandomExt;
use rand::{SeedableRng, distr::StandardUniform, rngs::StdRng};

use neural_style::{
    Tensor,
    arch::{LayeredNetwork, layers::Normalization, zoo},
    config::{InitImage, RunConfig},
    style_transfer::StyleTransfer,
    weights,
};

fn main() -> Result<()> {
    env_logger::init();

    let Some(path) = env::args().nth(1) else {
        bail!("usage: neural_style <config.json>");
    };
    let config = RunConfig::from_file(&path).with_context(|| format!("loading {path}"))?;

    let seed = config.seed.unwrap_or_else(rand::random);
    let mut rng = StdRng::seed_from_u64(seed);
    info!(seed = seed; "building vgg19 features");

    let mut features = zoo::vgg19_features(&mut rng);
    match &config.weights {
        Some(weights_path) => {
            weights::load_parameters(&mut features, weights_path, &config.weights_prefix)
                .with_context(|| format!("loading weights from {}", weights_path.display()))?;
        }
        None => warn!("no weights given, the features are randomly initialized"),
    }

    let network = LayeredNetwork::from_cnn(features, vec![Normalization::imagenet().into()])?;

    let content = weights::load_image(&config.content_image, &config.image_tensor_name)
        .with_context(|| format!("loading {}", config.content_image.display()))?;
    let style = weights::load_image(&config.style_image, &config.image_tensor_name)
        .with_context(|| format!("loading {}", config.style_image.display()))?;

    let content_keys = config.content_keys();
    let style_keys = config.style_keys();
    let mut transfer = StyleTransfer::new(
        network,
        Some(&content),
        Some(content_keys.as_slice()),
        Some(&style),
        Some(style_keys.as_slice()),
    )?;

    let input = match config.init {
        InitImage::Content => content,
        InitImage::Noise => Tensor::random_using(content.raw_dim(), StandardUniform, &mut rng),
    };

    let output = transfer.run(
        &input,
        config.optimizer_factory(),
        config.run_options(),
        None,
    )?;

    weights::save_image(&config.output, &config.image_tensor_name, &output)
        .with_context(|| format!("saving {}", config.output.display()))?;
    info!("output written to {}", config.output.display());

    Ok(())
}
