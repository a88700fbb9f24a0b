//! The JSON configuration of a style transfer run.

use std::{fs, path::Path, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    Result, StyleErr, Tensor,
    arch::LayerKey,
    optimization::{Adam, GradientDescent, Optimizer},
    style_transfer::RunOptions,
};

/// The optimizer used on the image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerConfig {
    Adam {
        learning_rate: f32,
        beta1: f32,
        beta2: f32,
        epsilon: f32,
    },
    GradientDescent {
        learning_rate: f32,
    },
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self::Adam {
            learning_rate: 0.02,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
        }
    }
}

impl OptimizerConfig {
    /// Builds the optimizer this configuration describes.
    pub fn build(&self) -> Box<dyn Optimizer> {
        match *self {
            OptimizerConfig::Adam {
                learning_rate,
                beta1,
                beta2,
                epsilon,
            } => Box::new(Adam::new(learning_rate, beta1, beta2, epsilon)),
            OptimizerConfig::GradientDescent { learning_rate } => {
                Box::new(GradientDescent::new(learning_rate))
            }
        }
    }
}

/// The image the optimization starts from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitImage {
    #[default]
    Content,
    Noise,
}

/// Everything a style transfer run needs, with every field but the images defaulted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct RunConfig {
    /// Pretrained VGG-19 parameters, random ones are used when absent.
    pub weights: Option<PathBuf>,
    /// The dotted path of the feature extractor inside the weights file.
    pub weights_prefix: String,
    pub content_image: PathBuf,
    pub style_image: PathBuf,
    /// The tensor name images are stored under.
    pub image_tensor_name: String,
    pub output: PathBuf,
    pub content_layers: Vec<String>,
    pub style_layers: Vec<String>,
    pub init: InitImage,
    pub num_steps: usize,
    pub style_weight: f32,
    pub content_weight: f32,
    pub tv_weight: f32,
    pub optimizer: OptimizerConfig,
    pub seed: Option<u64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        let options = RunOptions::default();

        Self {
            weights: None,
            weights_prefix: "features".into(),
            content_image: PathBuf::new(),
            style_image: PathBuf::new(),
            image_tensor_name: "image".into(),
            output: PathBuf::from("output.safetensors"),
            content_layers: vec!["conv-3".into()],
            style_layers: (0..5).map(|i| format!("conv-{i}")).collect(),
            init: InitImage::default(),
            num_steps: options.num_steps,
            style_weight: options.style_weight,
            content_weight: options.content_weight,
            tv_weight: options.tv_weight,
            optimizer: OptimizerConfig::default(),
            seed: None,
        }
    }
}

impl RunConfig {
    /// Reads and validates a configuration from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the values serde can't.
    pub fn validate(&self) -> Result<()> {
        if self.content_image.as_os_str().is_empty() {
            return Err(StyleErr::Config("content_image is required".into()));
        }
        if self.style_image.as_os_str().is_empty() {
            return Err(StyleErr::Config("style_image is required".into()));
        }
        if self.content_layers.is_empty() && self.style_layers.is_empty() {
            return Err(StyleErr::Config(
                "at least one content or style layer is required".into(),
            ));
        }

        for key in self.content_layers.iter().chain(&self.style_layers) {
            if LayerKey::from(key.as_str()).parse().is_none() {
                return Err(StyleErr::Config(format!(
                    "'{key}' is not a layer key, expected <kind>-<index>"
                )));
            }
        }

        let weights = [
            ("style_weight", self.style_weight),
            ("content_weight", self.content_weight),
            ("tv_weight", self.tv_weight),
        ];
        for (name, weight) in weights {
            if !weight.is_finite() || weight < 0. {
                return Err(StyleErr::Config(format!(
                    "{name} must be finite and non-negative, got {weight}"
                )));
            }
        }

        let learning_rate = match self.optimizer {
            OptimizerConfig::Adam { learning_rate, .. } => learning_rate,
            OptimizerConfig::GradientDescent { learning_rate } => learning_rate,
        };
        if learning_rate.is_nan() || learning_rate <= 0. {
            return Err(StyleErr::Config(format!(
                "learning_rate must be positive, got {learning_rate}"
            )));
        }

        if let OptimizerConfig::Adam { beta1, beta2, .. } = self.optimizer {
            if !(0. ..1.).contains(&beta1) || !(0. ..1.).contains(&beta2) {
                return Err(StyleErr::Config("adam betas must lie in [0, 1)".into()));
            }
        }

        Ok(())
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            num_steps: self.num_steps,
            style_weight: self.style_weight,
            content_weight: self.content_weight,
            tv_weight: self.tv_weight,
        }
    }

    pub fn content_keys(&self) -> Vec<LayerKey> {
        self.content_layers.iter().map(|k| LayerKey::from(k.as_str())).collect()
    }

    pub fn style_keys(&self) -> Vec<LayerKey> {
        self.style_layers.iter().map(|k| LayerKey::from(k.as_str())).collect()
    }

    /// The factory handed to `StyleTransfer::run`.
    pub fn optimizer_factory(&self) -> impl FnOnce(&Tensor) -> Box<dyn Optimizer> + use<> {
        let optimizer = self.optimizer;
        move |_| optimizer.build()
    }
}
