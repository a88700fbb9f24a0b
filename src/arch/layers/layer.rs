use rand::Rng;

use super::{
    AdaptiveAvgPool2d, BatchNorm2d, Conv2d, CustomLayer, Dropout, Flatten, Linear, MaxPool2d,
    Normalization, Param, Relu,
};
use crate::{
    Result, Tensor,
    arch::{
        loss::{ContentLoss, StyleLoss},
        naming::LayerKind,
    },
};

/// A single computation step of a network.
#[derive(Debug, Clone)]
pub enum Layer {
    Conv(Conv2d),
    Relu(Relu),
    Pool(MaxPool2d),
    BatchNorm(BatchNorm2d),
    AvgPool(AdaptiveAvgPool2d),
    Dropout(Dropout),
    Linear(Linear),
    Flatten(Flatten),
    Normalization(Normalization),
    ContentLoss(ContentLoss),
    StyleLoss(StyleLoss),
    Custom(Box<dyn CustomLayer>),
}
use Layer::*;

impl Layer {
    pub fn conv<R: Rng + ?Sized>(
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        stride: usize,
        padding: usize,
        rng: &mut R,
    ) -> Self {
        Self::Conv(Conv2d::new(
            in_channels,
            out_channels,
            (kernel, kernel),
            stride,
            padding,
            rng,
        ))
    }

    pub fn relu() -> Self {
        Self::Relu(Relu::new())
    }

    pub fn max_pool(kernel: usize, stride: usize) -> Self {
        Self::Pool(MaxPool2d::new(kernel, stride))
    }

    pub fn batch_norm(num_features: usize) -> Self {
        Self::BatchNorm(BatchNorm2d::new(num_features))
    }

    pub fn avg_pool(output: (usize, usize)) -> Self {
        Self::AvgPool(AdaptiveAvgPool2d::new(output))
    }

    pub fn dropout(p: f32, seed: u64) -> Self {
        Self::Dropout(Dropout::new(p, seed))
    }

    pub fn linear<R: Rng + ?Sized>(dim: (usize, usize), rng: &mut R) -> Self {
        Self::Linear(Linear::new(dim, rng))
    }

    pub fn flatten() -> Self {
        Self::Flatten(Flatten::new())
    }

    pub fn custom<L: CustomLayer + 'static>(layer: L) -> Self {
        Self::Custom(Box::new(layer))
    }

    /// Returns the semantic category of this layer.
    pub fn kind(&self) -> LayerKind {
        match self {
            Conv(_) => LayerKind::Conv,
            Relu(_) => LayerKind::Relu,
            Pool(_) => LayerKind::Pool,
            BatchNorm(_) => LayerKind::BatchNorm,
            AvgPool(_) => LayerKind::AvgPool,
            Dropout(_) => LayerKind::Dropout,
            Linear(_) => LayerKind::Linear,
            Flatten(_) => LayerKind::Flatten,
            Normalization(_) => LayerKind::Normalization,
            ContentLoss(_) => LayerKind::ContentLoss,
            StyleLoss(_) => LayerKind::StyleLoss,
            Custom(l) => LayerKind::from_name(l.name().unwrap_or_else(|| l.type_name())),
        }
    }

    /// The unweighted loss stored by the last forward pass, for loss layers.
    pub fn loss(&self) -> Option<f32> {
        match self {
            ContentLoss(l) => Some(l.loss()),
            StyleLoss(l) => Some(l.loss()),
            _ => None,
        }
    }

    pub fn is_loss(&self) -> bool {
        matches!(self, ContentLoss(_) | StyleLoss(_))
    }

    pub fn forward(&mut self, x: Tensor) -> Result<Tensor> {
        match self {
            Conv(l) => l.forward(x),
            Relu(l) => l.forward(x),
            Pool(l) => l.forward(x),
            BatchNorm(l) => l.forward(x),
            AvgPool(l) => l.forward(x),
            Dropout(l) => l.forward(x),
            Linear(l) => l.forward(x),
            Flatten(l) => l.forward(x),
            Normalization(l) => l.forward(x),
            ContentLoss(l) => l.forward(x),
            StyleLoss(l) => l.forward(x),
            Custom(l) => l.forward(x),
        }
    }

    pub fn backward(&mut self, d: Tensor) -> Result<Tensor> {
        match self {
            Conv(l) => l.backward(d),
            Relu(l) => l.backward(d),
            Pool(l) => l.backward(d),
            BatchNorm(l) => l.backward(d),
            AvgPool(l) => l.backward(d),
            Dropout(l) => l.backward(d),
            Linear(l) => l.backward(d),
            Flatten(l) => l.backward(d),
            Normalization(l) => l.backward(d),
            ContentLoss(l) => l.backward(d),
            StyleLoss(l) => l.backward(d),
            Custom(l) => l.backward(d),
        }
    }

    /// The learnable parameters of the layer, by their torch-style names.
    pub fn params(&self) -> Vec<(&'static str, &Param)> {
        match self {
            Conv(l) => vec![("weight", l.weight()), ("bias", l.bias())],
            BatchNorm(l) => vec![("weight", l.weight()), ("bias", l.bias())],
            Linear(l) => vec![("weight", l.weight()), ("bias", l.bias())],
            Custom(l) => l.params(),
            _ => Vec::new(),
        }
    }

    pub fn params_mut(&mut self) -> Vec<(&'static str, &mut Param)> {
        match self {
            Conv(l) => l.params_mut().into(),
            BatchNorm(l) => l.params_mut().into(),
            Linear(l) => l.params_mut().into(),
            Custom(l) => l.params_mut(),
            _ => Vec::new(),
        }
    }

    /// Non-learnable state that is still part of the pretrained weights.
    pub fn buffers_mut(&mut self) -> Vec<(&'static str, &mut Tensor)> {
        match self {
            BatchNorm(l) => l.buffers_mut().into(),
            _ => Vec::new(),
        }
    }

    pub fn zero_grad(&mut self) {
        for (_, param) in self.params_mut() {
            param.zero_grad();
        }
    }

    pub fn set_training(&mut self, training: bool) {
        match self {
            Dropout(l) => l.set_training(training),
            Custom(l) => l.set_training(training),
            _ => {}
        }
    }

    /// Rewrites the layer to its non-mutating equivalent, if it was declared as mutating.
    pub(crate) fn make_non_mutating(&mut self) {
        if let Relu(l) = self {
            l.set_inplace(false);
        }
    }
}

impl From<Conv2d> for Layer {
    fn from(value: Conv2d) -> Self {
        Self::Conv(value)
    }
}

impl From<Normalization> for Layer {
    fn from(value: Normalization) -> Self {
        Self::Normalization(value)
    }
}

impl From<ContentLoss> for Layer {
    fn from(value: ContentLoss) -> Self {
        Self::ContentLoss(value)
    }
}

impl From<StyleLoss> for Layer {
    fn from(value: StyleLoss) -> Self {
        Self::StyleLoss(value)
    }
}
