use ndarray::{Array2, ArrayViewD};

use crate::{
    Result, StyleErr, Tensor,
    math::{gram_matrix, gram_matrix_backward, mse_loss},
};

/// Measures how far the Gram matrix of the activations reaching it is from a fixed target.
///
/// Like [`ContentLoss`](super::ContentLoss), it's transparent in the forward direction.
#[derive(Debug, Clone)]
pub struct StyleLoss {
    target: Array2<f32>,
    weight: f32,
    loss: f32,

    // Forward metadata
    x: Option<Tensor>,
    gram: Option<Array2<f32>>,
}

impl StyleLoss {
    /// Creates a new `StyleLoss` targeting the Gram matrix of `features`.
    pub fn new(features: ArrayViewD<f32>) -> Result<Self> {
        Ok(Self::from_gram(gram_matrix(features)?))
    }

    /// Creates a new `StyleLoss` from an already computed target Gram matrix.
    pub fn from_gram(target: Array2<f32>) -> Self {
        Self {
            target,
            weight: 1.0,
            loss: 0.0,
            x: None,
            gram: None,
        }
    }

    pub fn target(&self) -> &Array2<f32> {
        &self.target
    }

    /// The unweighted loss of the last forward pass.
    pub fn loss(&self) -> f32 {
        self.loss
    }

    pub fn weight(&self) -> f32 {
        self.weight
    }

    pub fn set_weight(&mut self, weight: f32) {
        self.weight = weight;
    }

    pub fn forward(&mut self, x: Tensor) -> Result<Tensor> {
        let gram = gram_matrix(x.view())?;
        self.loss = mse_loss(gram.view().into_dyn(), self.target.view().into_dyn())?;

        self.gram = Some(gram);
        self.x = Some(x.clone());
        Ok(x)
    }

    pub fn backward(&mut self, d: Tensor) -> Result<Tensor> {
        let (Some(x), Some(gram)) = (&self.x, &self.gram) else {
            return Err(StyleErr::MissingForward { layer: "style_loss" });
        };

        let scale = 2.0 * self.weight / gram.len().max(1) as f32;
        let d_gram = (gram - &self.target) * scale;
        let grad = gram_matrix_backward(x.view(), d_gram.view())?;

        if grad.shape() != d.shape() {
            return Err(StyleErr::shape_mismatch(
                "style loss gradient",
                d.shape(),
                grad.shape(),
            ));
        }

        Ok(d + grad)
    }
}
