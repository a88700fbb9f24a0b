use crate::{
    Result, StyleErr, Tensor,
    math::{mse_loss, mse_loss_prime},
};

/// Measures how far the activations reaching it are from a fixed target.
///
/// The layer is transparent: `forward` returns its input untouched and only records the loss,
/// `backward` adds the weighted loss gradient to the incoming one.
#[derive(Debug, Clone)]
pub struct ContentLoss {
    target: Tensor,
    weight: f32,
    loss: f32,

    // Forward metadata
    x: Option<Tensor>,
}

impl ContentLoss {
    /// Creates a new `ContentLoss` with a weight of 1.
    ///
    /// # Arguments
    /// * `target` - The target activations, owned so nothing upstream can ever write to them.
    pub fn new(target: Tensor) -> Self {
        Self {
            target,
            weight: 1.0,
            loss: 0.0,
            x: None,
        }
    }

    pub fn target(&self) -> &Tensor {
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
        self.loss = mse_loss(x.view(), self.target.view())?;
        self.x = Some(x.clone());
        Ok(x)
    }

    pub fn backward(&mut self, d: Tensor) -> Result<Tensor> {
        let Some(x) = &self.x else {
            return Err(StyleErr::MissingForward {
                layer: "content_loss",
            });
        };

        let grad = mse_loss_prime(x.view(), self.target.view())? * self.weight;
        if grad.shape() != d.shape() {
            return Err(StyleErr::shape_mismatch(
                "content loss gradient",
                d.shape(),
                grad.shape(),
            ));
        }

        Ok(d + grad)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use crate::arch::layers::{
        Layer,
        gradient_check::{assert_input_gradient, spaced_input},
    };

    #[test]
    fn forward_is_transparent_and_stores_the_loss() {
        let mut layer = ContentLoss::new(array![[1.0f32, 1.0]].into_dyn());
        let x = array![[2.0f32, 3.0]].into_dyn();

        let y = layer.forward(x.clone()).unwrap();

        assert_eq!(y, x);
        assert_eq!(layer.loss(), 2.5);
    }

    #[test]
    fn backward_adds_the_weighted_loss_gradient() {
        let mut layer = ContentLoss::new(array![[1.0f32, 1.0]].into_dyn());
        layer.set_weight(2.0);
        layer.forward(array![[2.0f32, 3.0]].into_dyn()).unwrap();

        let d = layer.backward(array![[1.0f32, 0.0]].into_dyn()).unwrap();

        // 2 * (x - t) / n * weight
        assert_eq!(d, array![[3.0f32, 4.0]].into_dyn());
    }

    #[test]
    fn mismatched_inputs_are_rejected() {
        let mut layer = ContentLoss::new(array![[1.0f32, 1.0]].into_dyn());
        assert!(layer.forward(array![[1.0f32]].into_dyn()).is_err());
    }

    #[test]
    fn backward_matches_finite_differences_of_the_loss() {
        let target = spaced_input(&[1, 2, 2, 2], 7);
        let make = || Layer::ContentLoss(ContentLoss::new(target.clone()));

        let x = spaced_input(&[1, 2, 2, 2], 0);
        assert_input_gradient(make, &x, 1);
    }
}
