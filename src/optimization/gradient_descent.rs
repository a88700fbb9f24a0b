use super::{Closure, Optimizer};
use crate::{Result, StyleErr, Tensor};

/// Gradient descent optimization algorithm.
#[derive(Debug)]
pub struct GradientDescent {
    learning_rate: f32,
}

impl GradientDescent {
    /// Returns a new `GradientDescent`.
    ///
    /// # Arguments
    /// * `learning_rate` - The *length* of the steps taken on `step`.
    pub fn new(learning_rate: f32) -> Self {
        Self { learning_rate }
    }
}

impl Optimizer for GradientDescent {
    /// Makes a step in the opposite direction of the gradient, with a length of
    /// `learning_rate`.
    fn step(&mut self, param: &mut Tensor, closure: &mut Closure<'_>) -> Result<f32> {
        let eval = closure(param)?;
        if eval.grad.shape() != param.shape() {
            return Err(StyleErr::shape_mismatch(
                "optimizer gradient",
                eval.grad.shape(),
                param.shape(),
            ));
        }

        param.scaled_add(-self.learning_rate, &eval.grad);
        Ok(eval.loss)
    }
}
