use ndarray::ArrayViewD;

use crate::{Result, StyleErr, Tensor};

/// A learnable tensor together with its accumulated gradient.
#[derive(Debug, Clone)]
pub struct Param {
    value: Tensor,
    grad: Tensor,
}

impl Param {
    /// Creates a new `Param` with a zeroed gradient.
    pub fn new(value: Tensor) -> Self {
        let grad = Tensor::zeros(value.raw_dim());
        Self { value, grad }
    }

    pub fn value(&self) -> &Tensor {
        &self.value
    }

    pub fn grad(&self) -> &Tensor {
        &self.grad
    }

    /// Replaces the value of the parameter, keeping its shape.
    ///
    /// # Arguments
    /// * `value` - The new value.
    ///
    /// # Returns
    /// An error if `value` doesn't have the parameter's shape.
    pub fn set_value(&mut self, value: ArrayViewD<f32>) -> Result<()> {
        if value.shape() != self.value.shape() {
            return Err(StyleErr::shape_mismatch(
                "parameter value",
                value.shape(),
                self.value.shape(),
            ));
        }

        self.value.assign(&value);
        Ok(())
    }

    pub fn zero_grad(&mut self) {
        self.grad.fill(0.0);
    }

    /// Adds `grad` to the accumulated gradient.
    pub(crate) fn accumulate(&mut self, grad: ArrayViewD<f32>) -> Result<()> {
        if grad.shape() != self.grad.shape() {
            return Err(StyleErr::shape_mismatch(
                "parameter gradient",
                grad.shape(),
                self.grad.shape(),
            ));
        }

        self.grad += &grad;
        Ok(())
    }
}
