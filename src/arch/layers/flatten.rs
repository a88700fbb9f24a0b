use ndarray::IxDyn;

use crate::{Result, StyleErr, Tensor};

/// Flattens every sample into a row: `(n, ...) -> (n, rest)`.
#[derive(Debug, Clone, Default)]
pub struct Flatten {
    input_shape: Option<Vec<usize>>,
}

impl Flatten {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn forward(&mut self, x: Tensor) -> Result<Tensor> {
        let n = x.shape().first().copied().unwrap_or(1).max(1);
        let rest = x.len() / n;

        let y = x.to_shape(IxDyn(&[n, rest]))?.into_owned();
        self.input_shape = Some(x.shape().to_vec());
        Ok(y)
    }

    pub fn backward(&mut self, d: Tensor) -> Result<Tensor> {
        let Some(shape) = &self.input_shape else {
            return Err(StyleErr::MissingForward { layer: "flatten" });
        };

        Ok(d.to_shape(IxDyn(shape))?.into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::layers::{
        Layer,
        gradient_check::{assert_input_gradient, spaced_input},
    };

    #[test]
    fn flattens_and_restores_shape() {
        let mut flatten = Flatten::new();

        let y = flatten.forward(Tensor::ones(IxDyn(&[2, 3, 2, 2]))).unwrap();
        let dx = flatten.backward(y.clone()).unwrap();

        assert_eq!(y.shape(), &[2, 12]);
        assert_eq!(dx.shape(), &[2, 3, 2, 2]);
    }

    #[test]
    fn backward_matches_finite_differences() {
        let x = spaced_input(&[2, 2, 2, 2], 0);
        assert_input_gradient(Layer::flatten, &x, 1);
    }
}
