use ndarray::{Axis, Ix2, IxDyn, linalg};
use ndarray_rand::RandomExt;
use rand::Rng;
use rand_distr::StandardNormal;

use super::Param;
use crate::{Result, StyleErr, Tensor};

/// A fully connected layer, `y = x W^T + b` over `(batch, features)` inputs.
#[derive(Debug, Clone)]
pub struct Linear {
    dim: (usize, usize),
    weight: Param,
    bias: Param,

    // Forward metadata
    x: Option<Tensor>,
}

impl Linear {
    /// Creates a new `Linear` with Kaiming-normal weights and zero biases.
    ///
    /// # Arguments
    /// * `dim` - The (input, output) sizes.
    /// * `rng` - The random number generator used for the weights.
    pub fn new<R: Rng + ?Sized>(dim: (usize, usize), rng: &mut R) -> Self {
        let std = (2.0 / dim.0.max(1) as f32).sqrt();
        let weight = Tensor::random_using(IxDyn(&[dim.1, dim.0]), StandardNormal, rng) * std;

        Self::build(dim, weight, Tensor::zeros(IxDyn(&[dim.1])))
    }

    /// Creates a new `Linear` from a `(out, in)` weight matrix and an `(out)` bias.
    ///
    /// # Returns
    /// A new `Linear`, or `ShapeMismatch` if `weight` isn't a matrix or `bias` doesn't match its
    /// rows.
    pub fn from_params(weight: Tensor, bias: Tensor) -> Result<Self> {
        let [out, inp] = *weight.shape() else {
            return Err(StyleErr::shape_mismatch(
                "linear weight rank",
                &[weight.ndim()],
                &[2],
            ));
        };
        if bias.shape() != [out] {
            return Err(StyleErr::shape_mismatch("linear bias", bias.shape(), &[out]));
        }

        Ok(Self::build((inp, out), weight, bias))
    }

    fn build(dim: (usize, usize), weight: Tensor, bias: Tensor) -> Self {
        Self {
            dim,
            weight: Param::new(weight),
            bias: Param::new(bias),
            x: None,
        }
    }

    pub fn weight(&self) -> &Param {
        &self.weight
    }

    pub fn bias(&self) -> &Param {
        &self.bias
    }

    pub(crate) fn params_mut(&mut self) -> [(&'static str, &mut Param); 2] {
        [("weight", &mut self.weight), ("bias", &mut self.bias)]
    }

    pub fn forward(&mut self, x: Tensor) -> Result<Tensor> {
        if x.ndim() != 2 || x.shape()[1] != self.dim.0 {
            return Err(StyleErr::shape_mismatch(
                "linear input",
                x.shape(),
                &[x.shape().first().copied().unwrap_or(1), self.dim.0],
            ));
        }

        let x2 = x.view().into_dimensionality::<Ix2>()?;
        let w = self.weight.value().view().into_dimensionality::<Ix2>()?;

        let mut y = x2.dot(&w.t());
        y += self.bias.value();

        self.x = Some(x);
        Ok(y.into_dyn())
    }

    pub fn backward(&mut self, d: Tensor) -> Result<Tensor> {
        let Some(x) = &self.x else {
            return Err(StyleErr::MissingForward { layer: "linear" });
        };

        let d = d.into_dimensionality::<Ix2>()?;
        if d.dim() != (x.shape()[0], self.dim.1) {
            return Err(StyleErr::shape_mismatch(
                "linear gradient",
                d.shape(),
                &[x.shape()[0], self.dim.1],
            ));
        }

        let x2 = x.view().into_dimensionality::<Ix2>()?;
        let w = self.weight.value().view().into_dimensionality::<Ix2>()?;

        let mut dw = ndarray::Array2::<f32>::zeros((self.dim.1, self.dim.0));
        linalg::general_mat_mul(1.0, &d.t(), &x2, 0.0, &mut dw);
        let db = d.sum_axis(Axis(0));
        let dx = d.dot(&w);

        self.weight.accumulate(dw.into_dyn().view())?;
        self.bias.accumulate(db.into_dyn().view())?;

        Ok(dx.into_dyn())
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
    use rand::{SeedableRng, rngs::StdRng};

    #[test]
    fn forward_and_backward_of_a_known_layer() {
        let weight = array![[1.0f32, 2.0], [0.0, -1.0], [3.0, 1.0]].into_dyn();
        let bias = array![0.5f32, 0.0, -1.0].into_dyn();
        let mut linear = Linear::from_params(weight, bias).unwrap();

        let y = linear.forward(array![[1.0f32, 1.0]].into_dyn()).unwrap();
        let dx = linear
            .backward(array![[1.0f32, 1.0, 1.0]].into_dyn())
            .unwrap();

        assert_eq!(y, array![[3.5f32, -1.0, 3.0]].into_dyn());
        assert_eq!(dx, array![[4.0f32, 2.0]].into_dyn());
        assert_eq!(
            linear.weight().grad(),
            &array![[1.0f32, 1.0], [1.0, 1.0], [1.0, 1.0]].into_dyn()
        );
        assert_eq!(linear.bias().grad(), &array![1.0f32, 1.0, 1.0].into_dyn());
    }

    #[test]
    fn rejects_inputs_with_wrong_features() {
        let mut linear =
            Linear::from_params(Tensor::zeros(IxDyn(&[3, 2])), Tensor::zeros(IxDyn(&[3]))).unwrap();
        assert!(linear.forward(Tensor::zeros(IxDyn(&[1, 4]))).is_err());
    }

    #[test]
    fn explicit_params_must_have_linear_shapes() {
        let cube = Linear::from_params(Tensor::zeros(IxDyn(&[3, 2, 1])), Tensor::zeros(IxDyn(&[3])));
        let bad_bias =
            Linear::from_params(Tensor::zeros(IxDyn(&[3, 2])), Tensor::zeros(IxDyn(&[2])));

        assert!(matches!(cube, Err(StyleErr::ShapeMismatch { .. })));
        assert!(matches!(bad_bias, Err(StyleErr::ShapeMismatch { .. })));
    }

    #[test]
    fn backward_matches_finite_differences() {
        let make = || Layer::linear((6, 4), &mut StdRng::seed_from_u64(5));

        let x = spaced_input(&[2, 6], 0);
        assert_input_gradient(make, &x, 1);
    }
}
