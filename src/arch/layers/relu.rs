use crate::{Result, StyleErr, Tensor};

/// Rectified linear unit.
///
/// `inplace` only records how the layer was declared. Layers never overwrite tensors shared
/// with the caller, so flattening a network resets it to `false`.
#[derive(Debug, Clone, Default)]
pub struct Relu {
    inplace: bool,
    a: Option<Tensor>,
}

impl Relu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_inplace(inplace: bool) -> Self {
        Self { inplace, a: None }
    }

    pub fn is_inplace(&self) -> bool {
        self.inplace
    }

    pub(crate) fn set_inplace(&mut self, inplace: bool) {
        self.inplace = inplace;
    }

    pub fn forward(&mut self, x: Tensor) -> Result<Tensor> {
        let a = x.mapv_into(|x| x.max(0.0));

        self.a = Some(a.clone());
        Ok(a)
    }

    pub fn backward(&mut self, mut d: Tensor) -> Result<Tensor> {
        let Some(a) = &self.a else {
            return Err(StyleErr::MissingForward { layer: "relu" });
        };

        if a.shape() != d.shape() {
            return Err(StyleErr::shape_mismatch("relu gradient", d.shape(), a.shape()));
        }

        d.zip_mut_with(a, |d, &a| {
            if a <= 0.0 {
                *d = 0.0;
            }
        });

        Ok(d)
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
    fn forward_clips_negatives_and_backward_masks() {
        let mut relu = Relu::new();
        let x = array![[-1.0f32, 0.0, 2.0]].into_dyn();

        let y = relu.forward(x).unwrap();
        let d = relu.backward(array![[5.0f32, 5.0, 5.0]].into_dyn()).unwrap();

        assert_eq!(y, array![[0.0f32, 0.0, 2.0]].into_dyn());
        assert_eq!(d, array![[0.0f32, 0.0, 5.0]].into_dyn());
    }

    #[test]
    fn backward_matches_finite_differences() {
        let x = spaced_input(&[1, 2, 3, 3], 0);
        assert_input_gradient(Layer::relu, &x, 1);
    }
}
