use ndarray::{Array1, Axis};

use crate::{Result, StyleErr, Tensor, math::dims4};

/// Normalizes images channel-wise, `(img - mean) / std`, before they reach a pretrained network.
#[derive(Debug, Clone)]
pub struct Normalization {
    mean: Tensor,
    std: Tensor,
}

impl Normalization {
    /// Creates a new `Normalization`.
    ///
    /// # Arguments
    /// * `mean` - The per channel mean.
    /// * `std` - The per channel standard deviation.
    pub fn new(mean: &[f32], std: &[f32]) -> Result<Self> {
        if mean.len() != std.len() {
            return Err(StyleErr::shape_mismatch(
                "normalization std",
                &[std.len()],
                &[mean.len()],
            ));
        }

        Ok(Self {
            mean: per_channel(mean),
            std: per_channel(std),
        })
    }

    /// The statistics of the ImageNet training set, which torchvision's pretrained networks expect.
    pub fn imagenet() -> Self {
        Self {
            mean: per_channel(&[0.485, 0.456, 0.406]),
            std: per_channel(&[0.229, 0.224, 0.225]),
        }
    }

    fn check(&self, shape: &[usize], what: &'static str) -> Result<()> {
        let (_, c, _, _) = dims4(shape, what)?;
        if c != self.mean.len() {
            return Err(StyleErr::shape_mismatch(what, &[c], &[self.mean.len()]));
        }
        Ok(())
    }

    pub fn forward(&mut self, x: Tensor) -> Result<Tensor> {
        self.check(x.shape(), "normalization input")?;
        Ok((x - &self.mean) / &self.std)
    }

    pub fn backward(&mut self, d: Tensor) -> Result<Tensor> {
        self.check(d.shape(), "normalization gradient")?;
        Ok(d / &self.std)
    }
}

/// [1 x C x 1 x 1] so that it broadcasts over [B x C x H x W] images.
fn per_channel(values: &[f32]) -> Tensor {
    Array1::from_vec(values.to_vec())
        .insert_axis(Axis(0))
        .insert_axis(Axis(2))
        .insert_axis(Axis(3))
        .into_dyn()
}

#[cfg(test)]
mod tests {
    use ndarray::IxDyn;

    use super::*;
    use ndarray::array;
    use crate::arch::layers::{
        Layer,
        gradient_check::{assert_input_gradient, spaced_input},
    };

    #[test]
    fn normalizes_each_channel() {
        let mut norm = Normalization::new(&[1.0, 0.0], &[2.0, 0.5]).unwrap();

        let y = norm
            .forward(array![[[[3.0f32]], [[1.0]]]].into_dyn())
            .unwrap();
        let d = norm
            .backward(array![[[[1.0f32]], [[1.0]]]].into_dyn())
            .unwrap();

        assert_eq!(y, array![[[[1.0f32]], [[2.0]]]].into_dyn());
        assert_eq!(d, array![[[[0.5f32]], [[2.0]]]].into_dyn());
    }

    #[test]
    fn imagenet_has_three_channels() {
        let mut norm = Normalization::imagenet();
        assert!(norm.forward(Tensor::zeros(IxDyn(&[1, 3, 2, 2]))).is_ok());
        assert!(norm.forward(Tensor::zeros(IxDyn(&[1, 1, 2, 2]))).is_err());
    }

    #[test]
    fn backward_matches_finite_differences() {
        let make = || -> Layer { Normalization::new(&[0.5, 0.2], &[0.25, 2.0]).unwrap().into() };

        let x = spaced_input(&[1, 2, 3, 3], 0);
        assert_input_gradient(make, &x, 1);
    }
}
