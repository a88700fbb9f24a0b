use ndarray::{Array1, Axis, Ix4, IxDyn};

use super::Param;
use crate::{Result, StyleErr, Tensor, math::dims4};

/// Batch normalization over the channels of NCHW tensors.
///
/// The networks in this crate are only ever evaluated, so normalization always uses the
/// running statistics, never the batch ones.
#[derive(Debug, Clone)]
pub struct BatchNorm2d {
    num_features: usize,
    eps: f32,

    weight: Param,
    bias: Param,
    running_mean: Tensor,
    running_var: Tensor,

    // Forward metadata
    x_hat: Option<Tensor>,
}

impl BatchNorm2d {
    /// Creates a new `BatchNorm2d` with unit scale, zero shift and identity statistics.
    pub fn new(num_features: usize) -> Self {
        let shape = IxDyn(&[num_features]);

        Self {
            num_features,
            eps: 1e-5,
            weight: Param::new(Tensor::ones(shape.clone())),
            bias: Param::new(Tensor::zeros(shape.clone())),
            running_mean: Tensor::zeros(shape.clone()),
            running_var: Tensor::ones(shape),
            x_hat: None,
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

    pub(crate) fn buffers_mut(&mut self) -> [(&'static str, &mut Tensor); 2] {
        [
            ("running_mean", &mut self.running_mean),
            ("running_var", &mut self.running_var),
        ]
    }

    /// Per channel `1 / sqrt(var + eps)`, shaped to broadcast over NCHW.
    fn inv_std(&self) -> Result<Tensor> {
        let inv = self.running_var.mapv(|v| 1.0 / (v + self.eps).sqrt());
        Ok(inv.into_shape_with_order(IxDyn(&[1, self.num_features, 1, 1]))?)
    }

    fn per_channel(&self, t: &Tensor) -> Result<Tensor> {
        Ok(t.to_shape(IxDyn(&[1, self.num_features, 1, 1]))?.into_owned())
    }

    pub fn forward(&mut self, x: Tensor) -> Result<Tensor> {
        let (_, c, _, _) = dims4(x.shape(), "batch norm input")?;
        if c != self.num_features {
            return Err(StyleErr::shape_mismatch(
                "batch norm input channels",
                &[c],
                &[self.num_features],
            ));
        }

        let mean = self.per_channel(&self.running_mean)?;
        let gamma = self.per_channel(self.weight.value())?;
        let beta = self.per_channel(self.bias.value())?;

        let x_hat = (x - &mean) * &self.inv_std()?;
        let y = &x_hat * &gamma + &beta;

        self.x_hat = Some(x_hat);
        Ok(y)
    }

    pub fn backward(&mut self, d: Tensor) -> Result<Tensor> {
        let Some(x_hat) = &self.x_hat else {
            return Err(StyleErr::MissingForward { layer: "bn" });
        };

        if x_hat.shape() != d.shape() {
            return Err(StyleErr::shape_mismatch(
                "batch norm gradient",
                d.shape(),
                x_hat.shape(),
            ));
        }

        let sum_nhw = |t: Tensor| -> Result<Array1<f32>> {
            let t = t.into_dimensionality::<Ix4>()?;
            Ok(t.sum_axis(Axis(3)).sum_axis(Axis(2)).sum_axis(Axis(0)))
        };

        let d_gamma = sum_nhw(&d * x_hat)?;
        let d_beta = sum_nhw(d.clone())?;
        let dx = d * &(self.per_channel(self.weight.value())? * &self.inv_std()?);

        self.weight.accumulate(d_gamma.into_dyn().view())?;
        self.bias.accumulate(d_beta.into_dyn().view())?;

        Ok(dx)
    }
}
