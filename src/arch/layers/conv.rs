use ndarray::{Array2, Array3, ArrayView2, ArrayView3, Axis, Ix4, IxDyn, Zip, prelude::*};
use ndarray_rand::RandomExt;
use rand::Rng;
use rand_distr::StandardNormal;

use super::Param;
use crate::{Result, StyleErr, Tensor, math::dims4};

/// A 2D convolution over NCHW tensors with square strides and symmetric zero padding.
///
/// Optimizations:
///   1. The im2col buffers are kept per sample for the backward pass, trading memory for not
///      having to unfold the input twice.
#[derive(Debug, Clone)]
pub struct Conv2d {
    in_channels: usize,
    out_channels: usize,
    kernel: (usize, usize),
    stride: usize,
    padding: usize,

    weight: Param,
    bias: Param,

    // Forward metadata
    input_dim: Option<(usize, usize, usize, usize)>,
    cols: Vec<Array2<f32>>,
}

impl Conv2d {
    /// Creates a new `Conv2d` with Kaiming-normal weights and zero biases.
    ///
    /// # Arguments
    /// * `in_channels` - The number of channels of the input.
    /// * `out_channels` - The number of feature maps produced.
    /// * `kernel` - The (height, width) of the kernel.
    /// * `stride` - The stride of the convolution.
    /// * `padding` - The zero padding added on every side of the input.
    /// * `rng` - The random number generator used for the weights.
    ///
    /// # Returns
    /// A new `Conv2d` instance.
    pub fn new<R: Rng + ?Sized>(
        in_channels: usize,
        out_channels: usize,
        kernel: (usize, usize),
        stride: usize,
        padding: usize,
        rng: &mut R,
    ) -> Self {
        let fan_in = (in_channels * kernel.0 * kernel.1).max(1) as f32;
        let std = (2.0 / fan_in).sqrt();
        let shape = IxDyn(&[out_channels, in_channels, kernel.0, kernel.1]);
        let weight = Tensor::random_using(shape, StandardNormal, rng) * std;

        let bias = Tensor::zeros(IxDyn(&[out_channels]));
        Self::build(weight, bias, (out_channels, in_channels), kernel, stride, padding)
    }

    /// Creates a new `Conv2d` from explicit parameters.
    ///
    /// # Arguments
    /// * `weight` - The kernels, shaped `(out_channels, in_channels, kh, kw)`.
    /// * `bias` - The biases, shaped `(out_channels)`.
    /// * `stride` - The stride of the convolution.
    /// * `padding` - The zero padding added on every side of the input.
    ///
    /// # Returns
    /// A new `Conv2d`, or `ShapeMismatch` if `weight` isn't 4-dimensional or `bias` doesn't have
    /// one entry per output channel.
    pub fn from_params(
        weight: Tensor,
        bias: Tensor,
        stride: usize,
        padding: usize,
    ) -> Result<Self> {
        let [out_channels, in_channels, kh, kw] = *weight.shape() else {
            return Err(StyleErr::shape_mismatch(
                "conv weight rank",
                &[weight.ndim()],
                &[4],
            ));
        };
        if bias.shape() != [out_channels] {
            return Err(StyleErr::shape_mismatch(
                "conv bias",
                bias.shape(),
                &[out_channels],
            ));
        }

        Ok(Self::build(
            weight,
            bias,
            (out_channels, in_channels),
            (kh, kw),
            stride,
            padding,
        ))
    }

    fn build(
        weight: Tensor,
        bias: Tensor,
        (out_channels, in_channels): (usize, usize),
        kernel: (usize, usize),
        stride: usize,
        padding: usize,
    ) -> Self {
        Self {
            in_channels,
            out_channels,
            kernel,
            stride: stride.max(1),
            padding,
            weight: Param::new(weight),
            bias: Param::new(bias),
            input_dim: None,
            cols: Vec::new(),
        }
    }

    pub fn in_channels(&self) -> usize {
        self.in_channels
    }

    pub fn out_channels(&self) -> usize {
        self.out_channels
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

    fn output_dim(&self, h: usize, w: usize) -> Result<(usize, usize)> {
        let (kh, kw) = self.kernel;
        let (hp, wp) = (h + 2 * self.padding, w + 2 * self.padding);
        if hp < kh || wp < kw {
            return Err(StyleErr::shape_mismatch(
                "conv input",
                &[h, w],
                &[kh.saturating_sub(2 * self.padding), kw.saturating_sub(2 * self.padding)],
            ));
        }

        Ok(((hp - kh) / self.stride + 1, (wp - kw) / self.stride + 1))
    }

    pub fn forward(&mut self, x: Tensor) -> Result<Tensor> {
        let (n, c, h, w) = dims4(x.shape(), "conv input")?;
        if c != self.in_channels {
            return Err(StyleErr::shape_mismatch(
                "conv input channels",
                &[c],
                &[self.in_channels],
            ));
        }

        let (oh, ow) = self.output_dim(h, w)?;
        let (kh, kw) = self.kernel;
        let kernels = self
            .weight
            .value()
            .to_shape((self.out_channels, c * kh * kw))?;
        let bias = self.bias.value().to_shape((self.out_channels, 1))?;
        let x = x.into_dimensionality::<Ix4>()?;

        let mut out = Array4::zeros((n, self.out_channels, oh, ow));
        self.cols.clear();

        for (i, sample) in x.outer_iter().enumerate() {
            let cols = self.im2col(sample, (oh, ow));
            let y = kernels.dot(&cols) + &bias;
            out.index_axis_mut(Axis(0), i)
                .assign(&y.into_shape_with_order((self.out_channels, oh, ow))?);
            self.cols.push(cols);
        }

        self.input_dim = Some((n, c, h, w));
        Ok(out.into_dyn())
    }

    pub fn backward(&mut self, d: Tensor) -> Result<Tensor> {
        let Some((n, c, h, w)) = self.input_dim else {
            return Err(StyleErr::MissingForward { layer: "conv" });
        };

        let (dn, dc, oh, ow) = dims4(d.shape(), "conv gradient")?;
        let expected = self.output_dim(h, w)?;
        if (dn, dc, oh, ow) != (n, self.out_channels, expected.0, expected.1) {
            return Err(StyleErr::shape_mismatch(
                "conv gradient",
                d.shape(),
                &[n, self.out_channels, expected.0, expected.1],
            ));
        }

        let (kh, kw) = self.kernel;
        let kernels = self
            .weight
            .value()
            .to_shape((self.out_channels, c * kh * kw))?
            .into_owned();
        let d = d.into_dimensionality::<Ix4>()?;

        let mut dw = Array2::<f32>::zeros((self.out_channels, c * kh * kw));
        let mut dx = Array4::<f32>::zeros((n, c, h, w));

        for (i, d_i) in d.outer_iter().enumerate() {
            let d2 = d_i.to_shape((self.out_channels, oh * ow))?;
            dw += &d2.dot(&self.cols[i].t());

            let dcols = kernels.t().dot(&d2);
            dx.index_axis_mut(Axis(0), i)
                .assign(&self.col2im(dcols.view(), (c, h, w), (oh, ow)));
        }

        let db = d.sum_axis(Axis(3)).sum_axis(Axis(2)).sum_axis(Axis(0));
        let dw = dw.into_shape_with_order(IxDyn(&[self.out_channels, c, kh, kw]))?;

        self.weight.accumulate(dw.view())?;
        self.bias.accumulate(db.into_dyn().view())?;

        Ok(dx.into_dyn())
    }

    /// Unfolds every receptive field of `sample` into a column.
    ///
    /// # Returns
    /// A `(channels * kh * kw, oh * ow)` matrix.
    fn im2col(&self, sample: ArrayView3<f32>, (oh, ow): (usize, usize)) -> Array2<f32> {
        let (c, h, w) = sample.dim();
        let (kh, kw) = self.kernel;
        let (stride, pad) = (self.stride, self.padding);

        let mut cols = Array2::zeros((c * kh * kw, oh * ow));
        Zip::indexed(&mut cols).par_for_each(|(row, col), v| {
            let ch = row / (kh * kw);
            let (ki, kj) = ((row / kw) % kh, row % kw);
            let (oy, ox) = (col / ow, col % ow);

            let y = (oy * stride + ki).checked_sub(pad);
            let x = (ox * stride + kj).checked_sub(pad);
            if let (Some(y), Some(x)) = (y, x) {
                if y < h && x < w {
                    *v = sample[[ch, y, x]];
                }
            }
        });

        cols
    }

    /// Folds columns back into an image, summing overlapping receptive fields.
    fn col2im(
        &self,
        dcols: ArrayView2<f32>,
        (c, h, w): (usize, usize, usize),
        (oh, ow): (usize, usize),
    ) -> Array3<f32> {
        let (kh, kw) = self.kernel;
        let (stride, pad) = (self.stride, self.padding);

        let mut dx = Array3::zeros((c, h, w));
        Zip::indexed(&mut dx).par_for_each(|(ch, y, x), v| {
            let mut acc = 0.0;
            for ki in 0..kh {
                let Some(ty) = (y + pad).checked_sub(ki) else {
                    continue;
                };
                if ty % stride != 0 || ty / stride >= oh {
                    continue;
                }

                for kj in 0..kw {
                    let Some(tx) = (x + pad).checked_sub(kj) else {
                        continue;
                    };
                    if tx % stride != 0 || tx / stride >= ow {
                        continue;
                    }

                    let row = (ch * kh + ki) * kw + kj;
                    let col = (ty / stride) * ow + tx / stride;
                    acc += dcols[[row, col]];
                }
            }
            *v = acc;
        });

        dx
    }
}
