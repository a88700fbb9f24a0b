use ndarray::{Array4, Ix4};

use crate::{Result, StyleErr, Tensor, math::dims4};

/// Max pooling over square windows.
#[derive(Debug, Clone)]
pub struct MaxPool2d {
    kernel: usize,
    stride: usize,

    // Forward metadata: input dims and, for each output, the flat (y * w + x) argmax of its window
    input_dim: Option<(usize, usize, usize, usize)>,
    argmax: Array4<usize>,
}

impl MaxPool2d {
    /// Creates a new `MaxPool2d`.
    ///
    /// # Arguments
    /// * `kernel` - The side of the pooling window.
    /// * `stride` - The step between windows.
    pub fn new(kernel: usize, stride: usize) -> Self {
        Self {
            kernel: kernel.max(1),
            stride: stride.max(1),
            input_dim: None,
            argmax: Array4::zeros((0, 0, 0, 0)),
        }
    }

    pub fn forward(&mut self, x: Tensor) -> Result<Tensor> {
        let (n, c, h, w) = dims4(x.shape(), "max pool input")?;
        if h < self.kernel || w < self.kernel {
            return Err(StyleErr::shape_mismatch(
                "max pool input",
                &[h, w],
                &[self.kernel, self.kernel],
            ));
        }

        let (k, s) = (self.kernel, self.stride);
        let (oh, ow) = ((h - k) / s + 1, (w - k) / s + 1);
        let x = x.into_dimensionality::<Ix4>()?;

        let mut out = Array4::<f32>::zeros((n, c, oh, ow));
        let mut argmax = Array4::<usize>::zeros((n, c, oh, ow));

        for ((b, ch, oy, ox), v) in out.indexed_iter_mut() {
            let mut best = f32::NEG_INFINITY;
            let mut best_at = 0;

            for y in oy * s..oy * s + k {
                for xx in ox * s..ox * s + k {
                    let val = x[[b, ch, y, xx]];
                    if val > best {
                        best = val;
                        best_at = y * w + xx;
                    }
                }
            }

            *v = best;
            argmax[[b, ch, oy, ox]] = best_at;
        }

        self.input_dim = Some((n, c, h, w));
        self.argmax = argmax;
        Ok(out.into_dyn())
    }

    pub fn backward(&mut self, d: Tensor) -> Result<Tensor> {
        let Some((n, c, h, w)) = self.input_dim else {
            return Err(StyleErr::MissingForward { layer: "pool" });
        };

        if d.shape() != self.argmax.shape() {
            return Err(StyleErr::shape_mismatch(
                "max pool gradient",
                d.shape(),
                self.argmax.shape(),
            ));
        }

        let d = d.into_dimensionality::<Ix4>()?;
        let mut dx = Array4::<f32>::zeros((n, c, h, w));

        for ((b, ch, oy, ox), &at) in self.argmax.indexed_iter() {
            dx[[b, ch, at / w, at % w]] += d[[b, ch, oy, ox]];
        }

        Ok(dx.into_dyn())
    }
}
