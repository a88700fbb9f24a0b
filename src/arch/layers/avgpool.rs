use ndarray::{Array4, Ix4, s};

use crate::{Result, StyleErr, Tensor, math::dims4};

/// Average pooling to a fixed output size, whatever the input size.
#[derive(Debug, Clone)]
pub struct AdaptiveAvgPool2d {
    output: (usize, usize),
    input_dim: Option<(usize, usize, usize, usize)>,
}

/// The `[start, end)` input range averaged into output cell `i`.
fn bin(i: usize, input: usize, output: usize) -> (usize, usize) {
    let start = i * input / output;
    let end = ((i + 1) * input).div_ceil(output);
    (start, end)
}

impl AdaptiveAvgPool2d {
    pub fn new(output: (usize, usize)) -> Self {
        Self {
            output: (output.0.max(1), output.1.max(1)),
            input_dim: None,
        }
    }

    pub fn forward(&mut self, x: Tensor) -> Result<Tensor> {
        let (n, c, h, w) = dims4(x.shape(), "adaptive avg pool input")?;
        let (oh, ow) = self.output;
        let x = x.into_dimensionality::<Ix4>()?;

        let mut out = Array4::<f32>::zeros((n, c, oh, ow));
        for ((b, ch, oy, ox), v) in out.indexed_iter_mut() {
            let (y0, y1) = bin(oy, h, oh);
            let (x0, x1) = bin(ox, w, ow);
            let window = x.slice(s![b, ch, y0..y1, x0..x1]);
            *v = window.mean().unwrap_or_default();
        }

        self.input_dim = Some((n, c, h, w));
        Ok(out.into_dyn())
    }

    pub fn backward(&mut self, d: Tensor) -> Result<Tensor> {
        let Some((n, c, h, w)) = self.input_dim else {
            return Err(StyleErr::MissingForward { layer: "avgpool" });
        };

        let (oh, ow) = self.output;
        if d.shape() != [n, c, oh, ow] {
            return Err(StyleErr::shape_mismatch(
                "adaptive avg pool gradient",
                d.shape(),
                &[n, c, oh, ow],
            ));
        }

        let d = d.into_dimensionality::<Ix4>()?;
        let mut dx = Array4::<f32>::zeros((n, c, h, w));

        for ((b, ch, oy, ox), &g) in d.indexed_iter() {
            let (y0, y1) = bin(oy, h, oh);
            let (x0, x1) = bin(ox, w, ow);
            let count = ((y1 - y0) * (x1 - x0)).max(1) as f32;
            let mut window = dx.slice_mut(s![b, ch, y0..y1, x0..x1]);
            window += g / count;
        }

        Ok(dx.into_dyn())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{IxDyn, array};
    use crate::arch::layers::{
        Layer,
        gradient_check::{assert_input_gradient, spaced_input},
    };

    #[test]
    fn bins_cover_the_input_with_overlap_when_uneven() {
        assert_eq!(bin(0, 5, 2), (0, 3));
        assert_eq!(bin(1, 5, 2), (2, 5));
        assert_eq!(bin(3, 12, 6), (6, 8));
    }

    #[test]
    fn forward_averages_and_backward_spreads() {
        let mut pool = AdaptiveAvgPool2d::new((1, 1));
        let x = array![[[[1.0f32, 2.0], [3.0, 6.0]]]].into_dyn();

        let y = pool.forward(x).unwrap();
        let dx = pool.backward(Tensor::ones(IxDyn(&[1, 1, 1, 1]))).unwrap();

        assert_eq!(y, array![[[[3.0f32]]]].into_dyn());
        assert_eq!(dx, Tensor::from_elem(IxDyn(&[1, 1, 2, 2]), 0.25));
    }

    #[test]
    fn backward_matches_finite_differences_when_shrinking_and_growing() {
        let x = spaced_input(&[1, 2, 5, 5], 0);
        assert_input_gradient(|| Layer::avg_pool((3, 3)), &x, 1);

        let x = spaced_input(&[1, 1, 3, 3], 2);
        assert_input_gradient(|| Layer::avg_pool((5, 5)), &x, 3);
    }
}
