use ndarray::{ArrayViewD, Ix4, s};

use crate::{Result, Tensor, math::dims4};

/// Total variation of a batch of images: the sum of the absolute differences between
/// horizontally and vertically adjacent pixels.
///
/// # Arguments
/// * `image` - An NCHW image tensor.
///
/// # Returns
/// The value of the penalty and its gradient with respect to `image`.
pub fn total_variation_loss(image: ArrayViewD<f32>) -> Result<(f32, Tensor)> {
    dims4(image.shape(), "total variation input")?;
    let x = image.into_dimensionality::<Ix4>()?;

    let dw = &x.slice(s![.., .., .., 1..]) - &x.slice(s![.., .., .., ..-1]);
    let dh = &x.slice(s![.., .., 1.., ..]) - &x.slice(s![.., .., ..-1, ..]);

    let value = dw.iter().map(|v| v.abs()).sum::<f32>() + dh.iter().map(|v| v.abs()).sum::<f32>();

    // d|v|/dv, taken as 0 where v == 0
    let sign = |v: f32| -> f32 {
        if v > 0.0 {
            1.0
        } else if v < 0.0 {
            -1.0
        } else {
            0.0
        }
    };
    let sw = dw.mapv(sign);
    let sh = dh.mapv(sign);

    let mut grad = ndarray::Array4::<f32>::zeros(x.raw_dim());
    {
        let mut right = grad.slice_mut(s![.., .., .., 1..]);
        right += &sw;
    }
    {
        let mut left = grad.slice_mut(s![.., .., .., ..-1]);
        left -= &sw;
    }
    {
        let mut down = grad.slice_mut(s![.., .., 1.., ..]);
        down += &sh;
    }
    {
        let mut up = grad.slice_mut(s![.., .., ..-1, ..]);
        up -= &sh;
    }

    Ok((value, grad.into_dyn()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{IxDyn, array};

    #[test]
    fn constant_image_has_no_variation() {
        let image = Tensor::from_elem(IxDyn(&[1, 3, 4, 4]), 0.5);

        let (value, grad) = total_variation_loss(image.view()).unwrap();

        assert_eq!(value, 0.0);
        assert!(grad.iter().all(|&g| g == 0.0));
    }

    #[test]
    fn value_and_gradient_of_a_small_image() {
        let image = array![[[[0.0f32, 1.0], [3.0, 1.0]]]].into_dyn();

        let (value, grad) = total_variation_loss(image.view()).unwrap();

        // |1-0| + |1-3| horizontally, |3-0| + |1-1| vertically
        assert_eq!(value, 6.0);
        assert_eq!(grad, array![[[[-2.0f32, 1.0], [2.0, -1.0]]]].into_dyn());
    }

    #[test]
    fn rejects_non_image_tensors() {
        assert!(total_variation_loss(Tensor::zeros(IxDyn(&[3, 3])).view()).is_err());
    }
}
