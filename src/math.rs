use ndarray::{Array2, ArrayView2, ArrayViewD, Axis, IxDyn};

use crate::{Result, StyleErr, Tensor};

/// Computes the normalized Gram matrix of a batch of feature maps.
///
/// # Arguments
/// * `input` - A feature tensor of shape `(a, b, c, d)`: batch size, number of feature maps and
///   the dimensions of each map.
///
/// # Returns
/// The `(a * b, a * b)` matrix `F F^T / (a * b * c * d)` where `F` are the flattened maps.
pub fn gram_matrix(input: ArrayViewD<f32>) -> Result<Array2<f32>> {
    let (a, b, c, d) = dims4(input.shape(), "gram matrix input")?;
    let features = input.to_shape((a * b, c * d))?;
    let norm = (a * b * c * d) as f32;

    let mut gram = features.dot(&features.t());
    gram /= norm;
    Ok(gram)
}

/// Propagates the gradient of a loss with respect to a Gram matrix back to its feature maps.
///
/// # Arguments
/// * `input` - The feature tensor the Gram matrix was computed from.
/// * `d_gram` - The gradient of the loss with respect to the Gram matrix.
///
/// # Returns
/// The gradient with respect to `input`, with the same shape.
pub fn gram_matrix_backward(input: ArrayViewD<f32>, d_gram: ArrayView2<f32>) -> Result<Tensor> {
    let (a, b, c, d) = dims4(input.shape(), "gram matrix input")?;
    if d_gram.dim() != (a * b, a * b) {
        return Err(StyleErr::shape_mismatch(
            "gram matrix gradient",
            d_gram.shape(),
            &[a * b, a * b],
        ));
    }

    let features = input.to_shape((a * b, c * d))?;
    let norm = (a * b * c * d) as f32;

    let sym = &d_gram + &d_gram.t();
    let mut d_features = sym.dot(&features);
    d_features /= norm;

    Ok(d_features.into_shape_with_order(IxDyn(&[a, b, c, d]))?)
}

/// Mean squared error between two tensors of the same shape.
pub fn mse_loss(input: ArrayViewD<f32>, target: ArrayViewD<f32>) -> Result<f32> {
    if input.shape() != target.shape() {
        return Err(StyleErr::shape_mismatch(
            "mse loss",
            input.shape(),
            target.shape(),
        ));
    }

    let sq = ndarray::Zip::from(&input)
        .and(&target)
        .fold(0.0, |acc, &x, &y| acc + (x - y).powi(2));

    Ok(sq / input.len().max(1) as f32)
}

/// Gradient of [`mse_loss`] with respect to `input`.
pub fn mse_loss_prime(input: ArrayViewD<f32>, target: ArrayViewD<f32>) -> Result<Tensor> {
    if input.shape() != target.shape() {
        return Err(StyleErr::shape_mismatch(
            "mse loss",
            input.shape(),
            target.shape(),
        ));
    }

    Ok((&input - &target) * (2.0 / input.len().max(1) as f32))
}

/// Builds a one-hot gradient seed.
///
/// # Arguments
/// * `shape` - The shape of the seed, its last axis being the class dimension.
/// * `target_class` - The class that gets the 1, for every sample.
///
/// # Returns
/// A tensor of zeros with a 1 at `target_class` along the last axis.
pub fn one_hot(shape: &[usize], target_class: usize) -> Result<Tensor> {
    let classes = shape.last().copied().unwrap_or(0);
    if target_class >= classes {
        return Err(StyleErr::InvalidClass {
            target: target_class,
            classes,
        });
    }

    let mut seed = Tensor::zeros(IxDyn(shape));
    let last = Axis(shape.len() - 1);
    for mut lane in seed.lanes_mut(last) {
        lane[target_class] = 1.0;
    }

    Ok(seed)
}

/// Reads the dimensions of an NCHW tensor.
pub(crate) fn dims4(shape: &[usize], what: &'static str) -> Result<(usize, usize, usize, usize)> {
    match *shape {
        [a, b, c, d] => Ok((a, b, c, d)),
        _ => Err(StyleErr::shape_mismatch(what, shape, &[1, 0, 0, 0])),
    }
}
