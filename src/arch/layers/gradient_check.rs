//! Central difference checks for the input gradients of layers.

use ndarray::IxDyn;
use ndarray_rand::RandomExt;
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use rand_distr::StandardNormal;

use super::Layer;
use crate::Tensor;

const EPS: f32 = 1e-2;
const TOLERANCE: f32 = 1e-2;

/// Distinct values `0.1` apart and never closer than `0.05` to zero, shuffled. Moving one of them
/// by `EPS` changes neither its sign nor its rank, so relu masks and pooling maxima stay put.
pub(crate) fn spaced_input(shape: &[usize], seed: u64) -> Tensor {
    let n: usize = shape.iter().product();
    let offset = (n / 2) as f32 - 0.5;
    let mut values: Vec<f32> = (0..n).map(|i| (i as f32 - offset) * 0.1).collect();
    values.shuffle(&mut StdRng::seed_from_u64(seed));

    Tensor::from_shape_vec(IxDyn(shape), values).unwrap()
}

/// Checks every entry of the input gradient against central differences of
/// `sum(y * r) + loss` for a random `r`, where `loss` is the layer's own unweighted loss.
///
/// `make` must build the same layer every time, each perturbed pass runs on a fresh one so
/// stateful layers such as training dropout replay the same randomness.
pub(crate) fn assert_input_gradient<F>(make: F, x: &Tensor, seed: u64)
where
    F: Fn() -> Layer,
{
    let mut layer = make();
    let y = layer.forward(x.clone()).unwrap();
    let r = Tensor::random_using(y.raw_dim(), StandardNormal, &mut StdRng::seed_from_u64(seed));
    let dx = layer.backward(r.clone()).unwrap();
    assert_eq!(dx.shape(), x.shape());

    let objective = |x: Tensor| {
        let mut layer = make();
        let y = layer.forward(x).unwrap();
        (y * &r).sum() + layer.loss().unwrap_or(0.)
    };

    for (idx, &analytic) in dx.indexed_iter() {
        let mut plus = x.clone();
        plus[idx.clone()] += EPS;
        let mut minus = x.clone();
        minus[idx.clone()] -= EPS;

        let numeric = (objective(plus) - objective(minus)) / (2.0 * EPS);
        assert!(
            (numeric - analytic).abs() < TOLERANCE,
            "{idx:?}: {numeric} vs {analytic}"
        );
    }
}
