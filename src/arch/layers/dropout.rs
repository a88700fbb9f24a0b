use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{Result, StyleErr, Tensor};

/// Inverted dropout: zeroes elements with probability `p` while training and scales the kept
/// ones by `1 / (1 - p)`. It's the identity when evaluating.
#[derive(Debug, Clone)]
pub struct Dropout {
    p: f32,
    training: bool,
    rng: StdRng,
    mask: Option<Tensor>,
}

impl Dropout {
    /// Creates a new `Dropout` in evaluation mode.
    ///
    /// # Arguments
    /// * `p` - The probability of zeroing an element, clamped to `[0, 1]`.
    /// * `seed` - The seed of the mask generator.
    pub fn new(p: f32, seed: u64) -> Self {
        Self {
            p: p.clamp(0.0, 1.0),
            training: false,
            rng: StdRng::seed_from_u64(seed),
            mask: None,
        }
    }

    pub fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    pub fn forward(&mut self, x: Tensor) -> Result<Tensor> {
        if !self.training || self.p == 0.0 {
            self.mask = None;
            return Ok(x);
        }

        let keep = 1.0 - self.p;
        let scale = if keep > 0.0 { 1.0 / keep } else { 0.0 };
        let mask = x.mapv(|_| {
            if self.rng.random::<f32>() < keep {
                scale
            } else {
                0.0
            }
        });

        let y = x * &mask;
        self.mask = Some(mask);
        Ok(y)
    }

    pub fn backward(&mut self, d: Tensor) -> Result<Tensor> {
        let Some(mask) = &self.mask else {
            return Ok(d);
        };

        if mask.shape() != d.shape() {
            return Err(StyleErr::shape_mismatch("dropout gradient", d.shape(), mask.shape()));
        }

        Ok(d * mask)
    }
}
