use ndarray::Zip;

use super::{Closure, Optimizer};
use crate::{Result, StyleErr, Tensor};

/// Adam, with moment estimates allocated on the first step to the shape of the optimized tensor.
#[derive(Debug)]
pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    beta1_t: f32,
    beta2_t: f32,
    v: Option<Tensor>,
    s: Option<Tensor>,
    epsilon: f32,
}

impl Adam {
    /// Creates a new `Adam` optimizer.
    ///
    /// # Arguments
    /// * `learning_rate` - The small coefficient that modulates the amount of change per step.
    /// * `beta1`, `beta2`, `epsilon` - Hyperparameters to the optimization algorithm.
    ///
    /// # Returns
    /// A new `Adam` instance.
    pub fn new(learning_rate: f32, beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Self {
            learning_rate,
            beta1,
            beta2,
            beta1_t: 1.,
            beta2_t: 1.,
            v: None,
            s: None,
            epsilon,
        }
    }
}

impl Optimizer for Adam {
    fn step(&mut self, param: &mut Tensor, closure: &mut Closure<'_>) -> Result<f32> {
        let eval = closure(param)?;
        let grad = &eval.grad;
        if grad.shape() != param.shape() {
            return Err(StyleErr::shape_mismatch(
                "optimizer gradient",
                grad.shape(),
                param.shape(),
            ));
        }

        let Self {
            learning_rate: lr,
            beta1: b1,
            beta2: b2,
            epsilon: eps,
            ..
        } = *self;

        self.beta1_t *= b1;
        self.beta2_t *= b2;

        let bc1 = 1. - self.beta1_t;
        let bc2 = 1. - self.beta2_t;
        let step_size = lr * (bc2.sqrt() / bc1);

        let v = self.v.get_or_insert_with(|| Tensor::zeros(param.raw_dim()));
        let s = self.s.get_or_insert_with(|| Tensor::zeros(param.raw_dim()));

        Zip::from(&mut *param)
            .and(grad)
            .and(v)
            .and(s)
            .for_each(|p, &g, v, s| {
                *v = b1 * *v + (1. - b1) * g;
                *s = b2 * *s + (1. - b2) * g.powi(2);
                *p -= step_size * *v / (s.sqrt() + eps);
            });

        Ok(eval.loss)
    }
}
