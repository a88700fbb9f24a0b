use crate::{Result, Tensor};

/// The value of the objective at some point and its gradient there.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub loss: f32,
    pub grad: Tensor,
}

/// The closure an optimizer evaluates to get the objective at the current parameters. It may
/// adjust the parameters before evaluating, e.g. to keep them in range.
pub type Closure<'a> = dyn FnMut(&mut Tensor) -> Result<Evaluation> + 'a;

/// Builds the optimizer of a run from the tensor it will optimize.
pub type OptimizerFactory = Box<dyn FnOnce(&Tensor) -> Box<dyn Optimizer>>;

pub trait Optimizer {
    /// Makes a single optimization step on `param`, evaluating `closure` as many times as the
    /// algorithm needs.
    ///
    /// # Returns
    /// The loss of the first evaluation of the step.
    fn step(&mut self, param: &mut Tensor, closure: &mut Closure<'_>) -> Result<f32>;
}
