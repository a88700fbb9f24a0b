pub mod arch;
pub mod config;
mod error;
pub mod hooks;
pub mod math;
pub mod optimization;
pub mod style_transfer;
pub mod weights;

pub use error::{Result, StyleErr};

/// The dense n-dimensional array every layer reads and writes.
pub type Tensor = ndarray::ArrayD<f32>;
