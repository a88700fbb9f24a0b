mod avgpool;
mod batchnorm;
mod conv;
mod custom;
mod dropout;
mod flatten;
#[cfg(test)]
pub(crate) mod gradient_check;
mod layer;
mod linear;
mod normalization;
mod param;
mod pool;
mod relu;

pub use avgpool::AdaptiveAvgPool2d;
pub use batchnorm::BatchNorm2d;
pub use conv::Conv2d;
pub use custom::CustomLayer;
pub use dropout::Dropout;
pub use flatten::Flatten;
pub use layer::Layer;
pub use linear::Linear;
pub use normalization::Normalization;
pub use param::Param;
pub use pool::MaxPool2d;
pub use relu::Relu;
