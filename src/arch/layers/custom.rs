use std::fmt;

use super::Param;
use crate::{Result, Tensor};

/// A user-defined layer, for computations that have no dedicated `Layer` variant.
///
/// Implementors must not mutate tensors handed to `forward` in ways observable by the caller
/// and must cache whatever `backward` needs themselves.
pub trait CustomLayer: fmt::Debug + Send {
    /// An explicit kind name, overriding the one derived from the type.
    fn name(&self) -> Option<&str> {
        None
    }

    /// The last path segment of the implementor's type name, generics stripped.
    fn type_name(&self) -> &'static str {
        short_type_name(std::any::type_name::<Self>())
    }

    fn forward(&mut self, x: Tensor) -> Result<Tensor>;

    fn backward(&mut self, d: Tensor) -> Result<Tensor>;

    fn params(&self) -> Vec<(&'static str, &Param)> {
        Vec::new()
    }

    fn params_mut(&mut self) -> Vec<(&'static str, &mut Param)> {
        Vec::new()
    }

    fn set_training(&mut self, _training: bool) {}

    fn clone_box(&self) -> Box<dyn CustomLayer>;
}

impl Clone for Box<dyn CustomLayer> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

fn short_type_name(full: &'static str) -> &'static str {
    let path = full.split('<').next().unwrap_or(full);
    path.rsplit("::").next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct Scale<T>(T);

    impl CustomLayer for Scale<f32> {
        fn forward(&mut self, x: Tensor) -> Result<Tensor> {
            Ok(x * self.0)
        }

        fn backward(&mut self, d: Tensor) -> Result<Tensor> {
            Ok(d * self.0)
        }

        fn clone_box(&self) -> Box<dyn CustomLayer> {
            Box::new(self.clone())
        }
    }

    #[test]
    fn type_name_is_the_short_type_name() {
        let layer: Box<dyn CustomLayer> = Box::new(Scale(2.0f32));
        assert_eq!(layer.type_name(), "Scale");
        assert_eq!(layer.name(), None);
    }

    #[test]
    fn short_type_name_strips_paths_and_generics() {
        assert_eq!(short_type_name("a::b::Lambda"), "Lambda");
        assert_eq!(short_type_name("a::Wrap<b::Inner>"), "Wrap");
        assert_eq!(short_type_name("Plain"), "Plain");
    }
}
