pub mod flatten;
pub mod key;
pub mod layered;
pub mod layers;
pub mod loss;
pub mod module;
pub mod naming;
pub mod zoo;

pub use key::{INPUT_KEY, LayerKey, SEPARATOR};
pub use layered::LayeredNetwork;
pub use layers::Layer;
pub use module::Module;
pub use naming::LayerKind;
