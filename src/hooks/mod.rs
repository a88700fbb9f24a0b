mod dict;
mod registry;
mod selection;
mod session;

pub use dict::{HookDict, HookHandle};
pub use registry::HookRegistry;
pub use selection::Selection;
pub use session::{CaptureSession, Captures};
