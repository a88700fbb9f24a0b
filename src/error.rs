use std::{
    error::Error,
    fmt::{self, Display},
    io,
};

/// The result type used in the entire crate.
pub type Result<T> = std::result::Result<T, StyleErr>;

/// The crate's error type.
#[derive(Debug)]
pub enum StyleErr {
    KeyNotFound {
        key: String,
    },
    DuplicateKey {
        key: String,
    },
    HookState {
        reason: String,
    },
    UnsupportedStructure {
        path: String,
        reason: &'static str,
    },
    ShapeMismatch {
        what: &'static str,
        got: Vec<usize>,
        expected: Vec<usize>,
    },
    InvalidClass {
        target: usize,
        classes: usize,
    },
    MissingForward {
        layer: &'static str,
    },
    Shape(ndarray::ShapeError),
    Weights(String),
    Config(String),
    Io(io::Error),
}

impl StyleErr {
    pub(crate) fn key_not_found(key: impl Into<String>) -> Self {
        Self::KeyNotFound { key: key.into() }
    }

    pub(crate) fn hook_state(reason: impl Into<String>) -> Self {
        Self::HookState {
            reason: reason.into(),
        }
    }

    pub(crate) fn shape_mismatch(what: &'static str, got: &[usize], expected: &[usize]) -> Self {
        Self::ShapeMismatch {
            what,
            got: got.to_vec(),
            expected: expected.to_vec(),
        }
    }
}

impl Display for StyleErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StyleErr::KeyNotFound { key } => write!(f, "there is no layer with key '{key}'"),
            StyleErr::DuplicateKey { key } => {
                write!(f, "a layer with key '{key}' already exists")
            }
            StyleErr::HookState { reason } => write!(f, "invalid hook state: {reason}"),
            StyleErr::UnsupportedStructure { path, reason } => {
                write!(f, "unsupported module structure at '{path}': {reason}")
            }
            StyleErr::ShapeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "There's a shape mismatch in {what}, got {got:?} and expected {expected:?}"
            ),
            StyleErr::InvalidClass { target, classes } => write!(
                f,
                "target class {target} is out of range for an output of {classes} classes"
            ),
            StyleErr::MissingForward { layer } => {
                write!(f, "backward called on a {layer} layer before any forward pass")
            }
            StyleErr::Shape(e) => write!(f, "shape error: {e}"),
            StyleErr::Weights(msg) => write!(f, "weights error: {msg}"),
            StyleErr::Config(msg) => write!(f, "invalid config: {msg}"),
            StyleErr::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for StyleErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            StyleErr::Io(e) => Some(e),
            StyleErr::Shape(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for StyleErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<ndarray::ShapeError> for StyleErr {
    fn from(value: ndarray::ShapeError) -> Self {
        Self::Shape(value)
    }
}

impl From<safetensors::SafeTensorError> for StyleErr {
    fn from(value: safetensors::SafeTensorError) -> Self {
        Self::Weights(value.to_string())
    }
}

impl From<serde_json::Error> for StyleErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Config(value.to_string())
    }
}
