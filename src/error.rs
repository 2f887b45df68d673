use crate::{layer::LayerKind, volume::Dimensions};

/// Errors returned by volumes, layers, networks and trainers.
///
/// There are no transient errors: every variant reports misuse (a bad
/// configuration, a shape that does not line up, an operation a layer does
/// not support) detected at the call that returned it.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A linear index past the end of a volume or layer output.
    #[error("index {index} is out of range for length {len}")]
    OutOfRange { index: usize, len: usize },
    /// A positional index outside of a volume.
    #[error("position ({x}, {y}, {d}) is out of range for {dimensions}")]
    PositionOutOfRange {
        x: usize,
        y: usize,
        d: usize,
        dimensions: Dimensions,
    },
    /// Two volumes that must agree in shape do not.
    #[error("expected dimensions {expected}, found {found}")]
    DimensionMismatch {
        expected: Dimensions,
        found: Dimensions,
    },
    /// A slice whose length must match a volume or layer does not.
    #[error("expected length {expected}, found {found}")]
    LengthMismatch { expected: usize, found: usize },
    /// A layer or trainer was configured with invalid values.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    /// A layer list can not be assembled into a network.
    #[error("invalid network: {0}")]
    InvalidNetwork(String),
    /// The operation is not implemented by this kind of layer.
    #[error("{operation} is not supported by {layer} layers")]
    Unsupported {
        operation: &'static str,
        layer: LayerKind,
    },
    /// A backward pass or loss was requested before any forward pass.
    #[error("no forward pass has been run")]
    MissingForward,
    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),
}

/// Result with [`Error`] as the default error type.
pub type Result<T, E = Error> = std::result::Result<T, E>;
