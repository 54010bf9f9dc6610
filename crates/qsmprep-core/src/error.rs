//! Error types shared by the core data model.

use thiserror::Error;

/// Errors raised by volume, transform and resampling operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    /// Input data cannot be used (empty grid, zero spacing, constant image...).
    #[error("Degenerate input: {0}")]
    DegenerateInput(String),

    /// A transform or affine whose linear part is singular or nearly so.
    #[error("Non-invertible transform: {0}")]
    NonInvertibleTransform(String),

    /// Geometry of two operands does not agree.
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Parameters supplied to a constructor are malformed.
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// Tensor contents could not be read back from the backend.
    #[error("Tensor data error: {0}")]
    TensorData(String),
}

/// Result alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    pub fn degenerate(msg: impl Into<String>) -> Self {
        Self::DegenerateInput(msg.into())
    }

    pub fn non_invertible(msg: impl Into<String>) -> Self {
        Self::NonInvertibleTransform(msg.into())
    }

    pub fn shape_mismatch(msg: impl Into<String>) -> Self {
        Self::ShapeMismatch(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidParameters(msg.into())
    }

    pub fn tensor_data(msg: impl Into<String>) -> Self {
        Self::TensorData(msg.into())
    }
}
