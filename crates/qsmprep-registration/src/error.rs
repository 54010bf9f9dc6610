//! Error types for registration.

use qsmprep_core::CoreError;
use thiserror::Error;

/// Failure of a registration run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistrationError {
    /// An input volume cannot support the similarity metric.
    #[error("Degenerate input: {0}")]
    DegenerateInput(String),

    /// The estimated transform is (near-)singular.
    #[error("Non-invertible transform: {0}")]
    NonInvertibleTransform(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The metric produced a non-finite value or gradient.
    #[error("Numerical instability: {0}")]
    NumericalInstability(String),

    #[error(transparent)]
    Core(CoreError),
}

/// Result type for registration operations.
pub type Result<T> = std::result::Result<T, RegistrationError>;

impl RegistrationError {
    pub fn degenerate(msg: impl Into<String>) -> Self {
        Self::DegenerateInput(msg.into())
    }

    pub fn non_invertible(msg: impl Into<String>) -> Self {
        Self::NonInvertibleTransform(msg.into())
    }

    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    pub fn numerical_instability(msg: impl Into<String>) -> Self {
        Self::NumericalInstability(msg.into())
    }
}

impl From<CoreError> for RegistrationError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::DegenerateInput(m) => Self::DegenerateInput(m),
            CoreError::NonInvertibleTransform(m) => Self::NonInvertibleTransform(m),
            CoreError::InvalidParameters(m) => Self::InvalidConfiguration(m),
            other => Self::Core(other),
        }
    }
}
