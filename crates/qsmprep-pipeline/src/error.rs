//! Pipeline errors and their classification.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use qsmprep_core::CoreError;
use qsmprep_io::IoError;
use qsmprep_registration::RegistrationError;

/// Stage of a case at which something failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Reading inputs or a persisted transform.
    Load,
    Estimate,
    ApplyPrimary,
    ApplyDependents,
    /// Outside the pipeline proper (worker panic, manifest write).
    Batch,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::Load => "load",
            Stage::Estimate => "estimate",
            Stage::ApplyPrimary => "apply-primary",
            Stage::ApplyDependents => "apply-dependents",
            Stage::Batch => "batch",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Failure class, independent of the layer that raised it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    DegenerateInput,
    NonInvertibleTransform,
    ShapeMismatch,
    MissingResource,
    Timeout,
    InvalidConfiguration,
    NumericalInstability,
    Io,
    Internal,
}

impl ErrorKind {
    /// Missing files can be supplied and deadlines raised; everything else
    /// fails the same way on a rerun.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::MissingResource | ErrorKind::Timeout)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::DegenerateInput => "degenerate input",
            ErrorKind::NonInvertibleTransform => "non-invertible transform",
            ErrorKind::ShapeMismatch => "shape mismatch",
            ErrorKind::MissingResource => "missing resource",
            ErrorKind::Timeout => "timeout",
            ErrorKind::InvalidConfiguration => "invalid configuration",
            ErrorKind::NumericalInstability => "numerical instability",
            ErrorKind::Io => "i/o",
            ErrorKind::Internal => "internal",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Missing resource: {0}")]
    MissingResource(String),

    #[error("Estimate exceeded its deadline of {0:?}")]
    Timeout(Duration),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Worker failed: {0}")]
    Worker(String),

    #[error("Manifest error: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error(transparent)]
    Io(#[from] IoError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("I/O error: {0}")]
    File(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    pub fn shape_mismatch(msg: impl Into<String>) -> Self {
        Self::ShapeMismatch(msg.into())
    }

    pub fn missing(msg: impl Into<String>) -> Self {
        Self::MissingResource(msg.into())
    }

    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::ShapeMismatch(_) => ErrorKind::ShapeMismatch,
            PipelineError::MissingResource(_) => ErrorKind::MissingResource,
            PipelineError::Timeout(_) => ErrorKind::Timeout,
            PipelineError::InvalidConfiguration(_) => ErrorKind::InvalidConfiguration,
            PipelineError::Worker(_) => ErrorKind::Internal,
            PipelineError::Manifest(_) | PipelineError::File(_) => ErrorKind::Io,
            PipelineError::Registration(e) => registration_kind(e),
            PipelineError::Io(e) => match e {
                IoError::MissingResource(_) => ErrorKind::MissingResource,
                IoError::Core(core) => core_kind(core),
                _ => ErrorKind::Io,
            },
            PipelineError::Core(e) => core_kind(e),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

fn core_kind(err: &CoreError) -> ErrorKind {
    match err {
        CoreError::DegenerateInput(_) => ErrorKind::DegenerateInput,
        CoreError::NonInvertibleTransform(_) => ErrorKind::NonInvertibleTransform,
        CoreError::ShapeMismatch(_) => ErrorKind::ShapeMismatch,
        CoreError::InvalidParameters(_) => ErrorKind::InvalidConfiguration,
        CoreError::TensorData(_) => ErrorKind::Internal,
    }
}

fn registration_kind(err: &RegistrationError) -> ErrorKind {
    match err {
        RegistrationError::DegenerateInput(_) => ErrorKind::DegenerateInput,
        RegistrationError::NonInvertibleTransform(_) => ErrorKind::NonInvertibleTransform,
        RegistrationError::InvalidConfiguration(_) => ErrorKind::InvalidConfiguration,
        RegistrationError::NumericalInstability(_) => ErrorKind::NumericalInstability,
        RegistrationError::Core(core) => core_kind(core),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_only_missing_and_timeout_are_retryable() {
        assert!(PipelineError::missing("t1").is_retryable());
        assert!(PipelineError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(PipelineError::Io(IoError::MissingResource(PathBuf::from("a.nii"))).is_retryable());
        assert!(!PipelineError::shape_mismatch("grid").is_retryable());
        assert!(!PipelineError::from(RegistrationError::degenerate("flat")).is_retryable());
    }

    #[test]
    fn test_kind_looks_through_wrapped_errors() {
        let err = PipelineError::from(RegistrationError::Core(CoreError::shape_mismatch("x")));
        assert_eq!(err.kind(), ErrorKind::ShapeMismatch);
        let err = PipelineError::from(IoError::Core(CoreError::non_invertible("det 0")));
        assert_eq!(err.kind(), ErrorKind::NonInvertibleTransform);
        let err = PipelineError::from(RegistrationError::non_invertible("det 1e-6"));
        assert_eq!(err.kind(), ErrorKind::NonInvertibleTransform);
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(Stage::ApplyDependents.to_string(), "apply-dependents");
        assert_eq!(serde_json::to_string(&Stage::ApplyPrimary).unwrap(), "\"apply_primary\"");
    }
}
