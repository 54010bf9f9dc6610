use std::path::{Path, PathBuf};

use qsmprep_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("missing resource: {}", .0.display())]
    MissingResource(PathBuf),

    #[error("malformed {what} in {}: {message}", path.display())]
    Format {
        what: &'static str,
        path: PathBuf,
        message: String,
    },

    #[error("NIfTI error: {0}")]
    Nifti(#[from] nifti::NiftiError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl IoError {
    pub(crate) fn format(what: &'static str, path: &Path, message: impl Into<String>) -> Self {
        Self::Format {
            what,
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    /// Whether the failure is a file that does not exist.
    pub fn is_missing(&self) -> bool {
        match self {
            Self::MissingResource(_) => true,
            Self::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, IoError>;

/// Fail with [`IoError::MissingResource`] when `path` does not exist.
pub(crate) fn require_exists(path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(IoError::MissingResource(path.to_path_buf()))
    }
}
