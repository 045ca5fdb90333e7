use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result alias for errors emitted by php-guard internals.
pub type GuardResult<T> = Result<T, GuardError>;

/// Structured error type for the transformer and batch drivers.
#[derive(Debug, Error)]
pub enum GuardError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("source file not found: {}", .0.display())]
    MissingSource(PathBuf),

    #[error("refusing to overwrite the source file: {}", .0.display())]
    OutputIsSource(PathBuf),

    #[error("not a valid PHP function name: `{0}`")]
    InvalidIdentifier(String),
}

impl GuardError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

/// Extension for attaching the offending path to `std::io` results.
pub trait IoResultExt<T> {
    fn at_path(self, path: impl AsRef<Path>) -> GuardResult<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn at_path(self, path: impl AsRef<Path>) -> GuardResult<T> {
        self.map_err(|err| GuardError::io(path, err))
    }
}
