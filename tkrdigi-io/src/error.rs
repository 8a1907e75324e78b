//! I/O error types.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result type for I/O operations.
pub type Result<T> = std::result::Result<T, Error>;

/// I/O error types.
#[derive(Error, Debug)]
pub enum Error {
    /// A file could not be opened or created.
    #[error("cannot open {}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// I/O error on an open file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON syntax or schema error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Well-formed file with invalid contents.
    #[error("invalid file format: {0}")]
    InvalidFormat(String),

    /// Simulation setup error.
    #[error("simulation error: {0}")]
    SimError(#[from] tkrdigi_sim::Error),

    /// Core library error.
    #[error("core error: {0}")]
    CoreError(#[from] tkrdigi_core::Error),
}

impl Error {
    /// Wraps an open or create failure with the file it concerns.
    pub(crate) fn file(path: &Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| Self::File {
            path: path.to_path_buf(),
            source,
        }
    }
}
