//! Error types for tkrdigi-sim.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for simulation operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Simulation setup errors.
///
/// Everything here is raised while building a simulation context; event
/// processing itself does not fail.
#[derive(Error, Debug)]
pub enum Error {
    /// Charge table file does not exist.
    #[error("charge table not found: {}", path.display())]
    TableNotFound { path: PathBuf },

    /// Charge table contents do not match the configured layout.
    #[error("malformed charge table at line {line}: {reason}")]
    MalformedTable { line: usize, reason: String },

    /// I/O error while reading a table.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid simulation configuration.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Core error.
    #[error("core error: {0}")]
    CoreError(#[from] tkrdigi_core::Error),
}
