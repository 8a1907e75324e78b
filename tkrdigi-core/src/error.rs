//! Error types for tkrdigi-core.

use thiserror::Error;

/// Result type alias for tkrdigi operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for tkrdigi operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Volume identifier with the wrong number of fields.
    #[error("invalid volume identifier: expected {expected} fields, found {found}")]
    VolumeIdLength { expected: usize, found: usize },

    /// Volume identifier field that cannot be parsed or is out of range.
    #[error("invalid volume identifier field {index}: {reason}")]
    VolumeIdField { index: usize, reason: String },

    /// Volume identifier that does not address a tracker plane.
    #[error("volume {0} is not a tracker volume")]
    NotTracker(String),

    /// Truth hit that cannot be digitized.
    #[error("invalid hit: {0}")]
    InvalidHit(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Calibration error.
    #[error("calibration error: {0}")]
    CalibrationError(String),
}
