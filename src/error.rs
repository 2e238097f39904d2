//! Custom error types for the QPD emulation pipeline.
//!
//! This module defines the primary error type, `QpdError`, for the whole crate.
//! Using the `thiserror` crate, it provides a centralized and consistent way to handle
//! the failures that can occur between loading configuration and publishing an offset.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: Wraps errors from `figment`, raised when the configuration file or
//!   environment cannot be parsed into the typed settings.
//! - **`Configuration`**: Semantic errors in values that parsed fine but make no sense
//!   (e.g. `sigma <= 0` or an AOI larger than the sensor). Caught by validation.
//! - **`OffsetFile`**: The persisted AOI origin could not be read, parsed or written.
//! - **`FrameTimeout`** / **`Camera`**: Acquisition failures. These end the current
//!   scan iteration and are handed to whoever owns the polling loop.
//! - **`Fit`**: A numerical failure inside a fit routine that must not be swallowed.
//! - **`InvalidReps`**: `aggregate` was asked for zero repetitions.
//!
//! Fit ambiguity (zero or one spot found) and duplicate frames are deliberately *not*
//! represented here: they are quality outcomes carried by the scan results.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type AppResult<T> = std::result::Result<T, QpdError>;

/// Every failure the QPD pipeline can report.
#[derive(Error, Debug)]
pub enum QpdError {
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("Offset file '{}' error: {reason}", path.display())]
    OffsetFile { path: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No frame received from camera within {timeout:?}")]
    FrameTimeout { timeout: Duration },

    #[error("Camera error: {0}")]
    Camera(String),

    #[error("Fit error: {0}")]
    Fit(String),

    #[error("Number of scan repetitions must be greater than 0")]
    InvalidReps,

    #[error("Scan thread panicked")]
    ScanThreadPanicked,
}

impl QpdError {
    /// True for failures that came from the camera while acquiring a frame.
    pub fn is_acquisition_failure(&self) -> bool {
        matches!(self, QpdError::FrameTimeout { .. } | QpdError::Camera(_))
    }
}
