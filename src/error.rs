//! # Error Types
//!
//! This module defines error types used throughout the rastersim library.
//!
//! The variants follow how a print filter is expected to fail:
//!
//! | Variant | Raised when | Job outcome |
//! |---------|-------------|-------------|
//! | `Usage` | wrong number of arguments | nothing processed |
//! | `Validation` | unsupported raster header | aborted before the page |
//! | `Protocol` | unknown record or status line | logged, job continues |
//! | `Resource` | allocation or file open failure | page loop aborted, teardown runs |
//! | `Io` / `Image` | stream or encoder failure | job aborted |

use thiserror::Error;

/// Main error type for rastersim operations
#[derive(Debug, Error)]
pub enum RasterSimError {
    /// Bad command line; carries the usage text
    #[error("{0}")]
    Usage(String),

    /// Raster header the device cannot print
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unrecognized forward record or back-channel line
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Allocation or file open failure
    #[error("Resource error: {0}")]
    Resource(String),

    /// Malformed raster input stream
    #[error("Raster error: {0}")]
    Raster(String),

    /// Image encoding error
    #[error("Image error: {0}")]
    Image(String),

    /// Manifest serialization error
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<image::ImageError> for RasterSimError {
    fn from(e: image::ImageError) -> Self {
        RasterSimError::Image(e.to_string())
    }
}

/// Shorthand used across the crate.
pub type Result<T> = std::result::Result<T, RasterSimError>;
