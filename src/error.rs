//! Error types for raster loading and PCA fitting.

use thiserror::Error;

/// Main error type for raster_pca operations.
///
/// The two numerical failure sites of the analysis are kept as distinct
/// categories so callers can map them to separate exit statuses:
/// [`Error::Covariance`] for failures while building or decomposing the
/// covariance matrix, and [`Error::Reconstruction`] for failures while
/// reconstructing and measuring error.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TIFF decoding error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("unsupported pixel format in raster file")]
    UnsupportedPixelFormat,

    #[error("raster size mismatch: expected {expected_rows}x{expected_cols}, got {actual_rows}x{actual_cols}")]
    SizeMismatch {
        expected_rows: usize,
        expected_cols: usize,
        actual_rows: usize,
        actual_cols: usize,
    },

    #[error("no raster files found in directory {0}")]
    EmptyDirectory(String),

    #[error("input stack contains no elements")]
    EmptyStack,

    #[error("shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("requested {requested} components but the stack has {max} columns; expected 1 <= n_components <= {max}")]
    InvalidComponentCount { requested: usize, max: usize },

    #[error("PCA model has not been fitted; call fit_transform first")]
    NotFitted,

    #[error("flattened stack must have at least 2 rows to compute a covariance matrix, got {0}")]
    TooFewRows(usize),

    #[error("covariance computation failed: {0}")]
    Covariance(String),

    #[error("reconstruction failed: {0}")]
    Reconstruction(String),
}

/// Result type alias for raster_pca operations.
pub type Result<T> = std::result::Result<T, Error>;
