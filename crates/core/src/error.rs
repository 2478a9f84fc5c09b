//! Error types for SeepWatch

use thiserror::Error;

/// Main error type for SeepWatch raster and geometry operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    /// Two grids that must be aligned pixel-for-pixel have different shapes.
    #[error("Shape mismatch in {context}: expected ({er}, {ec}), got ({ar}, {ac})")]
    ShapeMismatch {
        context: &'static str,
        er: usize,
        ec: usize,
        ar: usize,
        ac: usize,
    },

    /// Pipeline geometry is empty, unreadable or topologically invalid.
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    /// The AOI cannot be placed on a raster grid (CRS cannot be reconciled,
    /// or the AOI misses the raster entirely).
    #[error("Mask alignment failed: {0}")]
    MaskAlignment(String),

    /// Change detection needs a baseline and a current raster.
    #[error("Insufficient imagery: {obtained} valid raster(s) available, {required} required")]
    InsufficientImagery { required: usize, obtained: usize },

    /// Cancellation was requested before the named stage.
    #[error("Cancelled before {0}")]
    Cancelled(String),

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build a [`Error::ShapeMismatch`] from two `(rows, cols)` shapes.
    pub fn shape_mismatch(
        context: &'static str,
        expected: (usize, usize),
        actual: (usize, usize),
    ) -> Self {
        Error::ShapeMismatch {
            context,
            er: expected.0,
            ec: expected.1,
            ar: actual.0,
            ac: actual.1,
        }
    }
}

/// Result type alias for SeepWatch core operations
pub type Result<T> = std::result::Result<T, Error>;
