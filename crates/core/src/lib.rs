//! # SeepWatch Core
//!
//! Core types and I/O shared by the SeepWatch leak-detection crates.
//!
//! This crate provides:
//! - `Raster<T>`: Generic georeferenced raster grid
//! - `GeoTransform`: Affine transformation for georeferencing
//! - `CRS`: Coordinate Reference System handling, with WGS84 ↔ UTM projection
//! - `AreaOfInterest`: the buffered corridor polygon shared by every stage
//! - `CancelFlag`: cooperative cancellation checked between stages
//! - Native GeoTIFF I/O

pub mod cancel;
pub mod crs;
pub mod error;
pub mod io;
pub mod raster;
pub mod vector;

pub use cancel::CancelFlag;
pub use crs::CRS;
pub use error::{Error, Result};
pub use raster::{GeoTransform, Raster, RasterElement};
pub use vector::AreaOfInterest;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::cancel::CancelFlag;
    pub use crate::crs::CRS;
    pub use crate::error::{Error, Result};
    pub use crate::raster::{GeoTransform, Raster, RasterElement};
    pub use crate::vector::AreaOfInterest;
}
