//! Vector operations on the pipeline corridor
//!
//! - Buffer: points, segments, lines and polygons expanded by a distance
//! - Loader: GeoJSON pipeline geometry → buffered [`AreaOfInterest`](seepwatch_core::AreaOfInterest)
//! - Rasterize: AOI → corridor mask on an imagery grid

mod buffer;
mod loader;
mod rasterize;

pub use buffer::{
    buffer_linestring, buffer_points, buffer_polygon, buffer_segment, largest_polygon, union_all,
    BufferParams,
};
pub use loader::{aoi_from_geojson_str, aoi_from_geometries, load_aoi};
pub use rasterize::{corridor_mask, GridSpec};
