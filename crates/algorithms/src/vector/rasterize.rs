//! Corridor mask: burn the AOI polygon onto a raster grid.
//!
//! A pixel is inside when its centre is inside the polygon (even-odd rule,
//! holes honoured). Rows are filled independently with a scanline pass.

use crate::maybe_rayon::*;
use geo_types::{Coord, LineString};
use ndarray::Array2;
use seepwatch_core::{AreaOfInterest, CRS, Error, GeoTransform, Raster, RasterElement, Result};
use tracing::{debug, warn};

/// The geometry of a raster grid: affine transform, dimensions and CRS.
#[derive(Debug, Clone)]
pub struct GridSpec {
    pub transform: GeoTransform,
    pub rows: usize,
    pub cols: usize,
    pub crs: Option<CRS>,
}

impl GridSpec {
    pub fn of<T: RasterElement>(raster: &Raster<T>) -> Self {
        Self {
            transform: *raster.transform(),
            rows: raster.rows(),
            cols: raster.cols(),
            crs: raster.crs().cloned(),
        }
    }
}

/// Rasterize the AOI onto `grid`: 1 inside the corridor, 0 outside.
///
/// The AOI is reprojected to the grid CRS when they differ. Fails with
/// [`Error::MaskAlignment`] when the CRSs cannot be reconciled, the grid is
/// rotated, or no pixel centre falls inside the corridor.
pub fn corridor_mask(aoi: &AreaOfInterest, grid: &GridSpec) -> Result<Raster<u8>> {
    let gt = grid.transform;
    if gt.row_rotation != 0.0 || gt.col_rotation != 0.0 {
        return Err(Error::MaskAlignment("rotated raster grids are not supported".into()));
    }
    if gt.pixel_width == 0.0 || gt.pixel_height == 0.0 {
        return Err(Error::MaskAlignment("raster grid has zero pixel size".into()));
    }

    let aoi = match &grid.crs {
        None => {
            warn!("Raster has no CRS; assuming it matches the AOI ({})", aoi.crs());
            aoi.clone()
        }
        Some(target) => aoi.reproject(target).ok_or_else(|| {
            Error::MaskAlignment(format!(
                "cannot reproject AOI from {} to raster CRS {}",
                aoi.crs(),
                target
            ))
        })?,
    };

    // Work in continuous pixel coordinates: col = (x - ox) / pw, row = (y - oy) / ph.
    let to_pixel = |c: &Coord<f64>| Coord {
        x: (c.x - gt.origin_x) / gt.pixel_width,
        y: (c.y - gt.origin_y) / gt.pixel_height,
    };
    let polygon = aoi.polygon();
    let edges: Vec<(Coord<f64>, Coord<f64>)> = std::iter::once(polygon.exterior())
        .chain(polygon.interiors())
        .flat_map(|ring: &LineString<f64>| ring.lines())
        .map(|l| (to_pixel(&l.start), to_pixel(&l.end)))
        .filter(|(a, b)| a.y != b.y)
        .collect();

    let (rows, cols) = (grid.rows, grid.cols);
    let data: Vec<u8> = (0..rows)
        .into_par_iter()
        .flat_map(|row| scan_row(&edges, row, cols))
        .collect();

    let inside = data.iter().filter(|&&v| v == 1).count();
    if inside == 0 {
        return Err(Error::MaskAlignment(format!(
            "AOI does not cover any pixel of the {}x{} raster",
            rows, cols
        )));
    }
    debug!(
        "Corridor mask: {} of {} pixels inside ({:.2}%)",
        inside,
        rows * cols,
        100.0 * inside as f64 / (rows * cols) as f64
    );

    let array = Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;
    let mut mask = Raster::from_array(array);
    mask.set_transform(gt);
    mask.set_crs(grid.crs.clone().or_else(|| Some(aoi.crs().clone())));
    Ok(mask)
}

/// Fill one row: pixel centres between successive edge crossings are inside.
fn scan_row(edges: &[(Coord<f64>, Coord<f64>)], row: usize, cols: usize) -> Vec<u8> {
    let mut out = vec![0u8; cols];
    let yc = row as f64 + 0.5;

    let mut xs: Vec<f64> = edges
        .iter()
        .filter(|(a, b)| (a.y <= yc && yc < b.y) || (b.y <= yc && yc < a.y))
        .map(|(a, b)| a.x + (yc - a.y) * (b.x - a.x) / (b.y - a.y))
        .collect();
    xs.sort_by(f64::total_cmp);

    for pair in xs.chunks_exact(2) {
        // centre col + 0.5 in [x0, x1)
        let start = (pair[0] - 0.5).ceil().clamp(0.0, cols as f64) as usize;
        let end = (pair[1] - 0.5).ceil().clamp(0.0, cols as f64) as usize;
        for v in &mut out[start..end.max(start)] {
            *v = 1;
        }
    }
    out
}
