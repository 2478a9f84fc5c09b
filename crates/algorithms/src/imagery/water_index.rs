//! Normalized Difference Water Index (McFeeters, 1996)
//!
//! `NDWI = (Green - NIR) / (Green + NIR)`
//!
//! Positive values indicate open water. The engine always yields a finite
//! value in [-1, 1] for every pixel it evaluates: a zero denominator gives 0
//! and any non-finite result is replaced by 0. Pixels outside the optional
//! corridor mask, or carrying a band's declared no-data value, are stored as
//! NaN and excluded from every statistic downstream.

use crate::maybe_rayon::*;
use ndarray::Array2;
use seepwatch_core::{Error, Raster, Result};
use tracing::{debug, info};

/// Default NDWI value above which a pixel counts as water
pub const DEFAULT_WATER_THRESHOLD: f64 = 0.2;

/// A water index raster: finite values in [-1, 1], NaN where excluded.
#[derive(Debug, Clone)]
pub struct WaterIndexRaster {
    raster: Raster<f64>,
}

impl WaterIndexRaster {
    /// Wrap an existing index raster (e.g. one read back from disk).
    ///
    /// Values are clamped to [-1, 1]; infinities become 0, NaN stays excluded.
    pub fn from_raster(mut raster: Raster<f64>) -> Self {
        raster.data_mut().mapv_inplace(|v| {
            if v.is_nan() {
                v
            } else if v.is_finite() {
                v.clamp(-1.0, 1.0)
            } else {
                0.0
            }
        });
        raster.set_nodata(Some(f64::NAN));
        Self { raster }
    }

    pub fn raster(&self) -> &Raster<f64> {
        &self.raster
    }

    pub fn into_raster(self) -> Raster<f64> {
        self.raster
    }

    pub fn shape(&self) -> (usize, usize) {
        self.raster.shape()
    }

    /// Ground size of one pixel side, in CRS units
    pub fn pixel_size(&self) -> f64 {
        self.raster.cell_size()
    }

    /// Whether (row, col) takes part in the analysis
    pub fn is_valid(&self, row: usize, col: usize) -> bool {
        self.raster.data().get((row, col)).is_some_and(|v| !v.is_nan())
    }

    /// Number of pixels that take part in the analysis
    pub fn valid_count(&self) -> usize {
        self.raster.data().iter().filter(|v| !v.is_nan()).count()
    }
}

fn is_declared_nodata(value: f64, nodata: Option<f64>) -> bool {
    nodata.is_some_and(|nd| nd.is_finite() && value == nd)
}

/// Pixel-level index for one green/NIR pair
fn ndwi_value(green: f64, nir: f64) -> f64 {
    let sum = green + nir;
    if sum == 0.0 {
        return 0.0;
    }
    let v = (green - nir) / sum;
    if v.is_finite() { v.clamp(-1.0, 1.0) } else { 0.0 }
}

/// Compute NDWI from green and NIR bands of the same scene.
///
/// `mask`, when given, must have the bands' shape; pixels where it is 0 are
/// excluded (NaN).
pub fn compute_index(
    green: &Raster<f64>,
    nir: &Raster<f64>,
    mask: Option<&Raster<u8>>,
) -> Result<WaterIndexRaster> {
    green.ensure_same_shape(nir, "green/NIR bands")?;
    if let Some(m) = mask {
        green.ensure_same_shape(m, "band/corridor mask")?;
    }

    let (rows, cols) = green.shape();
    let nodata_green = green.nodata();
    let nodata_nir = nir.nodata();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                if let Some(m) = mask {
                    if unsafe { m.get_unchecked(row, col) } == 0 {
                        continue;
                    }
                }
                let g = unsafe { green.get_unchecked(row, col) };
                let n = unsafe { nir.get_unchecked(row, col) };
                if is_declared_nodata(g, nodata_green) || is_declared_nodata(n, nodata_nir) {
                    continue;
                }
                *out = ndwi_value(g, n);
            }
            row_data
        })
        .collect();

    let array = Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;
    let mut raster = green.derive(array)?;
    raster.set_nodata(Some(f64::NAN));

    let stats = raster.statistics();
    debug!(
        "NDWI over {} valid pixels: min {:?}, max {:?}, mean {:?}",
        stats.valid_count, stats.min, stats.max, stats.mean
    );

    Ok(WaterIndexRaster { raster })
}

/// Pixels whose index is strictly above `threshold` (1 = water).
///
/// Excluded pixels are never water.
pub fn detect_water_pixels(index: &WaterIndexRaster, threshold: f64) -> Raster<u8> {
    let raster = index.raster();
    let water = raster.data().mapv(|v| u8::from(v > threshold));

    let count = water.iter().filter(|&&v| v == 1).count();
    let valid = index.valid_count();
    let fraction = if valid > 0 { count as f64 / valid as f64 } else { 0.0 };
    info!(
        "Water pixels (NDWI > {}): {} of {} valid ({:.2}%), grid {}x{}",
        threshold,
        count,
        valid,
        fraction * 100.0,
        raster.rows(),
        raster.cols()
    );

    let mut out = Raster::from_array(water);
    out.set_transform(*raster.transform());
    out.set_crs(raster.crs().cloned());
    out
}
