//! Change detection between a baseline and a current water index
//!
//! `diff = current - baseline`
//!
//! - gained water: `diff > threshold`
//! - lost water: `diff < -threshold`
//!
//! Regions smaller than `min_area_pixels` are removed from each class
//! independently before statistics are taken, so isolated noisy pixels never
//! reach clustering. Pixels excluded from either index are excluded here too.

use super::water_index::WaterIndexRaster;
use crate::components::{label_components, Connectivity};
use crate::maybe_rayon::*;
use ndarray::Array2;
use seepwatch_core::{Error, Raster, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// No significant change
pub const CLASS_NONE: u8 = 0;
/// Water gained (index increased)
pub const CLASS_GAINED: u8 = 1;
/// Water lost (index decreased)
pub const CLASS_LOST: u8 = 2;
/// Excluded from the analysis in either input
pub const CLASS_EXCLUDED: u8 = 255;

/// Parameters for change detection
#[derive(Debug, Clone)]
pub struct ChangeParams {
    /// Minimum absolute index difference counted as change
    pub threshold: f64,
    /// Minimum connected pixels for a change region to survive
    pub min_area_pixels: usize,
    /// Adjacency used by the minimum-area filter
    pub connectivity: Connectivity,
}

impl Default for ChangeParams {
    fn default() -> Self {
        Self {
            threshold: 0.1,
            min_area_pixels: 10,
            connectivity: Connectivity::Eight,
        }
    }
}

/// Summary of a change detection run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeStats {
    pub total_changed_pixels: usize,
    pub gained_pixels: usize,
    pub lost_pixels: usize,
    /// Largest difference over valid pixels
    pub max_positive_change: Option<f64>,
    /// Smallest difference over valid pixels
    pub max_negative_change: Option<f64>,
    pub mean_change: Option<f64>,
    /// Population standard deviation of the difference
    pub std_change: Option<f64>,
    pub valid_pixels: usize,
    pub excluded_pixels: usize,
    /// Changed pixels dropped by the minimum-area filter
    pub filtered_pixels: usize,
}

/// Per-pixel change classes aligned 1:1 with the two input indices.
#[derive(Debug, Clone)]
pub struct ChangeMask {
    classes: Raster<u8>,
    difference: Raster<f64>,
    threshold: f64,
}

impl ChangeMask {
    /// Class raster: [`CLASS_NONE`], [`CLASS_GAINED`], [`CLASS_LOST`] or [`CLASS_EXCLUDED`]
    pub fn classes(&self) -> &Raster<u8> {
        &self.classes
    }

    /// `current - baseline`, NaN where excluded
    pub fn difference(&self) -> &Raster<f64> {
        &self.difference
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn shape(&self) -> (usize, usize) {
        self.classes.shape()
    }

    pub fn pixel_size(&self) -> f64 {
        self.classes.cell_size()
    }

    pub fn class_at(&self, row: usize, col: usize) -> Option<u8> {
        self.classes.data().get((row, col)).copied()
    }

    /// Boolean change raster: 1 where gained or lost
    pub fn changed(&self) -> Raster<u8> {
        let mut out = self.classes.clone();
        out.data_mut()
            .mapv_inplace(|c| u8::from(c == CLASS_GAINED || c == CLASS_LOST));
        out
    }

    pub fn count(&self, class: u8) -> usize {
        self.classes.data().iter().filter(|&&c| c == class).count()
    }
}

/// Compare two water indices of the same grid.
///
/// Fails with [`Error::ShapeMismatch`] when the shapes differ; nothing is
/// broadcast or resampled.
pub fn detect_change(
    baseline: &WaterIndexRaster,
    current: &WaterIndexRaster,
    params: &ChangeParams,
) -> Result<(ChangeMask, ChangeStats)> {
    baseline
        .raster()
        .ensure_same_shape(current.raster(), "baseline/current index")?;
    if !(params.threshold.is_finite() && params.threshold >= 0.0) {
        return Err(Error::InvalidParameter {
            name: "change threshold",
            value: params.threshold.to_string(),
            reason: "must be a finite, non-negative index difference".into(),
        });
    }

    let (rows, cols) = baseline.shape();
    let before = baseline.raster();
    let after = current.raster();
    let t = params.threshold;

    let (diff_data, class_data): (Vec<f64>, Vec<u8>) = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut out = Vec::with_capacity(cols);
            for col in 0..cols {
                let b = unsafe { before.get_unchecked(row, col) };
                let a = unsafe { after.get_unchecked(row, col) };

                if b.is_nan() || a.is_nan() {
                    out.push((f64::NAN, CLASS_EXCLUDED));
                } else {
                    let d = a - b;
                    let class = if d > t {
                        CLASS_GAINED
                    } else if d < -t {
                        CLASS_LOST
                    } else {
                        CLASS_NONE
                    };
                    out.push((d, class));
                }
            }
            out
        })
        .unzip();

    let to_array = |e: ndarray::ShapeError| Error::Other(e.to_string());
    let mut classes = Array2::from_shape_vec((rows, cols), class_data).map_err(to_array)?;
    let diff = Array2::from_shape_vec((rows, cols), diff_data).map_err(to_array)?;

    let mut filtered = 0;
    if params.min_area_pixels > 1 {
        for class in [CLASS_GAINED, CLASS_LOST] {
            filtered += remove_small_regions(&mut classes, class, params.min_area_pixels, params.connectivity);
        }
    }

    let stats = change_statistics(&classes, &diff, filtered);
    info!(
        "Change detection: {} pixels changed ({} gained, {} lost, {} removed as noise)",
        stats.total_changed_pixels, stats.gained_pixels, stats.lost_pixels, stats.filtered_pixels
    );

    let mut class_raster = before.derive(classes)?;
    class_raster.set_nodata(Some(CLASS_EXCLUDED));
    let mut difference = before.derive(diff)?;
    difference.set_nodata(Some(f64::NAN));

    Ok((
        ChangeMask {
            classes: class_raster,
            difference,
            threshold: t,
        },
        stats,
    ))
}

/// Reset regions of `class` smaller than `min_pixels` to [`CLASS_NONE`].
/// Returns the number of pixels removed.
fn remove_small_regions(
    classes: &mut Array2<u8>,
    class: u8,
    min_pixels: usize,
    connectivity: Connectivity,
) -> usize {
    let (_, components) = label_components(classes, connectivity, |&c| c == class);
    let mut removed = 0;
    for comp in components.iter().filter(|c| c.len() < min_pixels) {
        for &(r, c) in &comp.pixels {
            classes[[r, c]] = CLASS_NONE;
        }
        removed += comp.len();
    }
    removed
}

fn change_statistics(classes: &Array2<u8>, diff: &Array2<f64>, filtered: usize) -> ChangeStats {
    let mut gained = 0;
    let mut lost = 0;
    let mut excluded = 0;
    for &c in classes.iter() {
        match c {
            CLASS_GAINED => gained += 1,
            CLASS_LOST => lost += 1,
            CLASS_EXCLUDED => excluded += 1,
            _ => {}
        }
    }

    let valid: Vec<f64> = diff.iter().copied().filter(|v| !v.is_nan()).collect();
    let n = valid.len();
    let (max, min, mean, std) = if n == 0 {
        (None, None, None, None)
    } else {
        let max = valid.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min = valid.iter().copied().fold(f64::INFINITY, f64::min);
        let mean = valid.iter().sum::<f64>() / n as f64;
        let var = valid.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n as f64;
        (Some(max), Some(min), Some(mean), Some(var.sqrt()))
    };

    ChangeStats {
        total_changed_pixels: gained + lost,
        gained_pixels: gained,
        lost_pixels: lost,
        max_positive_change: max,
        max_negative_change: min,
        mean_change: mean,
        std_change: std,
        valid_pixels: n,
        excluded_pixels: excluded,
        filtered_pixels: filtered,
    }
}
