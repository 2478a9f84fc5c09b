//! Clustering changed pixels into leak candidates
//!
//! Connected regions of gained water become [`LeakCandidate`]s; regions of
//! lost water are summarised separately as [`WaterLoss`] context.
//!
//! # Confidence
//!
//! ```text
//! area_term   = 1 - exp(-area_m2 / 500)
//! excess_term = 1 - exp(-mean_excess / 0.2)
//! confidence  = 0.5 * area_term + 0.5 * excess_term
//! ```
//!
//! `mean_excess` is the mean of `diff - threshold` over the region's pixels.
//! Both terms lie in [0, 1) and grow strictly with their input, so the score
//! is in [0, 1] and increases with area and with how far the index rose past
//! the threshold. 500 m² is five Sentinel-2 10 m pixels; an excess of 0.2
//! NDWI is roughly the jump from moist soil to open water.

use crate::components::{label_components, Component, Connectivity};
use crate::imagery::{ChangeMask, CLASS_GAINED, CLASS_LOST};
use geo::{ConvexHull, MultiPoint, Point, Polygon};
use seepwatch_core::{Error, GeoTransform, Result};
use tracing::{debug, info};

const AREA_SCALE_M2: f64 = 500.0;
const EXCESS_SCALE: f64 = 0.2;

/// Parameters for clustering changed pixels
#[derive(Debug, Clone, Default)]
pub struct ClusterParams {
    pub connectivity: Connectivity,
}

/// A potential leak: a connected region of newly appeared water.
#[derive(Debug, Clone, PartialEq)]
pub struct LeakCandidate {
    /// Outline of the region (convex hull of its pixels) in raster CRS
    pub geometry: Polygon<f64>,
    /// Score in [0, 1]
    pub confidence: f64,
    pub area_m2: f64,
    /// Mean pixel centre in raster CRS
    pub centroid: (f64, f64),
    /// (min_x, min_y, max_x, max_y) in raster CRS
    pub bbox: (f64, f64, f64, f64),
    pub pixel_count: usize,
    /// Mean index increase over the region
    pub mean_change: f64,
}

/// A connected region of lost water, reported for context
#[derive(Debug, Clone, PartialEq)]
pub struct WaterLoss {
    pub area_m2: f64,
    pub centroid: (f64, f64),
    pub bbox: (f64, f64, f64, f64),
    pub pixel_count: usize,
    /// Mean index decrease over the region (negative)
    pub mean_change: f64,
}

/// Confidence for a region of `area_m2` whose index rose on average
/// `mean_excess` above the change threshold.
pub fn confidence_score(area_m2: f64, mean_excess: f64) -> f64 {
    let area_term = 1.0 - (-area_m2.max(0.0) / AREA_SCALE_M2).exp();
    let excess_term = 1.0 - (-mean_excess.max(0.0) / EXCESS_SCALE).exp();
    (0.5 * area_term + 0.5 * excess_term).clamp(0.0, 1.0)
}

struct Region {
    centroid: (f64, f64),
    bbox: (f64, f64, f64, f64),
    corners: Vec<Point<f64>>,
    mean_change: f64,
}

fn describe(component: &Component, transform: &GeoTransform, mask: &ChangeMask) -> Region {
    let n = component.len() as f64;
    let diff = mask.difference().data();

    let mut sx = 0.0;
    let mut sy = 0.0;
    let mut sum_change = 0.0;
    let mut min_x = f64::INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    let mut corners = Vec::with_capacity(component.len() * 4);

    for &(row, col) in &component.pixels {
        let (cx, cy) = transform.apply(col as f64 + 0.5, row as f64 + 0.5);
        sx += cx;
        sy += cy;
        sum_change += diff[[row, col]];

        for (dc, dr) in [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)] {
            let (x, y) = transform.apply(col as f64 + dc, row as f64 + dr);
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
            corners.push(Point::new(x, y));
        }
    }

    Region {
        centroid: (sx / n, sy / n),
        bbox: (min_x, min_y, max_x, max_y),
        corners,
        mean_change: sum_change / n,
    }
}

fn check_pixel_size(pixel_size_m: f64) -> Result<()> {
    if pixel_size_m.is_finite() && pixel_size_m > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidParameter {
            name: "pixel size",
            value: pixel_size_m.to_string(),
            reason: "must be a positive number of metres".into(),
        })
    }
}

/// Group gained-water pixels into leak candidates.
///
/// `area_m2 = pixels * pixel_size_m²`. Candidates come out in row-major
/// discovery order; use [`rank`](super::rank) to order them.
pub fn cluster(
    mask: &ChangeMask,
    pixel_size_m: f64,
    params: &ClusterParams,
) -> Result<Vec<LeakCandidate>> {
    check_pixel_size(pixel_size_m)?;
    let transform = *mask.classes().transform();
    let threshold = mask.threshold();

    let (_, components) =
        label_components(mask.classes().data(), params.connectivity, |&c| c == CLASS_GAINED);

    let candidates: Vec<LeakCandidate> = components
        .iter()
        .map(|comp| {
            let region = describe(comp, &transform, mask);
            let area_m2 = comp.len() as f64 * pixel_size_m * pixel_size_m;
            LeakCandidate {
                geometry: MultiPoint::from(region.corners).convex_hull(),
                confidence: confidence_score(area_m2, region.mean_change - threshold),
                area_m2,
                centroid: region.centroid,
                bbox: region.bbox,
                pixel_count: comp.len(),
                mean_change: region.mean_change,
            }
        })
        .collect();

    info!("Clustered {} leak candidate region(s)", candidates.len());
    Ok(candidates)
}

/// Summarise lost-water regions, largest first.
pub fn summarize_losses(
    mask: &ChangeMask,
    pixel_size_m: f64,
    params: &ClusterParams,
) -> Result<Vec<WaterLoss>> {
    check_pixel_size(pixel_size_m)?;
    let transform = *mask.classes().transform();

    let (_, components) =
        label_components(mask.classes().data(), params.connectivity, |&c| c == CLASS_LOST);

    let mut losses: Vec<WaterLoss> = components
        .iter()
        .map(|comp| {
            let region = describe(comp, &transform, mask);
            WaterLoss {
                area_m2: comp.len() as f64 * pixel_size_m * pixel_size_m,
                centroid: region.centroid,
                bbox: region.bbox,
                pixel_count: comp.len(),
                mean_change: region.mean_change,
            }
        })
        .collect();
    losses.sort_by(|a, b| b.area_m2.total_cmp(&a.area_m2));

    debug!("Found {} lost-water region(s)", losses.len());
    Ok(losses)
}
