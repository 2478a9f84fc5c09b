//! JSON summary written next to the detection outputs

use seepwatch_algorithms::anomaly::{LeakCandidate, WaterLoss};
use seepwatch_algorithms::imagery::ChangeStats;
use seepwatch_algorithms::pipeline::Detection;
use serde::Serialize;

#[derive(Serialize)]
pub struct DetectSummary<'a> {
    pub baseline: &'a str,
    pub current: &'a str,
    pub crs: Option<String>,
    pub pixel_size_m: f64,
    pub stats: &'a ChangeStats,
    pub candidates: Vec<CandidateSummary>,
    pub water_losses: Vec<LossSummary>,
}

#[derive(Serialize)]
pub struct CandidateSummary {
    pub rank: usize,
    pub confidence: f64,
    pub area_m2: f64,
    pub pixel_count: usize,
    pub mean_change: f64,
    pub centroid: [f64; 2],
    pub bbox: [f64; 4],
}

#[derive(Serialize)]
pub struct LossSummary {
    pub area_m2: f64,
    pub pixel_count: usize,
    pub mean_change: f64,
    pub centroid: [f64; 2],
}

impl CandidateSummary {
    fn new(rank: usize, c: &LeakCandidate) -> Self {
        Self {
            rank,
            confidence: c.confidence,
            area_m2: c.area_m2,
            pixel_count: c.pixel_count,
            mean_change: c.mean_change,
            centroid: [c.centroid.0, c.centroid.1],
            bbox: [c.bbox.0, c.bbox.1, c.bbox.2, c.bbox.3],
        }
    }
}

impl From<&WaterLoss> for LossSummary {
    fn from(l: &WaterLoss) -> Self {
        Self {
            area_m2: l.area_m2,
            pixel_count: l.pixel_count,
            mean_change: l.mean_change,
            centroid: [l.centroid.0, l.centroid.1],
        }
    }
}

impl<'a> DetectSummary<'a> {
    pub fn new(detection: &'a Detection) -> Self {
        Self {
            baseline: &detection.baseline_id,
            current: &detection.current_id,
            crs: detection
                .change_mask
                .classes()
                .crs()
                .map(|c| c.identifier()),
            pixel_size_m: detection.pixel_size_m,
            stats: &detection.stats,
            candidates: detection
                .candidates
                .iter()
                .enumerate()
                .map(|(i, c)| CandidateSummary::new(i + 1, c))
                .collect(),
            water_losses: detection.losses.iter().map(LossSummary::from).collect(),
        }
    }
}
