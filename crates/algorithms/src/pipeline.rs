//! End-to-end detection: two scenes + AOI → ranked leak candidates
//!
//! Stages run in order on the calling thread (each parallelizes internally):
//! corridor mask, water index per scene, change detection, clustering,
//! ranking. The cancel flag is checked before each stage.

use crate::anomaly::{
    cluster, rank, summarize_losses, ClusterParams, LeakCandidate, RankParams, WaterLoss,
};
use crate::imagery::{
    compute_index, detect_change, detect_water_pixels, ChangeMask, ChangeParams, ChangeStats,
    WaterIndexRaster, DEFAULT_WATER_THRESHOLD,
};
use crate::vector::{corridor_mask, GridSpec};
use seepwatch_core::io::{band_count, read_geotiff};
use seepwatch_core::{AreaOfInterest, CancelFlag, Error, Raster, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Mean metres per degree of latitude
const METRES_PER_DEGREE: f64 = 111_320.0;

/// File name suffixes of separately stored green/NIR bands
const BAND_PAIR_SUFFIXES: [(&str, &str); 2] = [("_green", "_nir"), ("_B03", "_B08")];

/// Where a scene's green and NIR bands live on disk
#[derive(Debug, Clone, PartialEq)]
pub enum BandSource {
    /// One multi-band GeoTIFF; band numbers are 1-based
    Stacked {
        path: PathBuf,
        green_band: usize,
        nir_band: usize,
    },
    /// Two single-band files
    Pair { green: PathBuf, nir: PathBuf },
}

impl BandSource {
    /// Work out how to read `path`.
    ///
    /// A file named `<scene>_green.tif` (or `_B03`) is paired with its
    /// `<scene>_nir.tif` (or `_B08`) sibling, and vice versa. Any other file
    /// must hold at least `max(green_band, nir_band)` bands.
    pub fn resolve(path: &Path, green_band: usize, nir_band: usize) -> Result<Self> {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("tif");

        for (g, n) in BAND_PAIR_SUFFIXES {
            let (scene, green_is_given) = if let Some(scene) = stem.strip_suffix(g) {
                (scene, true)
            } else if let Some(scene) = stem.strip_suffix(n) {
                (scene, false)
            } else {
                continue;
            };
            let sibling = path.with_file_name(format!(
                "{}{}.{}",
                scene,
                if green_is_given { n } else { g },
                ext
            ));
            if !sibling.exists() {
                return Err(Error::InvalidParameter {
                    name: "imagery path",
                    value: path.display().to_string(),
                    reason: format!("matching band file {} not found", sibling.display()),
                });
            }
            let (green, nir) = if green_is_given {
                (path.to_path_buf(), sibling)
            } else {
                (sibling, path.to_path_buf())
            };
            return Ok(BandSource::Pair { green, nir });
        }

        let bands = band_count(path)?;
        let needed = green_band.max(nir_band);
        if green_band == 0 || nir_band == 0 || bands < needed {
            return Err(Error::InvalidParameter {
                name: "imagery path",
                value: path.display().to_string(),
                reason: format!(
                    "has {} band(s) but green={} / nir={} were requested; \
                     provide a multi-band stack or <scene>_green.tif with <scene>_nir.tif",
                    bands, green_band, nir_band
                ),
            });
        }
        Ok(BandSource::Stacked {
            path: path.to_path_buf(),
            green_band,
            nir_band,
        })
    }
}

/// Green and NIR bands of one scene, on the same grid
#[derive(Debug, Clone)]
pub struct SceneBands {
    pub id: String,
    pub green: Raster<f64>,
    pub nir: Raster<f64>,
}

impl SceneBands {
    pub fn new(id: impl Into<String>, green: Raster<f64>, nir: Raster<f64>) -> Result<Self> {
        green.ensure_same_grid(&nir, "green/NIR bands")?;
        Ok(Self {
            id: id.into(),
            green,
            nir,
        })
    }

    /// Read both bands from disk.
    pub fn load(source: &BandSource) -> Result<Self> {
        match source {
            BandSource::Stacked {
                path,
                green_band,
                nir_band,
            } => {
                let green = read_geotiff(path, Some(*green_band))?;
                let nir = read_geotiff(path, Some(*nir_band))?;
                Self::new(scene_id(path), green, nir)
            }
            BandSource::Pair { green, nir } => {
                let g = read_geotiff(green, None)?;
                let n = read_geotiff(nir, None)?;
                Self::new(scene_id(green), g, n)
            }
        }
    }
}

fn scene_id(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("scene");
    BAND_PAIR_SUFFIXES
        .iter()
        .find_map(|&(g, n)| stem.strip_suffix(g).or_else(|| stem.strip_suffix(n)))
        .unwrap_or(stem)
        .to_string()
}

/// All parameters of a detection run
#[derive(Debug, Clone)]
pub struct DetectionParams {
    /// NDWI above which a pixel counts as water (reporting only)
    pub water_threshold: f64,
    pub change: ChangeParams,
    pub cluster: ClusterParams,
    pub rank: RankParams,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            water_threshold: DEFAULT_WATER_THRESHOLD,
            change: ChangeParams::default(),
            cluster: ClusterParams::default(),
            rank: RankParams::default(),
        }
    }
}

/// Everything a detection run produces
#[derive(Debug, Clone)]
pub struct Detection {
    pub baseline_id: String,
    pub current_id: String,
    pub baseline_index: WaterIndexRaster,
    pub current_index: WaterIndexRaster,
    pub change_mask: ChangeMask,
    pub stats: ChangeStats,
    /// Ranked candidates, best first
    pub candidates: Vec<LeakCandidate>,
    /// Lost-water regions, largest first
    pub losses: Vec<WaterLoss>,
    /// Ground pixel size used for areas
    pub pixel_size_m: f64,
}

/// Runs the detection stages for one corridor.
pub struct LeakDetector {
    aoi: AreaOfInterest,
    params: DetectionParams,
    cancel: CancelFlag,
}

impl LeakDetector {
    pub fn new(aoi: AreaOfInterest, params: DetectionParams) -> Self {
        Self {
            aoi,
            params,
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn aoi(&self) -> &AreaOfInterest {
        &self.aoi
    }

    pub fn params(&self) -> &DetectionParams {
        &self.params
    }

    /// Compare the first (baseline) and last (current) of `scenes`.
    ///
    /// Fails with [`Error::InsufficientImagery`] for fewer than two scenes.
    pub fn run(&self, scenes: &[SceneBands]) -> Result<Detection> {
        match scenes {
            [baseline, .., current] => self.run_pair(baseline, current),
            _ => Err(Error::InsufficientImagery {
                required: 2,
                obtained: scenes.len(),
            }),
        }
    }

    /// Compare two scenes on the same grid.
    ///
    /// Scenes that differ in shape fail with [`Error::ShapeMismatch`]; scenes
    /// of the same shape on different ground (another tile, another UTM zone)
    /// fail with [`Error::MaskAlignment`].
    pub fn run_pair(&self, baseline: &SceneBands, current: &SceneBands) -> Result<Detection> {
        baseline
            .green
            .ensure_same_grid(&current.green, "baseline/current scene")?;

        self.cancel.check("corridor mask")?;
        let mask = corridor_mask(&self.aoi, &GridSpec::of(&baseline.green))?;

        self.cancel.check("water index")?;
        let baseline_index = compute_index(&baseline.green, &baseline.nir, Some(&mask))?;
        let current_index = compute_index(&current.green, &current.nir, Some(&mask))?;
        detect_water_pixels(&baseline_index, self.params.water_threshold);
        detect_water_pixels(&current_index, self.params.water_threshold);

        self.cancel.check("change detection")?;
        let (change_mask, stats) = detect_change(&baseline_index, &current_index, &self.params.change)?;

        self.cancel.check("clustering")?;
        let pixel_size_m = ground_pixel_size(&baseline.green, &self.aoi);
        let clustered = cluster(&change_mask, pixel_size_m, &self.params.cluster)?;
        let losses = summarize_losses(&change_mask, pixel_size_m, &self.params.cluster)?;
        let candidates = rank(clustered, self.params.rank.min_area_m2, self.params.rank.top_k);

        info!(
            "{} → {}: {} leak candidate(s), {} lost-water region(s)",
            baseline.id,
            current.id,
            candidates.len(),
            losses.len()
        );

        Ok(Detection {
            baseline_id: baseline.id.clone(),
            current_id: current.id.clone(),
            baseline_index,
            current_index,
            change_mask,
            stats,
            candidates,
            losses,
            pixel_size_m,
        })
    }
}

/// Pixel side in metres.
///
/// Geographic grids are converted at the AOI's latitude. East-west degrees
/// shrink with `cos(lat)` while north-south degrees do not, so the side
/// returned is the geometric mean of the two and its square is the true
/// pixel area.
fn ground_pixel_size(raster: &Raster<f64>, aoi: &AreaOfInterest) -> f64 {
    if !raster.crs().is_some_and(|c| c.is_geographic()) {
        return raster.cell_size();
    }
    let lat = aoi
        .reproject(&seepwatch_core::CRS::wgs84())
        .and_then(|a| a.bounding_box())
        .map(|b| b.center().y)
        .unwrap_or(0.0);
    warn!(
        "Raster is in geographic coordinates; approximating pixel size at latitude {:.3}",
        lat
    );
    let t = raster.transform();
    let dx = t.pixel_width.abs() * METRES_PER_DEGREE * lat.to_radians().cos();
    let dy = t.pixel_height.abs() * METRES_PER_DEGREE;
    (dx * dy).sqrt()
}
