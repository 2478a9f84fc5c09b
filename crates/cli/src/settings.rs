//! Run-wide settings, read once from flags or `SEEPWATCH_*` variables

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use seepwatch_algorithms::anomaly::RankParams;
use seepwatch_algorithms::imagery::ChangeParams;
use seepwatch_algorithms::vector::BufferParams;
use seepwatch_cloud::{FetchOptions, IngestOptions, StacClientOptions};
use seepwatch_core::CancelFlag;

/// Network timeout: whole catalog calls, and connect/stall limit for downloads
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Args, Debug, Clone)]
pub struct Settings {
    /// NDWI change above which a pixel counts as changed water
    #[arg(long, global = true, env = "SEEPWATCH_NDWI_THRESHOLD", default_value_t = 0.2)]
    pub ndwi_threshold: f64,

    /// Smallest leak candidate reported, in square metres
    #[arg(long, global = true, env = "SEEPWATCH_MIN_LEAK_AREA_M2", default_value_t = 25.0)]
    pub min_leak_area_m2: f64,

    /// Corridor half-width around the pipeline, in metres
    #[arg(long, global = true, env = "SEEPWATCH_BUFFER_M", default_value_t = 100.0)]
    pub buffer_m: f64,

    /// Maximum scene cloud cover, in percent
    #[arg(long, global = true, env = "SEEPWATCH_MAX_CLOUD_COVER", default_value_t = 20.0)]
    pub max_cloud_cover: f64,

    /// Days either side of the target date to search
    #[arg(long, global = true, env = "SEEPWATCH_DAYS_TOLERANCE", default_value_t = 7)]
    pub days_tolerance: u32,

    /// Attempts of the whole search-and-download sequence
    #[arg(long, global = true, env = "SEEPWATCH_MAX_RETRIES", default_value_t = 3)]
    pub max_retries: u32,

    /// Root directory for downloaded imagery
    #[arg(long, global = true, env = "SEEPWATCH_DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// STAC API used when Planetary Computer has nothing (default: Copernicus Data Space)
    #[arg(long, global = true, env = "SEEPWATCH_STAC_API_URL")]
    pub stac_api_url: Option<String>,
}

impl Settings {
    pub fn buffer(&self) -> BufferParams {
        BufferParams {
            distance: self.buffer_m,
            ..Default::default()
        }
    }

    pub fn stac_client(&self, cancel: &CancelFlag) -> StacClientOptions {
        StacClientOptions {
            request_timeout: REQUEST_TIMEOUT,
            max_retries: self.max_retries,
            cancel: cancel.clone(),
            ..Default::default()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        REQUEST_TIMEOUT
    }

    pub fn fetch(&self, output_dir: Option<PathBuf>) -> FetchOptions {
        FetchOptions {
            output_dir: output_dir.unwrap_or_else(|| self.data_dir.clone()),
            ..Default::default()
        }
    }

    pub fn ingest(&self) -> IngestOptions {
        IngestOptions {
            days_tolerance: self.days_tolerance,
            max_cloud_cover: self.max_cloud_cover,
            max_retries: self.max_retries,
            ..Default::default()
        }
    }

    pub fn change(&self, min_region_pixels: usize) -> ChangeParams {
        ChangeParams {
            threshold: self.ndwi_threshold,
            min_area_pixels: min_region_pixels,
            ..Default::default()
        }
    }

    pub fn rank(&self, top_k: usize) -> RankParams {
        RankParams {
            min_area_m2: self.min_leak_area_m2,
            top_k,
        }
    }
}
