//! # SeepWatch Algorithms
//!
//! Raster and vector analysis for pipeline leak detection.
//!
//! ## Modules
//!
//! - **vector**: pipeline geometry loading, buffering, corridor masks
//! - **imagery**: NDWI water index, water pixels, change detection
//! - **anomaly**: clustering changed pixels into leak candidates, ranking, GeoJSON export
//! - **components**: connected-component labeling
//! - **pipeline**: the end-to-end [`LeakDetector`](pipeline::LeakDetector)

pub mod anomaly;
pub mod components;
pub mod imagery;
pub(crate) mod maybe_rayon;
pub mod pipeline;
pub mod vector;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::anomaly::{
        candidates_to_geojson, cluster, rank, summarize_losses, ClusterParams, LeakCandidate,
        RankParams, WaterLoss,
    };
    pub use crate::components::Connectivity;
    pub use crate::imagery::{
        compute_index, detect_change, detect_water_pixels, ChangeMask, ChangeParams, ChangeStats,
        WaterIndexRaster,
    };
    pub use crate::pipeline::{BandSource, Detection, DetectionParams, LeakDetector, SceneBands};
    pub use crate::vector::{corridor_mask, load_aoi, BufferParams, GridSpec};
    pub use seepwatch_core::prelude::*;
}
