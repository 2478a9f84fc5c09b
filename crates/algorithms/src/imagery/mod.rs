//! Imagery analysis
//!
//! - Water index: NDWI from green/NIR bands, water pixel detection
//! - Change detection: baseline vs current index → gained/lost water

mod change_detection;
mod water_index;

pub use change_detection::{
    detect_change, ChangeMask, ChangeParams, ChangeStats, CLASS_EXCLUDED, CLASS_GAINED,
    CLASS_LOST, CLASS_NONE,
};
pub use water_index::{compute_index, detect_water_pixels, WaterIndexRaster, DEFAULT_WATER_THRESHOLD};
