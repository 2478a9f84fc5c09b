//! Anomaly clustering and ranking
//!
//! - Candidates: gained-water regions → [`LeakCandidate`], lost-water context
//! - Rank: area/top-k filtering and ordering
//! - Export: GeoJSON FeatureCollection of ranked candidates

mod candidates;
mod export;
mod rank;

pub use candidates::{
    cluster, confidence_score, summarize_losses, ClusterParams, LeakCandidate, WaterLoss,
};
pub use export::candidates_to_geojson;
pub use rank::{rank, RankParams};
