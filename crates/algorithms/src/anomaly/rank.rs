//! Candidate ranking

use super::LeakCandidate;
use tracing::debug;

/// Parameters for ranking leak candidates
#[derive(Debug, Clone)]
pub struct RankParams {
    /// Candidates smaller than this are dropped
    pub min_area_m2: f64,
    /// Maximum number of candidates kept
    pub top_k: usize,
}

impl Default for RankParams {
    fn default() -> Self {
        Self {
            min_area_m2: 25.0,
            top_k: 10,
        }
    }
}

/// Keep candidates with `area_m2 >= min_area`, largest first (ties broken
/// by higher confidence), at most `top_k` of them.
pub fn rank(mut candidates: Vec<LeakCandidate>, min_area: f64, top_k: usize) -> Vec<LeakCandidate> {
    let before = candidates.len();
    candidates.retain(|c| c.area_m2 >= min_area);
    candidates.sort_by(|a, b| {
        b.area_m2
            .total_cmp(&a.area_m2)
            .then_with(|| b.confidence.total_cmp(&a.confidence))
    });
    candidates.truncate(top_k);
    debug!(
        "Ranked {} candidate(s) → {} (min area {} m², top {})",
        before,
        candidates.len(),
        min_area,
        top_k
    );
    candidates
}
