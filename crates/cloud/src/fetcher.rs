//! Idempotent scene downloads
//!
//! Files land at `<output_dir>/<YYYY-MM-DD>/<scene_id>_<name>.tif`, where
//! `name` is `green`/`nir` for spectral bands and the asset key otherwise.
//! A file already at its target path is reused and never downloaded again.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::scene::{SceneAsset, SceneReference};
use crate::transport::AssetTransport;

/// Asset keys holding the green band, in preference order
pub const GREEN_KEYS: &[&str] = &["B03", "green", "b03", "B03_10m"];
/// Asset keys holding the near-infrared band, in preference order
pub const NIR_KEYS: &[&str] = &["B08", "nir", "b08", "B08_10m"];
/// Composite products used when the bands are not published separately
pub const COMPOSITE_KEYS: &[&str] = &["visual", "TCI", "rendered_preview", "overview", "red"];

/// Options for [`Fetcher`]
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub output_dir: PathBuf,
    /// Concurrent transfers, clamped to 2..=4 (default 3)
    pub concurrency: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("data"),
            concurrency: 3,
        }
    }
}

/// Which assets of a scene to download and the name each is saved under
pub fn select_assets(scene: &SceneReference) -> Vec<(String, &SceneAsset)> {
    let find = |keys: &[&str]| keys.iter().find_map(|k| scene.assets.get(*k));

    if let (Some(green), Some(nir)) = (find(GREEN_KEYS), find(NIR_KEYS)) {
        return vec![("green".to_string(), green), ("nir".to_string(), nir)];
    }

    if let Some((key, asset)) = COMPOSITE_KEYS
        .iter()
        .find_map(|k| scene.assets.get_key_value(*k))
    {
        return vec![(key.clone(), asset)];
    }

    let is_raster = |a: &SceneAsset| {
        a.media_type.as_deref().is_some_and(|t| t.contains("tiff"))
            || a.href.ends_with(".tif")
            || a.href.ends_with(".tiff")
    };
    scene
        .assets
        .iter()
        .find(|(_, a)| is_raster(a))
        .or_else(|| scene.assets.iter().next())
        .map(|(key, asset)| vec![(key.clone(), asset)])
        .unwrap_or_default()
}

/// Deterministic local path of a scene asset
pub fn target_path(output_dir: &Path, scene: &SceneReference, name: &str) -> PathBuf {
    output_dir
        .join(scene.date_label())
        .join(format!("{}_{}.tif", sanitize(&scene.id), name))
}

fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect()
}

/// A file obtained for a scene
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchedAsset {
    pub scene_id: String,
    /// `green`, `nir` or the asset key
    pub name: String,
    pub path: PathBuf,
}

/// Result of a multi-scene fetch
#[derive(Debug, Clone, Default, Serialize)]
pub struct FetchOutcome {
    /// Assets selected for download
    pub requested: usize,
    /// Assets now on disk, in scene order
    pub files: Vec<FetchedAsset>,
}

impl FetchOutcome {
    pub fn obtained(&self) -> usize {
        self.files.len()
    }
}

/// Downloads selected scene assets with a bounded pool of transfers
pub struct Fetcher {
    transport: Arc<dyn AssetTransport>,
    options: FetchOptions,
}

impl Fetcher {
    pub fn new(transport: Arc<dyn AssetTransport>, options: FetchOptions) -> Self {
        Self { transport, options }
    }

    pub fn output_dir(&self) -> &Path {
        &self.options.output_dir
    }

    /// Fetch one asset, returning its local path.
    ///
    /// Failures are logged and give `None`; they never abort other fetches.
    pub async fn fetch_asset(
        &self,
        scene: &SceneReference,
        name: &str,
        asset: &SceneAsset,
    ) -> Option<PathBuf> {
        let path = target_path(&self.options.output_dir, scene, name);

        match tokio::fs::try_exists(&path).await {
            Ok(true) => {
                debug!("Reusing {}", path.display());
                return Some(path);
            }
            Ok(false) => {}
            Err(e) => {
                warn!("Cannot check {}: {}", path.display(), e);
                return None;
            }
        }

        if let Some(dir) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(dir).await {
                warn!("Cannot create {}: {}", dir.display(), e);
                return None;
            }
        }

        match self.transport.download(asset, &path).await {
            Ok(bytes) => {
                info!("Fetched {} {} ({} bytes)", scene.id, name, bytes);
                Some(path)
            }
            Err(e) => {
                warn!("Skipping {} {}: {}", scene.id, name, e);
                None
            }
        }
    }

    /// Fetch the selected assets of every scene.
    pub async fn fetch_scenes(&self, scenes: &[SceneReference]) -> FetchOutcome {
        let jobs: Vec<(usize, &SceneReference, String, &SceneAsset)> = scenes
            .iter()
            .flat_map(|scene| {
                let selected = select_assets(scene);
                if selected.is_empty() {
                    warn!("Scene {} has no downloadable assets", scene.id);
                }
                selected
                    .into_iter()
                    .map(move |(name, asset)| (scene, name, asset))
            })
            .enumerate()
            .map(|(i, (scene, name, asset))| (i, scene, name, asset))
            .collect();
        let requested = jobs.len();

        let pool = self.options.concurrency.clamp(2, 4);
        let mut done: Vec<(usize, FetchedAsset)> = stream::iter(jobs)
            .map(move |(i, scene, name, asset)| async move {
                self.fetch_asset(scene, &name, asset).await.map(|path| {
                    (
                        i,
                        FetchedAsset {
                            scene_id: scene.id.clone(),
                            name,
                            path,
                        },
                    )
                })
            })
            .buffer_unordered(pool)
            .filter_map(|r| async move { r })
            .collect()
            .await;
        done.sort_by_key(|(i, _)| *i);

        let outcome = FetchOutcome {
            requested,
            files: done.into_iter().map(|(_, f)| f).collect(),
        };
        info!(
            "Obtained {} of {} requested asset(s)",
            outcome.obtained(),
            outcome.requested
        );
        outcome
    }
}
