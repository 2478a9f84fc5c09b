//! Search-and-fetch with whole-sequence retries
//!
//! One attempt searches the catalog and downloads the best few scenes. If
//! nothing at all was obtained, the attempt is repeated with exponential
//! backoff. Cancellation is checked before every attempt and between search
//! and fetch.

use std::time::Duration;

use chrono::{NaiveDate, Utc};
use seepwatch_core::{AreaOfInterest, CancelFlag};
use serde::Serialize;
use tracing::{info, warn};

use crate::catalog::CatalogClient;
use crate::error::{CloudError, Result};
use crate::fetcher::{FetchOutcome, Fetcher};
use crate::scene::{SceneQuery, SceneReference};
use crate::stac_client::backoff_delay;

/// Options for [`Ingestor`]
#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub days_tolerance: u32,
    /// Percent
    pub max_cloud_cover: f64,
    /// Attempts of the whole search-and-fetch sequence (default 3)
    pub max_retries: u32,
    /// Delay after the first failed attempt, doubled after each further one
    pub retry_backoff: Duration,
    /// Best-matching scenes fetched per attempt (default 3)
    pub max_scenes: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            days_tolerance: 7,
            max_cloud_cover: 20.0,
            max_retries: 3,
            retry_backoff: Duration::from_secs(2),
            max_scenes: 3,
        }
    }
}

/// What an ingestion run produced
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    /// Scenes selected for download, best match first
    pub scenes: Vec<SceneReference>,
    pub outcome: FetchOutcome,
    /// Attempts made, including the successful one
    pub attempts: u32,
}

pub struct Ingestor {
    catalog: CatalogClient,
    fetcher: Fetcher,
    options: IngestOptions,
    cancel: CancelFlag,
}

impl Ingestor {
    pub fn new(catalog: CatalogClient, fetcher: Fetcher, options: IngestOptions) -> Self {
        Self {
            catalog,
            fetcher,
            options,
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn options(&self) -> &IngestOptions {
        &self.options
    }

    fn checkpoint(&self, stage: &str) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(CloudError::Cancelled(stage.to_string()));
        }
        Ok(())
    }

    /// Download imagery of `aoi` acquired around `target`.
    ///
    /// Fails with `InvalidParameter` for a future date and `InvalidGeometry`
    /// for an unusable AOI before any network call. After all attempts, a run
    /// in which no provider ever returned scenes fails with `ImagerySearch`;
    /// otherwise zero obtained files fails with `DownloadExhausted`.
    pub async fn ingest(&self, aoi: &AreaOfInterest, target: NaiveDate) -> Result<IngestReport> {
        let today = Utc::now().date_naive();
        if target > today {
            return Err(CloudError::Core(seepwatch_core::Error::InvalidParameter {
                name: "target date",
                value: target.to_string(),
                reason: format!("is after today ({today})"),
            }));
        }

        let query = SceneQuery::for_aoi(
            aoi,
            target,
            self.options.days_tolerance,
            self.options.max_cloud_cover,
        )?;
        let (start, end) = query.window();
        info!(
            "Ingesting imagery from {} to {} over {:?}",
            start, end, query.bbox
        );

        let attempts = self.options.max_retries.max(1);
        let mut last_search_error = None;
        let mut requested = 0;

        for attempt in 1..=attempts {
            if attempt > 1 {
                self.checkpoint("ingestion retry")?;
                let delay = backoff_delay(self.options.retry_backoff, attempt - 1);
                info!("Retrying ingestion in {:?} (attempt {} of {})", delay, attempt, attempts);
                tokio::time::sleep(delay).await;
            }
            self.checkpoint("imagery search")?;

            let mut scenes = match self.catalog.search(&query).await {
                Ok(scenes) => scenes,
                Err(e @ CloudError::Cancelled(_)) => return Err(e),
                Err(e) => {
                    warn!("Attempt {} of {}: {}", attempt, attempts, e);
                    last_search_error = Some(e);
                    continue;
                }
            };
            scenes.truncate(self.options.max_scenes);
            last_search_error = None;

            self.checkpoint("imagery download")?;
            let outcome = self.fetcher.fetch_scenes(&scenes).await;
            requested = outcome.requested;

            if outcome.obtained() > 0 {
                if outcome.obtained() < outcome.requested {
                    warn!(
                        "Partial download: obtained {} of {} asset(s)",
                        outcome.obtained(),
                        outcome.requested
                    );
                }
                return Ok(IngestReport {
                    scenes,
                    outcome,
                    attempts: attempt,
                });
            }
            warn!(
                "Attempt {} of {}: none of {} asset(s) could be downloaded",
                attempt, attempts, outcome.requested
            );
        }

        match last_search_error {
            Some(e) if requested == 0 => Err(e),
            _ => Err(CloudError::DownloadExhausted {
                attempts,
                requested,
                obtained: 0,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::FetchOptions;
    use crate::provider::CatalogProvider;
    use crate::scene::SceneAsset;
    use crate::transport::AssetTransport;
    use async_trait::async_trait;
    use geo::polygon;
    use seepwatch_core::CRS;
    use std::collections::BTreeMap;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct ScriptedProvider {
        /// Number of leading calls that fail
        failures: usize,
        scenes: Vec<SceneReference>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl CatalogProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn search(&self, _query: &SceneQuery) -> Result<Vec<SceneReference>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(CloudError::Network("timed out".into()))
            } else {
                Ok(self.scenes.clone())
            }
        }
    }

    struct FileTransport {
        fail: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AssetTransport for FileTransport {
        async fn download(&self, asset: &SceneAsset, dest: &Path) -> Result<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(CloudError::Status {
                    status: 503,
                    url: asset.href.clone(),
                });
            }
            tokio::fs::write(dest, b"tiff").await?;
            Ok(4)
        }
    }

    fn scene(id: &str, day: u32) -> SceneReference {
        let mut assets = BTreeMap::new();
        assets.insert(
            "visual".to_string(),
            SceneAsset {
                href: format!("https://example.com/{id}.tif"),
                media_type: None,
                requires_signing: false,
            },
        );
        SceneReference {
            id: id.to_string(),
            acquired: format!("2024-06-{day:02}T10:30:00Z").parse().ok(),
            cloud_cover: Some(5.0),
            bbox: None,
            assets,
            provider: "scripted".into(),
        }
    }

    fn aoi() -> AreaOfInterest {
        let poly = polygon![
            (x: -3.71, y: 40.41),
            (x: -3.70, y: 40.41),
            (x: -3.70, y: 40.42),
            (x: -3.71, y: 40.42),
        ];
        AreaOfInterest::new(poly, CRS::wgs84()).unwrap()
    }

    fn ingestor(
        provider: ScriptedProvider,
        transport: Arc<FileTransport>,
        dir: &Path,
    ) -> Ingestor {
        let fetcher = Fetcher::new(
            transport,
            FetchOptions {
                output_dir: dir.to_path_buf(),
                concurrency: 2,
            },
        );
        let options = IngestOptions {
            retry_backoff: Duration::ZERO,
            ..Default::default()
        };
        Ingestor::new(CatalogClient::new(vec![Box::new(provider)]), fetcher, options)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn fetches_at_most_three_best_scenes() {
        let dir = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider {
            failures: 0,
            scenes: vec![scene("a", 10), scene("b", 14), scene("c", 15), scene("d", 19)],
            calls: Arc::default(),
        };
        let transport = Arc::new(FileTransport { fail: false, calls: AtomicUsize::new(0) });
        let report = ingestor(provider, transport, dir.path())
            .ingest(&aoi(), date(2024, 6, 15))
            .await
            .unwrap();

        let ids: Vec<&str> = report.scenes.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["c", "b", "d"]);
        assert_eq!(report.outcome.obtained(), 3);
        assert_eq!(report.attempts, 1);
        assert!(dir.path().join("2024-06-15/c_visual.tif").exists());
    }

    #[tokio::test]
    async fn transient_search_failure_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = ScriptedProvider {
            failures: 2,
            scenes: vec![scene("a", 14)],
            calls: Arc::clone(&calls),
        };
        let transport = Arc::new(FileTransport { fail: false, calls: AtomicUsize::new(0) });
        let report = ingestor(provider, transport, dir.path())
            .ingest(&aoi(), date(2024, 6, 15))
            .await
            .unwrap();
        assert_eq!(report.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn zero_downloads_exhausts_retries() {
        let dir = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider {
            failures: 0,
            scenes: vec![scene("a", 14), scene("b", 16)],
            calls: Arc::default(),
        };
        let transport = Arc::new(FileTransport { fail: true, calls: AtomicUsize::new(0) });
        let err = ingestor(provider, Arc::clone(&transport), dir.path())
            .ingest(&aoi(), date(2024, 6, 15))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CloudError::DownloadExhausted { attempts: 3, requested: 2, obtained: 0 }
        ));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn search_never_succeeding_is_search_error() {
        let dir = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider {
            failures: usize::MAX,
            scenes: vec![],
            calls: Arc::default(),
        };
        let transport = Arc::new(FileTransport { fail: false, calls: AtomicUsize::new(0) });
        let err = ingestor(provider, transport, dir.path())
            .ingest(&aoi(), date(2024, 6, 15))
            .await
            .unwrap_err();
        assert!(matches!(err, CloudError::ImagerySearch(_)));
    }

    #[tokio::test]
    async fn future_date_rejected_before_search() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = ScriptedProvider {
            failures: 0,
            scenes: vec![scene("a", 14)],
            calls: Arc::clone(&calls),
        };
        let transport = Arc::new(FileTransport { fail: false, calls: AtomicUsize::new(0) });
        let tomorrow = Utc::now().date_naive() + chrono::Duration::days(1);
        let err = ingestor(provider, transport, dir.path())
            .ingest(&aoi(), tomorrow)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CloudError::Core(seepwatch_core::Error::InvalidParameter { .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancelled_before_first_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = ScriptedProvider {
            failures: 0,
            scenes: vec![scene("a", 14)],
            calls: Arc::clone(&calls),
        };
        let transport = Arc::new(FileTransport { fail: false, calls: AtomicUsize::new(0) });
        let cancel = CancelFlag::new();
        cancel.cancel();

        let err = ingestor(provider, transport, dir.path())
            .with_cancel(cancel)
            .ingest(&aoi(), date(2024, 6, 15))
            .await
            .unwrap_err();
        assert!(matches!(err, CloudError::Cancelled(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    /// Fails every search and requests cancellation on the way out
    struct CancellingProvider {
        cancel: CancelFlag,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl CatalogProvider for CancellingProvider {
        fn name(&self) -> &str {
            "cancelling"
        }

        async fn search(&self, _query: &SceneQuery) -> Result<Vec<SceneReference>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.cancel.cancel();
            Err(CloudError::Network("connection reset".into()))
        }
    }

    #[tokio::test]
    async fn cancel_between_attempts_stops_retrying() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancelFlag::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = CancellingProvider {
            cancel: cancel.clone(),
            calls: Arc::clone(&calls),
        };
        let transport = Arc::new(FileTransport { fail: false, calls: AtomicUsize::new(0) });
        let fetcher = Fetcher::new(
            transport,
            FetchOptions {
                output_dir: dir.path().to_path_buf(),
                concurrency: 2,
            },
        );
        let options = IngestOptions {
            retry_backoff: Duration::ZERO,
            ..Default::default()
        };

        let err = Ingestor::new(CatalogClient::new(vec![Box::new(provider)]), fetcher, options)
            .with_cancel(cancel)
            .ingest(&aoi(), date(2024, 6, 15))
            .await
            .unwrap_err();
        assert!(matches!(err, CloudError::Cancelled(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
