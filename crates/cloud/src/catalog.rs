//! Ordered provider fallback
//!
//! [`CatalogClient`] asks each provider in turn and returns the first
//! non-empty result, best temporal match first. Only when every provider
//! failed or came back empty does the search fail.

use tracing::{info, warn};

use crate::error::{CloudError, Result};
use crate::provider::{CatalogProvider, StacProvider};
use crate::scene::{sort_by_time_distance, SceneQuery, SceneReference};
use crate::stac_client::{StacCatalog, StacClient, StacClientOptions};

pub struct CatalogClient {
    providers: Vec<Box<dyn CatalogProvider>>,
}

impl CatalogClient {
    pub fn new(providers: Vec<Box<dyn CatalogProvider>>) -> Self {
        Self { providers }
    }

    /// Planetary Computer first, then the Copernicus Data Space catalogue.
    ///
    /// `fallback_url` replaces the Copernicus endpoint with a custom STAC
    /// API, still filtered client-side.
    pub fn sentinel2(options: StacClientOptions, fallback_url: Option<&str>) -> Result<Self> {
        let primary = StacProvider::planetary_computer(options.clone())?;
        let secondary = match fallback_url {
            Some(url) => {
                let catalog = StacCatalog::from_str_or_url(url);
                let collection = catalog.sentinel2_collection();
                StacProvider::new(
                    StacClient::new(catalog, options)?,
                    collection,
                    crate::provider::CloudFilter::ClientSide,
                )
            }
            None => StacProvider::copernicus(options)?,
        };
        Ok(Self::new(vec![Box::new(primary), Box::new(secondary)]))
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Search providers in order until one returns scenes.
    pub async fn search(&self, query: &SceneQuery) -> Result<Vec<SceneReference>> {
        let mut failures = Vec::new();

        for provider in &self.providers {
            match provider.search(query).await {
                Ok(mut scenes) if !scenes.is_empty() => {
                    sort_by_time_distance(&mut scenes, query.target_time());
                    info!("Using {} scene(s) from {}", scenes.len(), provider.name());
                    return Ok(scenes);
                }
                Ok(_) => {
                    info!("{} returned no scenes, trying next provider", provider.name());
                    failures.push(format!("{}: no scenes", provider.name()));
                }
                Err(e @ CloudError::Cancelled(_)) => return Err(e),
                Err(e) => {
                    warn!("{} search failed: {}", provider.name(), e);
                    failures.push(format!("{}: {}", provider.name(), e));
                }
            }
        }

        if failures.is_empty() {
            failures.push("no providers configured".to_string());
        }
        let (start, end) = query.window();
        Err(CloudError::ImagerySearch(format!(
            "no scenes between {} and {} ({})",
            start,
            end,
            failures.join("; ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Provider that applies the same client-side rule as the real fallback
    struct FakeProvider {
        name: &'static str,
        items: Vec<(&'static str, &'static str, Option<f64>)>,
        fail: bool,
        cancelled: bool,
        calls: Arc<AtomicUsize>,
    }

    impl FakeProvider {
        fn new(name: &'static str, items: Vec<(&'static str, &'static str, Option<f64>)>) -> Self {
            Self {
                name,
                items,
                fail: false,
                cancelled: false,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn failing(name: &'static str) -> Self {
            Self {
                fail: true,
                ..Self::new(name, vec![])
            }
        }

        fn cancelled(name: &'static str) -> Self {
            Self {
                cancelled: true,
                ..Self::new(name, vec![])
            }
        }
    }

    #[async_trait]
    impl CatalogProvider for FakeProvider {
        fn name(&self) -> &str {
            self.name
        }

        async fn search(&self, query: &SceneQuery) -> Result<Vec<SceneReference>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.cancelled {
                return Err(CloudError::Cancelled("STAC search".into()));
            }
            if self.fail {
                return Err(CloudError::Network("connection reset".into()));
            }
            Ok(self
                .items
                .iter()
                .map(|&(id, dt, cc)| SceneReference {
                    id: id.to_string(),
                    acquired: dt.parse().ok(),
                    cloud_cover: cc,
                    bbox: None,
                    assets: BTreeMap::new(),
                    provider: self.name.to_string(),
                })
                .filter(|s| query.accepts_cloud_cover(s.cloud_cover))
                .collect())
        }
    }

    fn query() -> SceneQuery {
        SceneQuery {
            bbox: [-3.75, 40.38, -3.65, 40.45],
            target: NaiveDate::from_ymd_opt(2024, 6, 15).unwrap(),
            days_tolerance: 7,
            max_cloud_cover: 20.0,
        }
    }

    #[tokio::test]
    async fn falls_back_when_primary_is_empty() {
        let primary = FakeProvider::new("primary", vec![]);
        let secondary = FakeProvider::new(
            "secondary",
            vec![
                ("S2_far", "2024-06-10T10:30:00Z", None),
                ("S2_near", "2024-06-14T10:30:00Z", Some(12.0)),
            ],
        );
        let client = CatalogClient::new(vec![Box::new(primary), Box::new(secondary)]);

        let scenes = client.search(&query()).await.unwrap();
        let ids: Vec<&str> = scenes.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["S2_near", "S2_far"]);
        assert!(scenes.iter().all(|s| s.provider == "secondary"));
    }

    #[tokio::test]
    async fn first_non_empty_provider_wins() {
        let primary = FakeProvider::new("primary", vec![("A", "2024-06-15T10:00:00Z", Some(1.0))]);
        let secondary = FakeProvider::new("secondary", vec![("B", "2024-06-15T10:00:00Z", None)]);
        let secondary_calls = Arc::clone(&secondary.calls);
        let client = CatalogClient::new(vec![Box::new(primary), Box::new(secondary)]);

        let scenes = client.search(&query()).await.unwrap();
        assert_eq!(scenes.len(), 1);
        assert_eq!(scenes[0].id, "A");
        assert_eq!(secondary_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancellation_skips_remaining_providers() {
        let secondary = FakeProvider::new("secondary", vec![("B", "2024-06-15T10:00:00Z", None)]);
        let secondary_calls = Arc::clone(&secondary.calls);
        let client = CatalogClient::new(vec![
            Box::new(FakeProvider::cancelled("primary")),
            Box::new(secondary),
        ]);

        let err = client.search(&query()).await.unwrap_err();
        assert!(matches!(err, CloudError::Cancelled(_)));
        assert_eq!(secondary_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn error_in_primary_falls_back() {
        let client = CatalogClient::new(vec![
            Box::new(FakeProvider::failing("primary")),
            Box::new(FakeProvider::new(
                "secondary",
                vec![("B", "2024-06-16T10:00:00Z", Some(50.0)), ("C", "not a date", None)],
            )),
        ]);
        let scenes = client.search(&query()).await.unwrap();
        let ids: Vec<&str> = scenes.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["C"]);
    }

    #[tokio::test]
    async fn all_providers_exhausted_is_search_error() {
        let client = CatalogClient::new(vec![
            Box::new(FakeProvider::failing("primary")),
            Box::new(FakeProvider::new("secondary", vec![])),
        ]);
        let err = client.search(&query()).await.unwrap_err();
        match err {
            CloudError::ImagerySearch(msg) => {
                assert!(msg.contains("primary: Network error"));
                assert!(msg.contains("secondary: no scenes"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn default_chain_order() {
        let client = CatalogClient::sentinel2(StacClientOptions::default(), None).unwrap();
        assert_eq!(
            client.provider_names(),
            ["planetary-computer", "copernicus-dataspace"]
        );
    }
}
