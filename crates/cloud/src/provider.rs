//! Catalog provider strategies
//!
//! A provider turns a [`SceneQuery`] into scene references. The catalog
//! client tries providers in order, so each one only has to report what it
//! found or why it failed.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::Result;
use crate::scene::{SceneQuery, SceneReference};
use crate::stac_client::{StacCatalog, StacClient, StacClientOptions};
use crate::stac_models::StacSearchParams;

/// Items requested per search
pub const DEFAULT_SEARCH_LIMIT: u32 = 10;

/// A source of scene references
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    /// Name used in logs and error messages
    fn name(&self) -> &str;

    /// Scenes matching `query`, in no particular order.
    async fn search(&self, query: &SceneQuery) -> Result<Vec<SceneReference>>;
}

/// Where the cloud cover limit is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloudFilter {
    /// Sent as a `query` extension filter
    ServerSide,
    /// Applied to the returned items; items without cloud cover are kept
    ClientSide,
}

/// A STAC API endpoint used as a provider
pub struct StacProvider {
    name: String,
    client: StacClient,
    collection: String,
    cloud_filter: CloudFilter,
    limit: u32,
}

impl StacProvider {
    pub fn new(client: StacClient, collection: &str, cloud_filter: CloudFilter) -> Self {
        Self {
            name: client.catalog().name(),
            client,
            collection: collection.to_string(),
            cloud_filter,
            limit: DEFAULT_SEARCH_LIMIT,
        }
    }

    /// Planetary Computer Sentinel-2 L2A with server-side cloud filtering.
    pub fn planetary_computer(options: StacClientOptions) -> Result<Self> {
        let catalog = StacCatalog::PlanetaryComputer;
        let collection = catalog.sentinel2_collection();
        Ok(Self::new(
            StacClient::new(catalog, options)?,
            collection,
            CloudFilter::ServerSide,
        ))
    }

    /// Copernicus Data Space Sentinel-2 with client-side cloud filtering.
    pub fn copernicus(options: StacClientOptions) -> Result<Self> {
        let catalog = StacCatalog::CopernicusDataSpace;
        let collection = catalog.sentinel2_collection();
        Ok(Self::new(
            StacClient::new(catalog, options)?,
            collection,
            CloudFilter::ClientSide,
        ))
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn search_params(&self, query: &SceneQuery) -> StacSearchParams {
        let [w, s, e, n] = query.bbox;
        let (start, end) = query.window();
        let params = StacSearchParams::new()
            .bbox(w, s, e, n)
            .date_range(start, end)
            .collections(&[self.collection.as_str()])
            .limit(self.limit);

        match self.cloud_filter {
            CloudFilter::ServerSide => params.max_cloud_cover(query.max_cloud_cover),
            CloudFilter::ClientSide => params,
        }
    }
}

#[async_trait]
impl CatalogProvider for StacProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, query: &SceneQuery) -> Result<Vec<SceneReference>> {
        let params = self.search_params(query);
        debug!("Searching {} with {:?}", self.name, params);

        let items = self.client.search_all(&params).await?;
        let returned = items.len();
        let signing = self.client.catalog().needs_signing();

        let scenes: Vec<SceneReference> = items
            .into_iter()
            .map(|item| SceneReference::from_stac_item(item, &self.name, signing))
            .filter(|scene| {
                self.cloud_filter == CloudFilter::ServerSide
                    || query.accepts_cloud_cover(scene.cloud_cover)
            })
            .collect();

        info!(
            "{} returned {} item(s), {} within cloud limit",
            self.name,
            returned,
            scenes.len()
        );
        Ok(scenes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_server::{Reply, TestServer};
    use chrono::NaiveDate;

    fn query() -> SceneQuery {
        SceneQuery {
            bbox: [-3.75, 40.38, -3.65, 40.45],
            target: NaiveDate::from_ymd_opt(2024, 6, 15).unwrap(),
            days_tolerance: 7,
            max_cloud_cover: 20.0,
        }
    }

    #[test]
    fn server_side_provider_sends_cloud_query() {
        let provider = StacProvider::planetary_computer(StacClientOptions::default()).unwrap();
        let params = provider.search_params(&query());
        assert_eq!(provider.name(), "planetary-computer");
        assert_eq!(params.collections.as_deref(), Some(&["sentinel-2-l2a".to_string()][..]));
        assert_eq!(params.limit, Some(DEFAULT_SEARCH_LIMIT));
        assert!(params.query.is_some());
        assert_eq!(
            params.datetime.as_deref(),
            Some("2024-06-08T00:00:00Z/2024-06-22T23:59:59Z")
        );
    }

    #[test]
    fn client_side_provider_omits_cloud_query() {
        let provider = StacProvider::copernicus(StacClientOptions::default())
            .unwrap()
            .with_limit(5);
        let params = provider.search_params(&query());
        assert!(params.query.is_none());
        assert_eq!(params.limit, Some(5));
        assert_eq!(params.collections.as_deref(), Some(&["SENTINEL-2".to_string()][..]));
    }

    const MIXED_COVER_PAGE: &str = r#"{
      "type": "FeatureCollection",
      "features": [
        {"id": "cloudy", "properties": {"datetime": "2024-06-14T10:56:21Z", "eo:cloud_cover": 35.0},
         "assets": {"B03": {"href": "https://example.com/c_B03.tif"}}},
        {"id": "unreported", "properties": {"datetime": "2024-06-16T10:56:21Z"},
         "assets": {"B03": {"href": "https://example.com/u_B03.tif"}}},
        {"id": "garbled", "properties": {"datetime": "2024-06-17T10:56:21Z", "eo:cloud_cover": "n/a"},
         "assets": {}},
        {"id": "at-limit", "properties": {"datetime": "2024-06-18T10:56:21Z", "eo:cloud_cover": 20.0},
         "assets": {}}
      ],
      "links": []
    }"#;

    #[tokio::test]
    async fn client_side_filter_keeps_unknown_cover_and_drops_cloudy() {
        let server = TestServer::start(Reply::Json(MIXED_COVER_PAGE.into())).await;
        let client = StacClient::new(
            StacCatalog::Custom(server.url("/stac")),
            StacClientOptions::default(),
        )
        .unwrap();
        let provider = StacProvider::new(client, "sentinel-2-l2a", CloudFilter::ClientSide);

        let scenes = provider.search(&query()).await.unwrap();
        let ids: Vec<&str> = scenes.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["unreported", "garbled", "at-limit"]);
        assert!(scenes.iter().all(|s| !s.assets.values().any(|a| a.requires_signing)));
        assert_eq!(server.hits(), 1);
    }

    #[tokio::test]
    async fn server_side_filter_trusts_the_catalog() {
        let server = TestServer::start(Reply::Json(MIXED_COVER_PAGE.into())).await;
        let client = StacClient::new(
            StacCatalog::Custom(server.url("/stac")),
            StacClientOptions::default(),
        )
        .unwrap();
        let provider = StacProvider::new(client, "sentinel-2-l2a", CloudFilter::ServerSide);

        let scenes = provider.search(&query()).await.unwrap();
        assert_eq!(scenes.len(), 4);
    }
}
