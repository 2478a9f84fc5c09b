//! Async STAC client for searching spatio-temporal asset catalogs.
//!
//! Supports Planetary Computer, Earth Search and the Copernicus Data Space
//! Ecosystem out of the box, plus arbitrary STAC API endpoints via
//! [`StacCatalog::Custom`].

use std::time::Duration;

use seepwatch_core::CancelFlag;
use tracing::{debug, warn};

use crate::error::{CloudError, Result};
use crate::stac_models::{StacItem, StacItemCollection, StacLink, StacSearchParams};

const PC_SIGN_URL: &str = "https://planetarycomputer.microsoft.com/api/sas/v1/sign";

// ---------------------------------------------------------------------------
// Catalog enum
// ---------------------------------------------------------------------------

/// Well-known STAC catalogs plus custom endpoints.
#[derive(Debug, Clone, PartialEq)]
pub enum StacCatalog {
    /// Microsoft Planetary Computer STAC API.
    PlanetaryComputer,
    /// AWS Earth Search (Element 84).
    EarthSearch,
    /// Copernicus Data Space Ecosystem catalogue.
    CopernicusDataSpace,
    /// Any STAC API root, e.g. `"https://my-stac.example.com/api/v1"`.
    Custom(String),
}

impl StacCatalog {
    /// Full POST `/search` URL for this catalog.
    pub fn search_url(&self) -> String {
        match self {
            Self::PlanetaryComputer => {
                "https://planetarycomputer.microsoft.com/api/stac/v1/search".to_string()
            }
            Self::EarthSearch => "https://earth-search.aws.element84.com/v1/search".to_string(),
            Self::CopernicusDataSpace => {
                "https://catalogue.dataspace.copernicus.eu/stac/search".to_string()
            }
            Self::Custom(base) => {
                let base = base.trim_end_matches('/');
                if base.ends_with("/search") {
                    base.to_string()
                } else {
                    format!("{}/search", base)
                }
            }
        }
    }

    /// Sentinel-2 surface reflectance collection id in this catalog.
    pub fn sentinel2_collection(&self) -> &'static str {
        match self {
            Self::CopernicusDataSpace => "SENTINEL-2",
            _ => "sentinel-2-l2a",
        }
    }

    /// Parse a shorthand string into a catalog.
    ///
    /// Recognized shorthands: `"pc"`, `"planetary-computer"`, `"es"`,
    /// `"earth-search"`, `"cdse"`, `"copernicus"`. Anything else is treated
    /// as a custom URL.
    pub fn from_str_or_url(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pc" | "planetary-computer" | "planetarycomputer" => Self::PlanetaryComputer,
            "es" | "earth-search" | "earthsearch" => Self::EarthSearch,
            "cdse" | "copernicus" | "copernicus-dataspace" => Self::CopernicusDataSpace,
            _ => Self::Custom(s.to_string()),
        }
    }

    /// Whether asset hrefs need a SAS token before download.
    pub fn needs_signing(&self) -> bool {
        matches!(self, Self::PlanetaryComputer)
    }

    /// Short human-readable name for logs.
    pub fn name(&self) -> String {
        match self {
            Self::PlanetaryComputer => "planetary-computer".to_string(),
            Self::EarthSearch => "earth-search".to_string(),
            Self::CopernicusDataSpace => "copernicus-dataspace".to_string(),
            Self::Custom(url) => url.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Configuration for [`StacClient`].
#[derive(Debug, Clone)]
pub struct StacClientOptions {
    /// Per-request timeout (default 30 s).
    pub request_timeout: Duration,
    /// Maximum retries on transient failures (default 3).
    pub max_retries: u32,
    /// First retry delay, doubled on each further retry (default 500 ms).
    pub retry_backoff: Duration,
    /// Maximum total items to fetch across pages (default 100).
    pub max_items: usize,
    /// Checked before every request, retries included.
    pub cancel: CancelFlag,
}

impl Default for StacClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_backoff: Duration::from_millis(500),
            max_items: 100,
            cancel: CancelFlag::new(),
        }
    }
}

fn check_cancel(cancel: &CancelFlag, stage: &str) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(CloudError::Cancelled(stage.to_string()));
    }
    Ok(())
}

/// Delay before retry number `attempt` (1-based): `base * 2^(attempt - 1)`.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(1u32 << attempt.saturating_sub(1).min(16))
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Async client for STAC Item Search.
pub struct StacClient {
    catalog: StacCatalog,
    client: reqwest::Client,
    options: StacClientOptions,
}

impl StacClient {
    pub fn new(catalog: StacCatalog, options: StacClientOptions) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .build()
            .map_err(|e| CloudError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            catalog,
            client,
            options,
        })
    }

    pub fn catalog(&self) -> &StacCatalog {
        &self.catalog
    }

    pub fn options(&self) -> &StacClientOptions {
        &self.options
    }

    // ── Single-page search ──────────────────────────────────────────

    /// Execute a single search request and return one page of results.
    pub async fn search(&self, params: &StacSearchParams) -> Result<StacItemCollection> {
        let url = self.catalog.search_url();
        self.post_search(&url, params).await
    }

    // ── Paginated search ────────────────────────────────────────────

    /// Search with automatic pagination, collecting up to `max_items` items.
    pub async fn search_all(&self, params: &StacSearchParams) -> Result<Vec<StacItem>> {
        let mut all_items: Vec<StacItem> = Vec::new();
        let max = self.options.max_items;

        let mut page = self.search(params).await?;

        loop {
            let next = page.next_link().cloned();
            all_items.append(&mut page.features);

            if all_items.len() >= max {
                break;
            }

            match next {
                Some(link) => {
                    debug!("Following STAC next link {}", link.href);
                    page = self.follow_next(&link, params).await?;
                    if page.is_empty() {
                        break;
                    }
                }
                None => break,
            }
        }

        all_items.truncate(max);
        Ok(all_items)
    }

    // ── Private helpers ─────────────────────────────────────────────

    async fn post_search(&self, url: &str, params: &StacSearchParams) -> Result<StacItemCollection> {
        let mut last_err = None;

        for attempt in 0..=self.options.max_retries {
            if attempt > 0 {
                check_cancel(&self.options.cancel, "STAC search retry")?;
                let delay = backoff_delay(self.options.retry_backoff, attempt);
                debug!("Retrying STAC search in {:?} (attempt {})", delay, attempt + 1);
                tokio::time::sleep(delay).await;
            }
            check_cancel(&self.options.cancel, "STAC search")?;

            let resp = self
                .client
                .post(url)
                .header("Content-Type", "application/json")
                .json(params)
                .send()
                .await;

            match resp {
                Ok(r) if r.status().is_success() => {
                    let body = r
                        .text()
                        .await
                        .map_err(|e| CloudError::Network(format!("reading response body: {e}")))?;
                    let col: StacItemCollection = serde_json::from_str(&body).map_err(|e| {
                        CloudError::Network(format!("parsing STAC response: {e}"))
                    })?;
                    return Ok(col);
                }
                Ok(r) => {
                    let status = r.status();
                    let body = r.text().await.unwrap_or_default();
                    last_err = Some(CloudError::Network(format!(
                        "STAC search returned HTTP {}: {}",
                        status,
                        body.chars().take(500).collect::<String>()
                    )));
                    // 4xx will not get better
                    if status.is_client_error() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("STAC search request to {} failed: {}", url, e);
                    last_err = Some(CloudError::Network(format!("STAC search request failed: {e}")));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| CloudError::Network("STAC search failed".into())))
    }

    /// Follow a pagination link. Handles both POST (body/merge) and GET links.
    async fn follow_next(
        &self,
        link: &StacLink,
        original_params: &StacSearchParams,
    ) -> Result<StacItemCollection> {
        let method = link.method.as_deref().unwrap_or("GET").to_uppercase();

        if method == "POST" {
            let merged = merge_next_body(link, original_params)?;
            self.post_search(&link.href, &merged).await
        } else {
            check_cancel(&self.options.cancel, "STAC pagination")?;
            let resp = self
                .client
                .get(&link.href)
                .send()
                .await
                .map_err(|e| CloudError::Network(format!("GET pagination: {e}")))?;

            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                return Err(CloudError::Network(format!(
                    "STAC pagination returned HTTP {}: {}",
                    status,
                    body.chars().take(500).collect::<String>()
                )));
            }

            let body = resp
                .text()
                .await
                .map_err(|e| CloudError::Network(format!("reading pagination body: {e}")))?;
            serde_json::from_str(&body)
                .map_err(|e| CloudError::Network(format!("parsing pagination response: {e}")))
        }
    }
}

/// Request body for a POST `next` link.
///
/// With `merge: true` the link body overlays the original parameters;
/// otherwise the link body replaces them.
fn merge_next_body(link: &StacLink, original: &StacSearchParams) -> Result<StacSearchParams> {
    let body = match (&link.body, link.merge.unwrap_or(false)) {
        (Some(link_body), true) => {
            let mut base = serde_json::to_value(original)
                .map_err(|e| CloudError::InvalidQuery(format!("serializing params: {e}")))?;
            if let (Some(base_obj), Some(link_obj)) = (base.as_object_mut(), link_body.as_object()) {
                for (k, v) in link_obj {
                    base_obj.insert(k.clone(), v.clone());
                }
            }
            base
        }
        (Some(link_body), false) => link_body.clone(),
        (None, _) => return Ok(original.clone()),
    };

    serde_json::from_value(body)
        .map_err(|e| CloudError::InvalidQuery(format!("parsing merged params: {e}")))
}

/// Sign an href through the Planetary Computer `/api/sas/v1/sign` endpoint.
///
/// `timeout` bounds the whole signing call.
pub async fn sign_planetary_computer(
    client: &reqwest::Client,
    href: &str,
    timeout: Duration,
) -> Result<String> {
    let resp = client
        .get(PC_SIGN_URL)
        .query(&[("href", href)])
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| CloudError::Auth(format!("PC sign request failed: {e}")))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        return Err(CloudError::Auth(format!(
            "PC sign returned HTTP {}: {}",
            status,
            body.chars().take(300).collect::<String>()
        )));
    }

    let body: serde_json::Value = resp
        .json()
        .await
        .map_err(|e| CloudError::Auth(format!("parsing PC sign response: {e}")))?;

    body["href"]
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| CloudError::Auth("PC sign response missing 'href' field".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_server::{Reply, TestServer};

    #[test]
    fn catalog_search_urls() {
        assert_eq!(
            StacCatalog::PlanetaryComputer.search_url(),
            "https://planetarycomputer.microsoft.com/api/stac/v1/search"
        );
        assert_eq!(
            StacCatalog::CopernicusDataSpace.search_url(),
            "https://catalogue.dataspace.copernicus.eu/stac/search"
        );
        assert_eq!(
            StacCatalog::Custom("https://example.com/stac/".into()).search_url(),
            "https://example.com/stac/search"
        );
        assert_eq!(
            StacCatalog::Custom("https://example.com/stac/search".into()).search_url(),
            "https://example.com/stac/search"
        );
    }

    #[test]
    fn collections_and_signing_per_catalog() {
        assert_eq!(StacCatalog::PlanetaryComputer.sentinel2_collection(), "sentinel-2-l2a");
        assert_eq!(StacCatalog::CopernicusDataSpace.sentinel2_collection(), "SENTINEL-2");
        assert!(StacCatalog::PlanetaryComputer.needs_signing());
        assert!(!StacCatalog::CopernicusDataSpace.needs_signing());
        assert!(!StacCatalog::Custom("https://x.com".into()).needs_signing());
    }

    #[test]
    fn shorthand_parsing() {
        assert_eq!(StacCatalog::from_str_or_url("PC"), StacCatalog::PlanetaryComputer);
        assert_eq!(StacCatalog::from_str_or_url("cdse"), StacCatalog::CopernicusDataSpace);
        assert_eq!(
            StacCatalog::from_str_or_url("https://My-Stac.com"),
            StacCatalog::Custom("https://My-Stac.com".into())
        );
    }

    #[test]
    fn backoff_doubles() {
        let base = Duration::from_millis(500);
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(500));
        assert_eq!(backoff_delay(base, 2), Duration::from_secs(1));
        assert_eq!(backoff_delay(base, 3), Duration::from_secs(2));
        assert_eq!(backoff_delay(Duration::ZERO, 5), Duration::ZERO);
    }

    #[test]
    fn merge_overlays_token_on_original_query() {
        let original = StacSearchParams::new()
            .collections(&["sentinel-2-l2a"])
            .limit(10);
        let link = StacLink {
            rel: "next".into(),
            href: "https://example.com/search".into(),
            method: Some("POST".into()),
            body: Some(serde_json::json!({"token": "next:2"})),
            merge: Some(true),
        };
        let merged = merge_next_body(&link, &original).unwrap();
        assert_eq!(merged.token.as_deref(), Some("next:2"));
        assert_eq!(merged.limit, Some(10));

        let replace = StacLink { merge: None, ..link };
        let replaced = merge_next_body(&replace, &original).unwrap();
        assert_eq!(replaced.limit, None);
    }

    #[tokio::test]
    async fn cancelled_search_sends_nothing() {
        let server = TestServer::start(Reply::Json(r#"{"features": []}"#.into())).await;
        let options = StacClientOptions::default();
        options.cancel.cancel();
        let client = StacClient::new(StacCatalog::Custom(server.url("")), options).unwrap();

        let err = client.search(&StacSearchParams::new()).await.unwrap_err();
        assert!(matches!(err, CloudError::Cancelled(_)));
        assert_eq!(server.hits(), 0);
    }

    #[tokio::test]
    async fn search_posts_to_custom_endpoint() {
        let server = TestServer::start(Reply::Json(
            r#"{"type": "FeatureCollection", "features": [{"id": "a", "properties": {}}]}"#.into(),
        ))
        .await;
        let client =
            StacClient::new(StacCatalog::Custom(server.url("/")), StacClientOptions::default())
                .unwrap();

        let items = client.search_all(&StacSearchParams::new().limit(10)).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(server.hits(), 1);
    }
}
