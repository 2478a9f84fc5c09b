//! STAC (SpatioTemporal Asset Catalog) wire types.
//!
//! Serde models for the Item Search subset used by SeepWatch: bbox and
//! datetime-range filtering, the `query` extension for server-side cloud
//! filtering, `next` pagination links and the asset map of each item.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

/// Property key of the EO extension's cloud cover percentage
pub const CLOUD_COVER_KEY: &str = "eo:cloud_cover";

// ---------------------------------------------------------------------------
// Search request
// ---------------------------------------------------------------------------

/// Body for `POST /search`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StacSearchParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Vec<f64>>,

    /// Interval such as `"2024-06-08T00:00:00Z/2024-06-22T23:59:59Z"`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub collections: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,

    /// Query extension filter, e.g. `{"eo:cloud_cover": {"lt": 20}}`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<serde_json::Value>,

    /// Pagination token, carried over from a POST `next` link body
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl StacSearchParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bounding box `[west, south, east, north]` in degrees.
    pub fn bbox(mut self, west: f64, south: f64, east: f64, north: f64) -> Self {
        self.bbox = Some(vec![west, south, east, north]);
        self
    }

    /// Set a datetime or interval string.
    pub fn datetime(mut self, dt: &str) -> Self {
        self.datetime = Some(dt.to_string());
        self
    }

    /// Set a closed interval covering whole days `start..=end`.
    pub fn date_range(self, start: NaiveDate, end: NaiveDate) -> Self {
        let dt = format!(
            "{}T00:00:00Z/{}T23:59:59Z",
            start.format("%Y-%m-%d"),
            end.format("%Y-%m-%d")
        );
        self.datetime(&dt)
    }

    pub fn collections(mut self, cols: &[&str]) -> Self {
        self.collections = Some(cols.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn limit(mut self, n: u32) -> Self {
        self.limit = Some(n);
        self
    }

    /// Keep only items with cloud cover strictly below `max_percent`.
    pub fn max_cloud_cover(mut self, max_percent: f64) -> Self {
        self.query = Some(serde_json::json!({ (CLOUD_COVER_KEY): { "lt": max_percent } }));
        self
    }
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// A STAC Item Collection (GeoJSON FeatureCollection).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacItemCollection {
    #[serde(rename = "type", default)]
    pub type_: String,

    #[serde(default)]
    pub features: Vec<StacItem>,

    #[serde(default)]
    pub links: Vec<StacLink>,

    #[serde(rename = "numberMatched", skip_serializing_if = "Option::is_none")]
    pub number_matched: Option<u64>,

    #[serde(rename = "numberReturned", skip_serializing_if = "Option::is_none")]
    pub number_returned: Option<u64>,
}

impl StacItemCollection {
    /// The `"next"` pagination link, if any.
    pub fn next_link(&self) -> Option<&StacLink> {
        self.links.iter().find(|l| l.rel == "next")
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// A single STAC Item (GeoJSON Feature).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacItem {
    #[serde(rename = "type", default)]
    pub type_: String,

    pub id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Vec<f64>>,

    #[serde(default)]
    pub properties: StacItemProperties,

    #[serde(default)]
    pub assets: HashMap<String, StacAsset>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
}

impl StacItem {
    /// Acquisition time, if the `datetime` property parses as RFC 3339.
    pub fn acquired(&self) -> Option<DateTime<Utc>> {
        let raw = self
            .properties
            .datetime
            .as_deref()
            .or_else(|| self.properties.extra.get("start_datetime").and_then(|v| v.as_str()))?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Cloud cover percentage, if reported.
    pub fn cloud_cover(&self) -> Option<f64> {
        self.properties.eo_cloud_cover
    }
}

/// STAC Item properties.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StacItemProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,

    /// Unreadable values (strings that are not numbers, objects) become `None`
    #[serde(
        rename = "eo:cloud_cover",
        default,
        deserialize_with = "lenient_percent",
        skip_serializing_if = "Option::is_none"
    )]
    pub eo_cloud_cover: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,

    /// Everything not modelled above.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

fn lenient_percent<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value
        .and_then(|v| match v {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().trim_end_matches('%').parse().ok(),
            _ => None,
        })
        .filter(|p: &f64| p.is_finite()))
}

/// A single STAC Asset (file reference).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacAsset {
    pub href: String,

    /// Media type, e.g. `"image/tiff; application=geotiff; profile=cloud-optimized"`
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
}

/// A STAC Link (used for pagination).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacLink {
    /// `"self"`, `"root"`, `"next"`, ...
    pub rel: String,

    pub href: String,

    /// HTTP method for the link; GET when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    /// Request body for POST pagination.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,

    /// Merge `body` into the previous request body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"{
  "type": "FeatureCollection",
  "features": [
    {
      "type": "Feature",
      "id": "S2B_MSIL2A_20240613T104619_R051_T31TCF_20240613T150104",
      "bbox": [0.49, 40.55, 1.8, 41.55],
      "properties": {
        "datetime": "2024-06-13T10:46:19.024000Z",
        "eo:cloud_cover": 3.4,
        "platform": "Sentinel-2B",
        "proj:epsg": 32631
      },
      "assets": {
        "B03": {
          "href": "https://example.com/T31TCF_B03_10m.tif",
          "type": "image/tiff; application=geotiff; profile=cloud-optimized",
          "roles": ["data"]
        },
        "B08": {
          "href": "https://example.com/T31TCF_B08_10m.tif",
          "type": "image/tiff; application=geotiff; profile=cloud-optimized",
          "roles": ["data"]
        }
      },
      "collection": "sentinel-2-l2a"
    },
    {
      "type": "Feature",
      "id": "no-metadata",
      "properties": {"datetime": "sometime in June"},
      "assets": {}
    }
  ],
  "links": [
    {"rel": "next", "href": "https://example.com/search", "method": "POST",
     "body": {"token": "next:abc"}, "merge": true},
    {"rel": "self", "href": "https://example.com/search"}
  ],
  "numberMatched": 12,
  "numberReturned": 2
}"#;

    fn fixture() -> StacItemCollection {
        serde_json::from_str(FIXTURE).unwrap()
    }

    #[test]
    fn parses_items_and_metadata() {
        let col = fixture();
        assert_eq!(col.len(), 2);
        assert_eq!(col.number_matched, Some(12));

        let item = &col.features[0];
        assert_eq!(item.collection.as_deref(), Some("sentinel-2-l2a"));
        assert_eq!(item.cloud_cover(), Some(3.4));
        assert_eq!(
            item.acquired().unwrap().format("%Y-%m-%d").to_string(),
            "2024-06-13"
        );
        assert!(item.assets["B03"].href.ends_with("B03_10m.tif"));
    }

    #[test]
    fn tolerates_missing_and_unparseable_fields() {
        let item = &fixture().features[1];
        assert_eq!(item.cloud_cover(), None);
        assert!(item.acquired().is_none());
        assert!(item.assets.is_empty());
    }

    #[test]
    fn unreadable_cloud_cover_does_not_fail_the_page() {
        let page = r#"{"type": "FeatureCollection", "features": [
            {"id": "a", "properties": {"eo:cloud_cover": "n/a"}},
            {"id": "b", "properties": {"eo:cloud_cover": "12.5"}},
            {"id": "c", "properties": {"eo:cloud_cover": {"value": 3}}},
            {"id": "d", "properties": {"eo:cloud_cover": null}},
            {"id": "e", "properties": {"eo:cloud_cover": 7}}
        ]}"#;
        let col: StacItemCollection = serde_json::from_str(page).unwrap();
        let covers: Vec<Option<f64>> = col.features.iter().map(StacItem::cloud_cover).collect();
        assert_eq!(covers, [None, Some(12.5), None, None, Some(7.0)]);
    }

    #[test]
    fn next_link_carries_post_body() {
        let col = fixture();
        let next = col.next_link().unwrap();
        assert_eq!(next.method.as_deref(), Some("POST"));
        assert_eq!(next.merge, Some(true));
        assert_eq!(next.body.as_ref().unwrap()["token"], "next:abc");
    }

    #[test]
    fn search_body_serializes_filters() {
        let start = NaiveDate::from_ymd_opt(2024, 6, 8).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 6, 22).unwrap();
        let params = StacSearchParams::new()
            .bbox(-3.75, 40.38, -3.65, 40.45)
            .date_range(start, end)
            .collections(&["sentinel-2-l2a"])
            .max_cloud_cover(20.0)
            .limit(10);

        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["datetime"], "2024-06-08T00:00:00Z/2024-06-22T23:59:59Z");
        assert_eq!(json["query"]["eo:cloud_cover"]["lt"], 20.0);
        assert_eq!(json["limit"], 10);
        assert!(json.get("token").is_none());
    }

    #[test]
    fn empty_params_serialize_to_empty_object() {
        let json = serde_json::to_value(StacSearchParams::new()).unwrap();
        assert!(json.as_object().unwrap().is_empty());
    }
}
