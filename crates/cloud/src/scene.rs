//! Scene references and search queries

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use seepwatch_core::vector::validate_polygon;
use seepwatch_core::{AreaOfInterest, CRS};
use serde::Serialize;
use tracing::debug;

use crate::error::{CloudError, Result};
use crate::stac_models::StacItem;

/// A downloadable file of a scene
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneAsset {
    pub href: String,
    pub media_type: Option<String>,
    /// The href needs a SAS token before download
    pub requires_signing: bool,
}

/// One catalog item, reduced to what the fetcher needs
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneReference {
    pub id: String,
    /// `None` when the catalog timestamp is missing or unparseable
    pub acquired: Option<DateTime<Utc>>,
    /// Percent; `None` when the catalog does not report it
    pub cloud_cover: Option<f64>,
    /// WGS84 `[west, south, east, north]`
    pub bbox: Option<[f64; 4]>,
    pub assets: BTreeMap<String, SceneAsset>,
    /// Name of the provider that returned the scene
    pub provider: String,
}

impl SceneReference {
    pub fn from_stac_item(item: StacItem, provider: &str, requires_signing: bool) -> Self {
        let acquired = item.acquired();
        let cloud_cover = item.cloud_cover();
        let bbox = item
            .bbox
            .as_deref()
            .and_then(|b| <[f64; 4]>::try_from(b).ok());
        let assets = item
            .assets
            .into_iter()
            .map(|(key, asset)| {
                (
                    key,
                    SceneAsset {
                        href: asset.href,
                        media_type: asset.type_,
                        requires_signing,
                    },
                )
            })
            .collect();

        Self {
            id: item.id,
            acquired,
            cloud_cover,
            bbox,
            assets,
            provider: provider.to_string(),
        }
    }

    /// Acquisition date as `YYYY-MM-DD`, or `"undated"`.
    pub fn date_label(&self) -> String {
        self.acquired
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "undated".to_string())
    }
}

/// What to search for: where, around when, and how cloudy at most
#[derive(Debug, Clone, PartialEq)]
pub struct SceneQuery {
    /// WGS84 `[west, south, east, north]`
    pub bbox: [f64; 4],
    pub target: NaiveDate,
    pub days_tolerance: u32,
    /// Percent
    pub max_cloud_cover: f64,
}

impl SceneQuery {
    /// Build a query over the bounding box of `aoi`, in degrees.
    ///
    /// Fails with `InvalidGeometry` if the AOI polygon is not valid or
    /// cannot be expressed in WGS84.
    pub fn for_aoi(
        aoi: &AreaOfInterest,
        target: NaiveDate,
        days_tolerance: u32,
        max_cloud_cover: f64,
    ) -> Result<Self> {
        validate_polygon(aoi.polygon())?;

        let wgs84 = aoi.reproject(&CRS::wgs84()).ok_or_else(|| {
            CloudError::Core(seepwatch_core::Error::InvalidGeometry(format!(
                "area of interest in {} cannot be expressed in WGS84",
                aoi.crs()
            )))
        })?;
        let rect = wgs84.bounding_box().ok_or_else(|| {
            CloudError::Core(seepwatch_core::Error::InvalidGeometry(
                "area of interest has no extent".into(),
            ))
        })?;

        let bbox = [rect.min().x, rect.min().y, rect.max().x, rect.max().y];
        debug!("Search bbox {:?}", bbox);
        Ok(Self {
            bbox,
            target,
            days_tolerance,
            max_cloud_cover,
        })
    }

    /// Inclusive `(start, end)` dates of the search window.
    pub fn window(&self) -> (NaiveDate, NaiveDate) {
        let tol = Duration::days(i64::from(self.days_tolerance));
        (self.target - tol, self.target + tol)
    }

    /// Midnight UTC of the target date.
    pub fn target_time(&self) -> DateTime<Utc> {
        self.target.and_time(NaiveTime::MIN).and_utc()
    }

    /// Cloud cover check used when a provider cannot filter server-side.
    ///
    /// Scenes without a reported cloud cover pass.
    pub fn accepts_cloud_cover(&self, cloud_cover: Option<f64>) -> bool {
        cloud_cover.is_none_or(|cc| cc <= self.max_cloud_cover)
    }
}

/// Sort scenes by absolute time distance to `target`, closest first.
///
/// Undated scenes go last; ties keep their original order.
pub fn sort_by_time_distance(scenes: &mut [SceneReference], target: DateTime<Utc>) {
    scenes.sort_by_key(|s| match s.acquired {
        Some(dt) => (0u8, (dt - target).abs()),
        None => (1u8, Duration::zero()),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn scene(id: &str, acquired: Option<&str>) -> SceneReference {
        SceneReference {
            id: id.to_string(),
            acquired: acquired.map(|s| s.parse().unwrap()),
            cloud_cover: None,
            bbox: None,
            assets: BTreeMap::new(),
            provider: "test".into(),
        }
    }

    #[test]
    fn window_spans_tolerance_both_sides() {
        let q = SceneQuery {
            bbox: [0.0, 0.0, 1.0, 1.0],
            target: NaiveDate::from_ymd_opt(2024, 6, 15).unwrap(),
            days_tolerance: 7,
            max_cloud_cover: 20.0,
        };
        let (start, end) = q.window();
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 6, 8).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2024, 6, 22).unwrap());
        assert!(q.accepts_cloud_cover(None));
        assert!(q.accepts_cloud_cover(Some(20.0)));
        assert!(!q.accepts_cloud_cover(Some(35.5)));
    }

    #[test]
    fn closest_first_and_undated_last() {
        let target: DateTime<Utc> = "2024-06-15T00:00:00Z".parse().unwrap();
        let mut scenes = vec![
            scene("undated", None),
            scene("far", Some("2024-06-09T10:00:00Z")),
            scene("near-after", Some("2024-06-16T10:00:00Z")),
            scene("near-before", Some("2024-06-14T10:00:00Z")),
        ];
        sort_by_time_distance(&mut scenes, target);
        let ids: Vec<&str> = scenes.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["near-before", "near-after", "far", "undated"]);
    }

    #[test]
    fn query_bbox_from_projected_aoi() {
        // Around Madrid in UTM 30N
        let poly = polygon![
            (x: 440_000.0, y: 4_474_000.0),
            (x: 441_000.0, y: 4_474_000.0),
            (x: 441_000.0, y: 4_475_000.0),
            (x: 440_000.0, y: 4_475_000.0),
        ];
        let aoi = AreaOfInterest::new(poly, CRS::from_epsg(32630)).unwrap();
        let target = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        let q = SceneQuery::for_aoi(&aoi, target, 7, 20.0).unwrap();

        let [w, s, e, n] = q.bbox;
        assert!(w < e && s < n);
        assert!((-3.72..-3.68).contains(&w), "west {w}");
        assert!((40.40..40.43).contains(&s), "south {s}");
    }

    #[test]
    fn unknown_crs_aoi_is_rejected() {
        let poly = polygon![
            (x: 0.0, y: 0.0),
            (x: 10.0, y: 0.0),
            (x: 10.0, y: 10.0),
            (x: 0.0, y: 10.0),
        ];
        let aoi = AreaOfInterest::new(poly, CRS::from_wkt("LOCAL_CS[\"site\"]")).unwrap();
        let target = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        let err = SceneQuery::for_aoi(&aoi, target, 7, 20.0).unwrap_err();
        assert!(matches!(
            err,
            CloudError::Core(seepwatch_core::Error::InvalidGeometry(_))
        ));
    }
}
