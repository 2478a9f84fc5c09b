//! GeoJSON export of leak candidates
//!
//! Geometries are written as longitude/latitude (RFC 7946) whenever the
//! raster CRS can be transformed to WGS84; otherwise they stay in the raster
//! CRS and the collection carries a legacy `crs` member naming it.

use super::LeakCandidate;
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, Value};
use seepwatch_core::crs::transformer;
use seepwatch_core::vector::map_polygon;
use seepwatch_core::CRS;
use serde_json::json;

/// Build a FeatureCollection with one feature per candidate, in input order.
///
/// Each feature has `rank` (1-based), `confidence`, `area_m2`,
/// `pixel_count`, `mean_change` and `centroid` properties.
pub fn candidates_to_geojson(candidates: &[LeakCandidate], crs: Option<&CRS>) -> FeatureCollection {
    let to_wgs84 = crs.and_then(|c| transformer(c, &CRS::wgs84()));

    let features = candidates
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let (polygon, centroid) = match &to_wgs84 {
                Some(f) => (map_polygon(&c.geometry, f), f(c.centroid.0, c.centroid.1)),
                None => (c.geometry.clone(), c.centroid),
            };

            let mut properties = JsonObject::new();
            properties.insert("rank".into(), json!(i + 1));
            properties.insert("confidence".into(), json!(c.confidence));
            properties.insert("area_m2".into(), json!(c.area_m2));
            properties.insert("pixel_count".into(), json!(c.pixel_count));
            properties.insert("mean_change".into(), json!(c.mean_change));
            properties.insert("centroid".into(), json!([centroid.0, centroid.1]));

            Feature {
                bbox: None,
                geometry: Some(Geometry::new(Value::from(&polygon))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    let foreign_members = match (crs, &to_wgs84) {
        (Some(c), None) => {
            let mut members = JsonObject::new();
            members.insert(
                "crs".into(),
                json!({"type": "name", "properties": {"name": c.identifier()}}),
            );
            Some(members)
        }
        _ => None,
    };

    FeatureCollection {
        bbox: None,
        features,
        foreign_members,
    }
}
