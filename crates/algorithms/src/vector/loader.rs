//! Pipeline geometry loading
//!
//! Reads a GeoJSON file with one or more pipeline features and turns it into
//! the buffered corridor [`AreaOfInterest`].
//!
//! Geographic input (longitude/latitude degrees, the GeoJSON default) is
//! projected to the UTM zone containing the centre of its bounding box,
//! buffered there in metres, and the AOI is returned in that UTM CRS. The
//! scale error of the projection is below 0.1 % inside the zone, so a 100 m
//! buffer is accurate to about 0.1 m; geometries reaching far outside the
//! zone (more than ~3° of longitude) accumulate up to ~1 % error.
//!
//! Input that declares a projected CRS through the legacy GeoJSON `crs`
//! member is buffered directly in its own units.

use super::buffer::{buffer_linestring, buffer_points, buffer_polygon, largest_polygon, union_all};
use super::BufferParams;
use geo::{BoundingRect, MultiPolygon};
use geo_types::{Geometry, LineString, Point, Polygon};
use geojson::GeoJson;
use seepwatch_core::crs::UtmZone;
use seepwatch_core::{AreaOfInterest, CRS, Error, Result};
use std::path::Path;
use tracing::{debug, info, warn};

/// Read a GeoJSON file and build the buffered AOI.
pub fn load_aoi<P: AsRef<Path>>(path: P, params: &BufferParams) -> Result<AreaOfInterest> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    debug!("Loading pipeline geometry from {}", path.display());
    aoi_from_geojson_str(&text, params)
}

/// Build the buffered AOI from GeoJSON text.
pub fn aoi_from_geojson_str(text: &str, params: &BufferParams) -> Result<AreaOfInterest> {
    if !(params.distance.is_finite() && params.distance > 0.0) {
        return Err(Error::InvalidParameter {
            name: "buffer distance",
            value: params.distance.to_string(),
            reason: "must be a positive number of metres".into(),
        });
    }

    let geojson: GeoJson = text
        .parse()
        .map_err(|e| Error::InvalidGeometry(format!("cannot parse GeoJSON: {}", e)))?;

    let declared = declared_crs(&geojson);
    let collection = geo_types::GeometryCollection::<f64>::try_from(&geojson)
        .map_err(|e| Error::InvalidGeometry(format!("unsupported GeoJSON content: {}", e)))?;

    let mut parts = Vec::new();
    for geometry in collection {
        flatten(geometry, &mut parts);
    }
    if parts.is_empty() {
        return Err(Error::InvalidGeometry("geometry file has no features".into()));
    }

    aoi_from_geometries(parts, declared, params)
}

/// Buffer a set of simple geometries given in `crs` (WGS84 when `None`).
pub fn aoi_from_geometries(
    parts: Vec<Geometry<f64>>,
    crs: Option<CRS>,
    params: &BufferParams,
) -> Result<AreaOfInterest> {
    let collection = geo_types::GeometryCollection::new_from(parts);
    let Some(bbox) = collection.bounding_rect() else {
        return Err(Error::InvalidGeometry("geometry has no coordinates".into()));
    };

    let crs = crs.unwrap_or_else(CRS::wgs84);
    let (work_crs, parts) = if crs.is_geographic() {
        let min = bbox.min();
        let max = bbox.max();
        if min.x < -180.0 || max.x > 180.0 || min.y < -90.0 || max.y > 90.0 {
            return Err(Error::InvalidGeometry(format!(
                "coordinates ({:.1}, {:.1})..({:.1}, {:.1}) are not longitude/latitude; \
                 declare a projected crs in the file",
                min.x, min.y, max.x, max.y
            )));
        }
        let center = bbox.center();
        let zone = UtmZone::for_lon_lat(center.x, center.y);
        debug!("Projecting geographic input to UTM zone {} (EPSG:{})", zone.zone(), zone.epsg());
        let projected = collection
            .0
            .into_iter()
            .map(|g| project(g, |x, y| zone.forward(x, y)))
            .collect();
        (CRS::from_epsg(zone.epsg()), projected)
    } else {
        if crs.projection().is_none() {
            warn!("Buffering in {} units, assumed to be metres", crs);
        }
        (crs, collection.0)
    };

    let mut buffered: Vec<MultiPolygon<f64>> = Vec::with_capacity(parts.len());
    for g in &parts {
        buffered.push(buffer_geometry(g, params));
    }
    let merged = union_all(buffered.into_iter().flat_map(|m| m.0).collect());

    let n_parts = merged.0.len();
    let polygon = largest_polygon(merged)
        .ok_or_else(|| Error::InvalidGeometry("buffered geometry is empty".into()))?;
    if n_parts > 1 {
        warn!(
            "Buffered corridor has {} disjoint parts; keeping the largest only",
            n_parts
        );
    }

    let aoi = AreaOfInterest::new(polygon, work_crs)?;
    if let Some(b) = aoi.bounding_box() {
        info!(
            "AOI in {}: bounds ({:.1}, {:.1})..({:.1}, {:.1}), area {:.0} m²",
            aoi.crs(),
            b.min().x,
            b.min().y,
            b.max().x,
            b.max().y,
            aoi.area_m2()
        );
    }
    Ok(aoi)
}

fn buffer_geometry(geometry: &Geometry<f64>, params: &BufferParams) -> MultiPolygon<f64> {
    match geometry {
        Geometry::Point(p) => MultiPolygon::new(vec![buffer_points(p, params)]),
        Geometry::LineString(ls) => buffer_linestring(ls, params),
        Geometry::Polygon(poly) => buffer_polygon(poly, params),
        _ => MultiPolygon::new(vec![]),
    }
}

/// Break multi-geometries and collections into points, lines and polygons.
fn flatten(geometry: Geometry<f64>, out: &mut Vec<Geometry<f64>>) {
    match geometry {
        Geometry::Point(_) | Geometry::LineString(_) | Geometry::Polygon(_) => out.push(geometry),
        Geometry::Line(l) => out.push(Geometry::LineString(LineString::from(vec![l.start, l.end]))),
        Geometry::MultiPoint(mp) => out.extend(mp.0.into_iter().map(Geometry::Point)),
        Geometry::MultiLineString(ml) => out.extend(ml.0.into_iter().map(Geometry::LineString)),
        Geometry::MultiPolygon(mp) => out.extend(mp.0.into_iter().map(Geometry::Polygon)),
        Geometry::Rect(r) => out.push(Geometry::Polygon(r.to_polygon())),
        Geometry::Triangle(t) => out.push(Geometry::Polygon(t.to_polygon())),
        Geometry::GeometryCollection(gc) => {
            for g in gc.0 {
                flatten(g, out);
            }
        }
    }
}

fn project<F>(geometry: Geometry<f64>, f: F) -> Geometry<f64>
where
    F: Fn(f64, f64) -> (f64, f64) + Copy,
{
    let map_ls = |ls: &LineString<f64>| -> LineString<f64> {
        ls.coords().map(|c| f(c.x, c.y)).collect::<Vec<_>>().into()
    };
    match geometry {
        Geometry::Point(p) => {
            let (x, y) = f(p.x(), p.y());
            Geometry::Point(Point::new(x, y))
        }
        Geometry::LineString(ls) => Geometry::LineString(map_ls(&ls)),
        Geometry::Polygon(poly) => Geometry::Polygon(Polygon::new(
            map_ls(poly.exterior()),
            poly.interiors().iter().map(map_ls).collect(),
        )),
        other => other,
    }
}

/// CRS named by a legacy `"crs": {"type": "name", "properties": {"name": ...}}` member.
fn declared_crs(geojson: &GeoJson) -> Option<CRS> {
    let members = match geojson {
        GeoJson::FeatureCollection(fc) => fc.foreign_members.as_ref(),
        GeoJson::Feature(f) => f.foreign_members.as_ref(),
        GeoJson::Geometry(g) => g.foreign_members.as_ref(),
    }?;
    let name = members.get("crs")?.get("properties")?.get("name")?.as_str()?;
    let crs = CRS::parse(name);
    if crs.is_none() {
        warn!("Ignoring unrecognised crs member {:?}", name);
    }
    crs
}
